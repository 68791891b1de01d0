//! Opcode kinds and their pure kernels.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unary {
    Neg,
    Not,
    BitNot,
    Abs,
    Sign,
    Sqr,
    Sqrt,
    Cbrt,
    Exp,
    Log,
    Log2,
    Log10,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
    Sinc,
    Floor,
    Ceil,
    Round,
    Int,
    Frac,
    IsNan,
    IsInf,
    IsInt,
    Bool,
}

impl Unary {
    /// Built-in function name mapping to this operator, if any.
    pub fn from_name(name: &str) -> Option<Unary> {
        Some(match name {
            "abs" => Unary::Abs,
            "sign" => Unary::Sign,
            "sqr" => Unary::Sqr,
            "sqrt" => Unary::Sqrt,
            "cbrt" => Unary::Cbrt,
            "exp" => Unary::Exp,
            "log" => Unary::Log,
            "log2" => Unary::Log2,
            "log10" => Unary::Log10,
            "sin" => Unary::Sin,
            "cos" => Unary::Cos,
            "tan" => Unary::Tan,
            "asin" => Unary::Asin,
            "acos" => Unary::Acos,
            "atan" => Unary::Atan,
            "sinh" => Unary::Sinh,
            "cosh" => Unary::Cosh,
            "tanh" => Unary::Tanh,
            "asinh" => Unary::Asinh,
            "acosh" => Unary::Acosh,
            "atanh" => Unary::Atanh,
            "sinc" => Unary::Sinc,
            "floor" => Unary::Floor,
            "ceil" => Unary::Ceil,
            "round" => Unary::Round,
            "int" => Unary::Int,
            "frac" => Unary::Frac,
            "isnan" => Unary::IsNan,
            "isinf" => Unary::IsInf,
            "isint" => Unary::IsInt,
            "bool" => Unary::Bool,
            _ => return None,
        })
    }

    pub fn apply(self, a: f64) -> f64 {
        match self {
            Unary::Neg => -a,
            Unary::Not => (a == 0.0) as u8 as f64,
            Unary::BitNot => !(a as i64) as f64,
            Unary::Abs => a.abs(),
            Unary::Sign => {
                if a > 0.0 {
                    1.0
                } else if a < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            Unary::Sqr => a * a,
            Unary::Sqrt => a.sqrt(),
            Unary::Cbrt => a.cbrt(),
            Unary::Exp => a.exp(),
            Unary::Log => a.ln(),
            Unary::Log2 => a.log2(),
            Unary::Log10 => a.log10(),
            Unary::Sin => a.sin(),
            Unary::Cos => a.cos(),
            Unary::Tan => a.tan(),
            Unary::Asin => a.asin(),
            Unary::Acos => a.acos(),
            Unary::Atan => a.atan(),
            Unary::Sinh => a.sinh(),
            Unary::Cosh => a.cosh(),
            Unary::Tanh => a.tanh(),
            Unary::Asinh => a.asinh(),
            Unary::Acosh => a.acosh(),
            Unary::Atanh => a.atanh(),
            Unary::Sinc => {
                if a == 0.0 { 1.0 } else { a.sin() / a }
            }
            Unary::Floor => a.floor(),
            Unary::Ceil => a.ceil(),
            Unary::Round => a.round(),
            Unary::Int => a.trunc(),
            Unary::Frac => a - a.floor(),
            Unary::IsNan => a.is_nan() as u8 as f64,
            Unary::IsInf => a.is_infinite() as u8 as f64,
            Unary::IsInt => (a.is_finite() && a == a.round()) as u8 as f64,
            Unary::Bool => (a != 0.0) as u8 as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binary {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    Shl,
    Shr,
    Atan2,
    Hypot,
    Fmod,
    Gauss,
}

fn shift(a: f64, by: f64) -> f64 {
    let (a, by) = (a as i64, by as i64);
    let bits = by.unsigned_abs().min(64) as u32;
    let out = if by >= 0 {
        a.checked_shl(bits).unwrap_or(0)
    } else {
        a.checked_shr(bits).unwrap_or(if a < 0 { -1 } else { 0 })
    };
    out as f64
}

impl Binary {
    pub fn symbol(self) -> &'static str {
        match self {
            Binary::Add => "+",
            Binary::Sub => "-",
            Binary::Mul => "*",
            Binary::Div => "/",
            Binary::Mod => "%",
            Binary::Pow => "^",
            Binary::Eq => "==",
            Binary::Ne => "!=",
            Binary::Lt => "<",
            Binary::Le => "<=",
            Binary::Gt => ">",
            Binary::Ge => ">=",
            Binary::BitAnd => "&",
            Binary::BitOr => "|",
            Binary::Shl => "<<",
            Binary::Shr => ">>",
            Binary::Atan2 => "atan2",
            Binary::Hypot => "hypot",
            Binary::Fmod => "fmod",
            Binary::Gauss => "gauss",
        }
    }

    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Binary::Add => a + b,
            Binary::Sub => a - b,
            Binary::Mul => a * b,
            Binary::Div => a / b,
            Binary::Mod => {
                if b == 0.0 { f64::NAN } else { a - b * (a / b).floor() }
            }
            Binary::Pow => a.powf(b),
            Binary::Eq => (a == b) as u8 as f64,
            Binary::Ne => (a != b) as u8 as f64,
            Binary::Lt => (a < b) as u8 as f64,
            Binary::Le => (a <= b) as u8 as f64,
            Binary::Gt => (a > b) as u8 as f64,
            Binary::Ge => (a >= b) as u8 as f64,
            Binary::BitAnd => ((a as i64) & (b as i64)) as f64,
            Binary::BitOr => ((a as i64) | (b as i64)) as f64,
            Binary::Shl => shift(a, b),
            Binary::Shr => shift(a, -b),
            Binary::Atan2 => a.atan2(b),
            Binary::Hypot => a.hypot(b),
            Binary::Fmod => a % b,
            Binary::Gauss => (-a * a / (2.0 * b * b)).exp() / ((2.0 * PI).sqrt() * b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ternary {
    /// `cut(x, lo, hi)`
    Cut,
    /// `lerp(a, b, t)`
    Lerp,
}

impl Ternary {
    pub fn apply(self, a: f64, b: f64, c: f64) -> f64 {
        match self {
            Ternary::Cut => {
                if a < b {
                    b
                } else if a > c {
                    c
                } else {
                    a
                }
            }
            Ternary::Lerp => a + (b - a) * c,
        }
    }
}

/// Fused multiply forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linear {
    /// `a*b + c`
    MulAdd,
    /// `a*b - c`
    MulSub,
    /// `c - a*b`
    SubMul,
}

impl Linear {
    pub fn apply(self, a: f64, b: f64, c: f64) -> f64 {
        match self {
            Linear::MulAdd => a * b + c,
            Linear::MulSub => a * b - c,
            Linear::SubMul => c - a * b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduce {
    Min,
    Max,
    Sum,
    Prod,
    Avg,
    Med,
    Var,
    Std,
    ArgMin,
    ArgMax,
}

impl Reduce {
    pub fn from_name(name: &str) -> Option<Reduce> {
        Some(match name {
            "min" => Reduce::Min,
            "max" => Reduce::Max,
            "sum" => Reduce::Sum,
            "prod" => Reduce::Prod,
            "avg" | "mean" => Reduce::Avg,
            "med" => Reduce::Med,
            "var" => Reduce::Var,
            "std" => Reduce::Std,
            "argmin" => Reduce::ArgMin,
            "argmax" => Reduce::ArgMax,
            _ => return None,
        })
    }

    pub fn apply(self, values: &[f64]) -> f64 {
        let n = values.len() as f64;
        match self {
            Reduce::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Reduce::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Reduce::Sum => values.iter().sum(),
            Reduce::Prod => values.iter().product(),
            Reduce::Avg => values.iter().sum::<f64>() / n,
            Reduce::Med => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 { 0.5 * (sorted[mid - 1] + sorted[mid]) } else { sorted[mid] }
            }
            Reduce::Var => variance(values),
            Reduce::Std => variance(values).sqrt(),
            Reduce::ArgMin => arg_by(values, |a, b| a < b),
            Reduce::ArgMax => arg_by(values, |a, b| a > b),
        }
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0)
}

fn arg_by(values: &[f64], better: impl Fn(f64, f64) -> bool) -> f64 {
    let mut best = 0;
    for (k, &v) in values.iter().enumerate().skip(1) {
        if better(v, values[best]) {
            best = k;
        }
    }
    best as f64
}

/// Complex binary operators on `(re, im)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complex {
    Mul,
    Div,
    Pow,
}

impl Complex {
    pub fn symbol(self) -> &'static str {
        match self {
            Complex::Mul => "**",
            Complex::Div => "//",
            Complex::Pow => "^^",
        }
    }

    /// The real operator a scalar-by-scalar use degenerates to.
    pub fn real(self) -> Binary {
        match self {
            Complex::Mul => Binary::Mul,
            Complex::Div => Binary::Div,
            Complex::Pow => Binary::Pow,
        }
    }

    pub fn apply(self, a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
        match self {
            Complex::Mul => (a.0 * b.0 - a.1 * b.1, a.0 * b.1 + a.1 * b.0),
            Complex::Div => {
                let den = b.0 * b.0 + b.1 * b.1;
                ((a.0 * b.0 + a.1 * b.1) / den, (a.1 * b.0 - a.0 * b.1) / den)
            }
            Complex::Pow => {
                if a == (0.0, 0.0) {
                    return if b == (0.0, 0.0) { (1.0, 0.0) } else { (0.0, 0.0) };
                }
                let (lr, li) = (a.0.hypot(a.1).ln(), a.1.atan2(a.0));
                let (er, ei) = (b.0 * lr - b.1 * li, b.0 * li + b.1 * lr);
                let m = er.exp();
                (m * ei.cos(), m * ei.sin())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexUnary {
    Abs,
    Arg,
    Conj,
    Exp,
    Log,
}

impl ComplexUnary {
    pub fn from_name(name: &str) -> Option<ComplexUnary> {
        Some(match name {
            "cabs" => ComplexUnary::Abs,
            "carg" => ComplexUnary::Arg,
            "cconj" => ComplexUnary::Conj,
            "cexp" => ComplexUnary::Exp,
            "clog" => ComplexUnary::Log,
            _ => return None,
        })
    }

    /// Whether the result is a `(re, im)` pair rather than a scalar.
    pub fn is_pair(self) -> bool {
        matches!(self, ComplexUnary::Conj | ComplexUnary::Exp | ComplexUnary::Log)
    }

    pub fn apply(self, a: (f64, f64)) -> (f64, f64) {
        match self {
            ComplexUnary::Abs => (a.0.hypot(a.1), 0.0),
            ComplexUnary::Arg => (a.1.atan2(a.0), 0.0),
            ComplexUnary::Conj => (a.0, -a.1),
            ComplexUnary::Exp => {
                let m = a.0.exp();
                (m * a.1.cos(), m * a.1.sin())
            }
            ComplexUnary::Log => (a.0.hypot(a.1).ln(), a.1.atan2(a.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modulo_follows_divisor_sign() {
        assert_eq!(Binary::Mod.apply(-1.0, 3.0), 2.0);
        assert_eq!(Binary::Fmod.apply(-1.0, 3.0), -1.0);
        assert!(Binary::Mod.apply(1.0, 0.0).is_nan());
    }

    #[test]
    fn shifts_saturate() {
        assert_eq!(Binary::Shl.apply(1.0, 4.0), 16.0);
        assert_eq!(Binary::Shr.apply(16.0, 2.0), 4.0);
        assert_eq!(Binary::Shl.apply(1.0, 200.0), 0.0);
    }

    #[test]
    fn reductions() {
        let v = [3.0, 1.0, 4.0, 1.0, 5.0];
        assert_eq!(Reduce::Min.apply(&v), 1.0);
        assert_eq!(Reduce::ArgMax.apply(&v), 4.0);
        assert_eq!(Reduce::ArgMin.apply(&v), 1.0);
        assert_eq!(Reduce::Med.apply(&v), 3.0);
        assert_eq!(Reduce::Med.apply(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(Reduce::Var.apply(&[2.0, 4.0]), 2.0);
    }

    #[test]
    fn complex_arithmetic() {
        assert_eq!(Complex::Mul.apply((1.0, 2.0), (3.0, 4.0)), (-5.0, 10.0));
        let (re, im) = Complex::Div.apply((-5.0, 10.0), (3.0, 4.0));
        assert!((re - 1.0).abs() < 1e-12 && (im - 2.0).abs() < 1e-12);
        let (re, im) = Complex::Pow.apply((0.0, 1.0), (2.0, 0.0));
        assert!((re + 1.0).abs() < 1e-12 && im.abs() < 1e-12);
    }

    #[test]
    fn fused_forms() {
        assert_eq!(Linear::MulAdd.apply(2.0, 3.0, 4.0), 10.0);
        assert_eq!(Linear::MulSub.apply(2.0, 3.0, 4.0), 2.0);
        assert_eq!(Linear::SubMul.apply(2.0, 3.0, 4.0), -2.0);
    }
}
