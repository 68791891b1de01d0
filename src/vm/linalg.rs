//! Vector and matrix kernels. Matrices are row-major vectors.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matrix {
    Det { n: u32 },
    Inv { n: u32 },
    Trace { n: u32 },
    Transpose { rows: u32, cols: u32 },
    /// `(m x n) * (n x k)`
    Mul { m: u32, n: u32, k: u32 },
    Diag { n: u32 },
    Cross,
    Dot { n: u32 },
    Norm { n: u32 },
    Normalize { n: u32 },
    Reverse { n: u32 },
}

impl Matrix {
    /// Result length; 0 for scalar results.
    pub fn output_len(self) -> u32 {
        match self {
            Matrix::Det { .. } | Matrix::Trace { .. } | Matrix::Dot { .. } | Matrix::Norm { .. } => 0,
            Matrix::Inv { n } => n * n,
            Matrix::Transpose { rows, cols } => rows * cols,
            Matrix::Mul { m, k, .. } => m * k,
            Matrix::Diag { n } => n * n,
            Matrix::Cross => 3,
            Matrix::Normalize { n } | Matrix::Reverse { n } => n,
        }
    }

    /// Lengths of the two operand vectors (0 when unused).
    pub fn input_lens(self) -> (usize, usize) {
        let (a, b) = match self {
            Matrix::Det { n } | Matrix::Inv { n } | Matrix::Trace { n } => (n * n, 0),
            Matrix::Transpose { rows, cols } => (rows * cols, 0),
            Matrix::Mul { m, n, k } => (m * n, n * k),
            Matrix::Diag { n } | Matrix::Norm { n } | Matrix::Normalize { n } | Matrix::Reverse { n } => (n, 0),
            Matrix::Cross => (3, 3),
            Matrix::Dot { n } => (n, n),
        };
        (a as usize, b as usize)
    }

    /// `out` holds `max(1, output_len)` values and never aliases `a` or `b`.
    pub fn apply(self, a: &[f64], b: &[f64], out: &mut [f64]) {
        match self {
            Matrix::Det { n } => out[0] = det(a, n as usize),
            Matrix::Inv { n } => inverse(a, n as usize, out),
            Matrix::Trace { n } => {
                let n = n as usize;
                out[0] = (0..n).map(|i| a[i * n + i]).sum();
            }
            Matrix::Transpose { rows, cols } => {
                let (rows, cols) = (rows as usize, cols as usize);
                for r in 0..rows {
                    for c in 0..cols {
                        out[c * rows + r] = a[r * cols + c];
                    }
                }
            }
            Matrix::Mul { m, n, k } => {
                let (m, n, k) = (m as usize, n as usize, k as usize);
                for r in 0..m {
                    for c in 0..k {
                        out[r * k + c] = (0..n).map(|j| a[r * n + j] * b[j * k + c]).sum();
                    }
                }
            }
            Matrix::Diag { n } => {
                let n = n as usize;
                out.fill(0.0);
                for i in 0..n {
                    out[i * n + i] = a[i];
                }
            }
            Matrix::Cross => {
                out[0] = a[1] * b[2] - a[2] * b[1];
                out[1] = a[2] * b[0] - a[0] * b[2];
                out[2] = a[0] * b[1] - a[1] * b[0];
            }
            Matrix::Dot { .. } => out[0] = a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Matrix::Norm { .. } => out[0] = a.iter().map(|v| v * v).sum::<f64>().sqrt(),
            Matrix::Normalize { .. } => {
                let norm = a.iter().map(|v| v * v).sum::<f64>().sqrt();
                for (o, v) in out.iter_mut().zip(a) {
                    *o = if norm > 0.0 { v / norm } else { 0.0 };
                }
            }
            Matrix::Reverse { .. } => {
                for (o, v) in out.iter_mut().zip(a.iter().rev()) {
                    *o = *v;
                }
            }
        }
    }
}

fn det(a: &[f64], n: usize) -> f64 {
    let mut m = a[..n * n].to_vec();
    let mut det = 1.0;
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| m[i * n + col].abs().total_cmp(&m[j * n + col].abs()))
            .unwrap_or(col);
        if m[pivot * n + col] == 0.0 {
            return 0.0;
        }
        if pivot != col {
            for k in 0..n {
                m.swap(pivot * n + k, col * n + k);
            }
            det = -det;
        }
        let p = m[col * n + col];
        det *= p;
        for row in col + 1..n {
            let f = m[row * n + col] / p;
            for k in col..n {
                m[row * n + k] -= f * m[col * n + k];
            }
        }
    }
    det
}

/// Gauss-Jordan inversion; a singular matrix yields NaN everywhere.
fn inverse(a: &[f64], n: usize, out: &mut [f64]) {
    let mut m = a[..n * n].to_vec();
    out.fill(0.0);
    for i in 0..n {
        out[i * n + i] = 1.0;
    }
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| m[i * n + col].abs().total_cmp(&m[j * n + col].abs()))
            .unwrap_or(col);
        if m[pivot * n + col] == 0.0 {
            out.fill(f64::NAN);
            return;
        }
        for k in 0..n {
            m.swap(pivot * n + k, col * n + k);
            out.swap(pivot * n + k, col * n + k);
        }
        let p = m[col * n + col];
        for k in 0..n {
            m[col * n + k] /= p;
            out[col * n + k] /= p;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let f = m[row * n + col];
            if f == 0.0 {
                continue;
            }
            for k in 0..n {
                m[row * n + k] -= f * m[col * n + k];
                out[row * n + k] -= f * out[col * n + k];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinant_and_inverse() {
        let a = [4.0, 7.0, 2.0, 6.0];
        let mut d = [0.0];
        Matrix::Det { n: 2 }.apply(&a, &[], &mut d);
        assert!((d[0] - 10.0).abs() < 1e-12);
        let mut inv = [0.0; 4];
        Matrix::Inv { n: 2 }.apply(&a, &[], &mut inv);
        let expected = [0.6, -0.7, -0.2, 0.4];
        for (x, y) in inv.iter().zip(expected) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn singular_inverse_is_nan() {
        let mut inv = [0.0; 4];
        Matrix::Inv { n: 2 }.apply(&[1.0, 2.0, 2.0, 4.0], &[], &mut inv);
        assert!(inv.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn product_and_transpose() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut t = [0.0; 6];
        Matrix::Transpose { rows: 2, cols: 3 }.apply(&a, &[], &mut t);
        assert_eq!(t, [1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        let mut p = [0.0; 4];
        Matrix::Mul { m: 2, n: 3, k: 2 }.apply(&a, &t, &mut p);
        assert_eq!(p, [14.0, 32.0, 32.0, 77.0]);
    }

    #[test]
    fn cross_product() {
        let mut out = [0.0; 3];
        Matrix::Cross.apply(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0], &mut out);
        assert_eq!(out, [0.0, 0.0, 1.0]);
    }
}
