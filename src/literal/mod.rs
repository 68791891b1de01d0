use logos::Logos;

#[derive(Logos, Debug, PartialEq, Clone, Copy)]
enum Literal {
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Decimal(f64),

    #[regex(r"0[xX][0-9a-fA-F]+", |lex| u64::from_str_radix(&lex.slice()[2..], 16).ok().map(|v| v as f64))]
    Hex(f64),

    #[regex(r"0[bB][01]+", |lex| u64::from_str_radix(&lex.slice()[2..], 2).ok().map(|v| v as f64))]
    Binary(f64),

    #[regex(r"[0-9]+(\.[0-9]*)?%", |lex| {
        let s = lex.slice();
        s[..s.len() - 1].parse::<f64>().ok().map(|v| v / 100.0)
    })]
    Percent(f64),

    #[token("inf")]
    Inf,
    #[token("nan")]
    NaN,
}

/// Value of `text` when the whole of it is one numeric literal.
pub fn parse(text: &str) -> Option<f64> {
    let mut lex = Literal::lexer(text);
    let token = lex.next()?.ok()?;
    if lex.span().end != text.len() || lex.next().is_some() {
        return None;
    }
    Some(match token {
        Literal::Decimal(v) | Literal::Hex(v) | Literal::Binary(v) | Literal::Percent(v) => v,
        Literal::Inf => f64::INFINITY,
        Literal::NaN => f64::NAN,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_forms() {
        assert_eq!(parse("42"), Some(42.0));
        assert_eq!(parse("3.5"), Some(3.5));
        assert_eq!(parse("1e-3"), Some(0.001));
        assert_eq!(parse(".25"), Some(0.25));
        assert_eq!(parse("2."), Some(2.0));
    }

    #[test]
    fn radix_forms() {
        assert_eq!(parse("0xff"), Some(255.0));
        assert_eq!(parse("0b101"), Some(5.0));
    }

    #[test]
    fn percent_and_specials() {
        assert_eq!(parse("50%"), Some(0.5));
        assert_eq!(parse("inf"), Some(f64::INFINITY));
        assert!(parse("nan").is_some_and(f64::is_nan));
    }

    #[test]
    fn partial_matches_are_rejected() {
        assert_eq!(parse("1+2"), None);
        assert_eq!(parse("x"), None);
        assert_eq!(parse("infinity"), None);
        assert_eq!(parse("12abc"), None);
        assert_eq!(parse(""), None);
    }
}
