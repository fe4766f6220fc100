// ABOUTME: A nom-based recursive-descent parser for the expression sub-language.
//! A nom-based recursive-descent parser for the expression sub-language.
//!
//! Precedence is implemented as the usual cascade of functions, each
//! delegating to the next-tighter level and looping on its own operator
//! set — the standard nom recipe for C-like expression grammars.

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, one_of};
use nom::combinator::{map, opt, recognize};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, pair, tuple};
use nom::IResult;
use nom::Parser;

use crate::error::ExprError;
use crate::expr::ast::{BinaryOp, Expr, UnaryOp};

/// nom's error type specialized to carry an [`ExprError`] directly, so a
/// hard failure (backtick strings, `this`, unterminated strings) can
/// short-circuit `alt` instead of being swallowed as "no alternative
/// matched".
#[derive(Debug, Clone)]
pub struct SynErr(pub ExprError);

impl<'a> nom::error::ParseError<&'a str> for SynErr {
    fn from_error_kind(input: &'a str, kind: nom::error::ErrorKind) -> Self {
        SynErr(ExprError::Syntax(format!(
            "unexpected input near `{}` ({:?})",
            preview(input),
            kind
        )))
    }

    fn append(_input: &'a str, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

fn preview(s: &str) -> String {
    let t = s.trim();
    if t.len() > 24 {
        format!("{}...", &t[..24])
    } else {
        t.to_string()
    }
}

type PResult<'a, T> = IResult<&'a str, T, SynErr>;

fn ws(input: &str) -> &str {
    multispace0::<&str, SynErr>(input).map(|(rest, _)| rest).unwrap_or(input)
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    move |input: &'a str| {
        let (rest, matched) = tag(kw)(input)?;
        if rest.chars().next().map(is_ident_continue).unwrap_or(false) {
            return Err(nom::Err::Error(SynErr(ExprError::Syntax(format!(
                "expected `{kw}`"
            )))));
        }
        Ok((rest, matched))
    }
}

fn parse_identifier_str(input: &str) -> PResult<&str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

fn parse_number(input: &str) -> PResult<Expr> {
    map(
        recognize(tuple((
            alt((
                recognize(tuple((digit1, opt(pair(char('.'), digit1))))),
                recognize(pair(char('.'), digit1)),
            )),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| Expr::Number(s.parse::<f64>().unwrap_or(f64::NAN)),
    )
    .parse(input)
}

fn parse_quoted(quote: char) -> impl FnMut(&str) -> PResult<'_, Expr> {
    move |input: &str| {
        let (rest, _) = char(quote)(input)?;
        let mut out = String::new();
        let mut chars = rest.char_indices();
        loop {
            match chars.next() {
                None => {
                    return Err(nom::Err::Failure(SynErr(ExprError::Syntax(
                        "unterminated string literal".into(),
                    ))))
                }
                Some((i, c)) if c == quote => {
                    return Ok((&rest[i + c.len_utf8()..], Expr::Str(out)));
                }
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '"')) => out.push('"'),
                    Some((_, '\'')) => out.push('\''),
                    Some((_, other)) => out.push(other),
                    None => {
                        return Err(nom::Err::Failure(SynErr(ExprError::Syntax(
                            "unterminated string literal".into(),
                        ))))
                    }
                },
                Some((_, c)) => out.push(c),
            }
        }
    }
}

fn parse_string(input: &str) -> PResult<Expr> {
    alt((parse_quoted('"'), parse_quoted('\''))).parse(input)
}

fn parse_array(input: &str) -> PResult<Expr> {
    map(
        delimited(
            pair(char('['), multispace0),
            separated_list0(tuple((multispace0, char(','), multispace0)), parse_expr),
            pair(multispace0, char(']')),
        ),
        Expr::Array,
    )
    .parse(input)
}

fn parse_paren(input: &str) -> PResult<Expr> {
    delimited(
        pair(char('('), multispace0),
        parse_expr,
        pair(multispace0, char(')')),
    )
    .parse(input)
}

fn parse_call_or_identifier(input: &str) -> PResult<Expr> {
    let (rest, name) = parse_identifier_str(input)?;
    let after_name = ws(rest);
    if after_name.starts_with('(') {
        let (rest2, args) = delimited(
            pair(char('('), multispace0),
            separated_list0(tuple((multispace0, char(','), multispace0)), parse_expr),
            pair(multispace0, char(')')),
        )
        .parse(after_name)?;
        return Ok((
            rest2,
            Expr::Call {
                name: name.to_string(),
                args,
            },
        ));
    }
    Ok((rest, Expr::Identifier(name.to_string())))
}

fn parse_primary(input: &str) -> PResult<Expr> {
    let input = ws(input);
    if input.starts_with('`') {
        return Err(nom::Err::Failure(SynErr(ExprError::BacktickStringsUnsupported)));
    }
    if keyword("this")(input).is_ok() {
        return Err(nom::Err::Failure(SynErr(ExprError::ThisKeywordUnsupported)));
    }
    alt((
        parse_number,
        parse_string,
        map(keyword("true"), |_| Expr::Bool(true)),
        map(keyword("false"), |_| Expr::Bool(false)),
        map(keyword("null"), |_| Expr::Null),
        parse_array,
        parse_paren,
        parse_call_or_identifier,
    ))
    .parse(input)
}

fn parse_postfix(input: &str) -> PResult<Expr> {
    let (mut rest, mut expr) = parse_primary(input)?;
    loop {
        let trimmed = ws(rest);
        if let Some(after_dot) = trimmed.strip_prefix('.') {
            let (r2, field) = parse_identifier_str(after_dot)?;
            expr = Expr::Member {
                target: Box::new(expr),
                field: field.to_string(),
            };
            rest = r2;
            continue;
        }
        if trimmed.starts_with('[') {
            let parsed = delimited(
                pair(char('['), multispace0),
                parse_expr,
                pair(multispace0, char(']')),
            )
            .parse(trimmed);
            if let Ok((r2, idx)) = parsed {
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(idx),
                };
                rest = r2;
                continue;
            }
        }
        break;
    }
    Ok((rest, expr))
}

fn parse_unary(input: &str) -> PResult<Expr> {
    let input = ws(input);
    if let Some(rest) = input.strip_prefix('!') {
        let (rest, e) = parse_unary(rest)?;
        return Ok((
            rest,
            Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(e),
            },
        ));
    }
    if let Some(rest) = input.strip_prefix('-') {
        let (rest, e) = parse_unary(rest)?;
        return Ok((
            rest,
            Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(e),
            },
        ));
    }
    if let Some(rest) = input.strip_prefix('+') {
        let (rest, e) = parse_unary(rest)?;
        return Ok((
            rest,
            Expr::Unary {
                op: UnaryOp::Plus,
                expr: Box::new(e),
            },
        ));
    }
    parse_postfix(input)
}

macro_rules! binary_level {
    ($name:ident, $next:ident, $ops:expr) => {
        fn $name(input: &str) -> PResult<Expr> {
            let (mut rest, mut lhs) = $next(input)?;
            loop {
                let trimmed = ws(rest);
                let mut matched: Option<(BinaryOp, usize)> = None;
                for (token, op) in $ops {
                    if trimmed.starts_with(token) {
                        matched = Some((*op, token.len()));
                        break;
                    }
                }
                match matched {
                    Some((op, len)) => {
                        let (r2, rhs) = $next(&trimmed[len..])?;
                        lhs = Expr::Binary {
                            op,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        };
                        rest = r2;
                    }
                    None => break,
                }
            }
            Ok((rest, lhs))
        }
    };
}

binary_level!(
    parse_multiplicative,
    parse_unary,
    [
        ("*", &BinaryOp::Mul),
        ("/", &BinaryOp::Div),
        ("%", &BinaryOp::Mod),
    ]
);
binary_level!(
    parse_additive,
    parse_multiplicative,
    [("+", &BinaryOp::Add), ("-", &BinaryOp::Sub)]
);
binary_level!(
    parse_relational,
    parse_additive,
    [
        ("<=", &BinaryOp::Le),
        (">=", &BinaryOp::Ge),
        ("<", &BinaryOp::Lt),
        (">", &BinaryOp::Gt),
    ]
);
binary_level!(
    parse_equality,
    parse_relational,
    [("==", &BinaryOp::Eq), ("!=", &BinaryOp::Ne)]
);
binary_level!(parse_and, parse_equality, [("&&", &BinaryOp::And)]);
binary_level!(parse_or, parse_and, [("||", &BinaryOp::Or)]);

fn parse_ternary(input: &str) -> PResult<Expr> {
    let (rest, test) = parse_or(input)?;
    let trimmed = ws(rest);
    if let Some(after_q) = trimmed.strip_prefix('?') {
        let (r2, consequent) = parse_ternary(after_q)?;
        let t2 = ws(r2);
        let after_colon = t2.strip_prefix(':').ok_or_else(|| {
            nom::Err::Failure(SynErr(ExprError::Syntax(
                "expected `:` in ternary expression".into(),
            )))
        })?;
        let (r3, alternate) = parse_ternary(after_colon)?;
        return Ok((
            r3,
            Expr::Ternary {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
        ));
    }
    Ok((rest, test))
}

pub fn parse_expr(input: &str) -> PResult<Expr> {
    parse_ternary(input)
}

/// Parses a complete expression, failing if any input remains afterward.
pub fn parse(source: &str) -> Result<Expr, ExprError> {
    match parse_expr(source) {
        Ok((rest, expr)) => {
            let rest = rest.trim();
            if !rest.is_empty() {
                return Err(ExprError::Syntax(format!(
                    "unexpected trailing input: `{rest}`"
                )));
            }
            Ok(expr)
        }
        Err(nom::Err::Failure(SynErr(e))) | Err(nom::Err::Error(SynErr(e))) => Err(e),
        Err(nom::Err::Incomplete(_)) => Err(ExprError::Syntax("incomplete expression".into())),
    }
}

fn is_identifier(s: &str) -> bool {
    matches!(parse_identifier_str(s), Ok((rest, _)) if rest.is_empty())
}

/// Parses a macro's declaration header, e.g. `NAME(a, b)`.
pub fn parse_macro_declaration(source: &str) -> Result<(String, Vec<String>), ExprError> {
    let source = source.trim();
    let paren = source
        .find('(')
        .ok_or_else(|| ExprError::Syntax(format!("invalid macro declaration: {source}")))?;
    let name = source[..paren].trim();
    if !is_identifier(name) {
        return Err(ExprError::Syntax(format!("invalid macro name: {name}")));
    }
    let close = source
        .rfind(')')
        .ok_or_else(|| ExprError::Syntax(format!("invalid macro declaration: {source}")))?;
    if close < paren {
        return Err(ExprError::Syntax(format!("invalid macro declaration: {source}")));
    }
    let params_src = source[paren + 1..close].trim();
    let params: Vec<String> = if params_src.is_empty() {
        Vec::new()
    } else {
        params_src.split(',').map(|p| p.trim().to_string()).collect()
    };
    for p in &params {
        if !is_identifier(p) {
            return Err(ExprError::Syntax(format!("invalid macro parameter: {p}")));
        }
    }
    Ok((name.to_string(), params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(s: &str) -> Expr {
        parse(s).unwrap_or_else(|e| panic!("expected `{s}` to parse, got {e}"))
    }

    #[test]
    fn parses_number_literals_with_exponents() {
        assert_eq!(parse_ok("1"), Expr::Number(1.0));
        assert_eq!(parse_ok("1.567"), Expr::Number(1.567));
        assert_eq!(parse_ok("1E6"), Expr::Number(1e6));
        assert_eq!(parse_ok("1e-6"), Expr::Number(1e-6));
    }

    #[test]
    fn parses_strings_with_escapes() {
        assert_eq!(parse_ok(r#""a\nb""#), Expr::Str("a\nb".to_string()));
        assert_eq!(parse_ok("'x'"), Expr::Str("x".to_string()));
    }

    #[test]
    fn parses_booleans_and_null() {
        assert_eq!(parse_ok("true"), Expr::Bool(true));
        assert_eq!(parse_ok("false"), Expr::Bool(false));
        assert_eq!(parse_ok("null"), Expr::Null);
    }

    #[test]
    fn keyword_boundary_does_not_swallow_longer_identifiers() {
        assert_eq!(parse_ok("nullable"), Expr::Identifier("nullable".to_string()));
    }

    #[test]
    fn respects_operator_precedence() {
        let expr = parse_ok("1+2*3");
        match expr {
            Expr::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ternary_nests_right_associatively() {
        let expr = parse_ok("1 ? 2 : 3 ? 4 : 5");
        match expr {
            Expr::Ternary { alternate, .. } => {
                assert!(matches!(*alternate, Expr::Ternary { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_member_and_index_access() {
        assert!(matches!(parse_ok("a.b"), Expr::Member { .. }));
        assert!(matches!(parse_ok("a[0]"), Expr::Index { .. }));
        assert!(matches!(parse_ok("a.b[0].c"), Expr::Member { .. }));
    }

    #[test]
    fn parses_array_literals_and_calls() {
        assert_eq!(
            parse_ok("[1,2,3]"),
            Expr::Array(vec![Expr::Number(1.0), Expr::Number(2.0), Expr::Number(3.0)])
        );
        assert!(matches!(parse_ok("min(1,2)"), Expr::Call { .. }));
    }

    #[test]
    fn backtick_strings_are_a_syntax_error() {
        let err = parse("`abc`").unwrap_err();
        assert_eq!(err, ExprError::BacktickStringsUnsupported);
    }

    #[test]
    fn this_keyword_is_a_syntax_error() {
        let err = parse("this").unwrap_err();
        assert_eq!(err, ExprError::ThisKeywordUnsupported);
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("1 2").is_err());
    }

    #[test]
    fn parses_macro_declarations() {
        assert_eq!(
            parse_macro_declaration("FOO(a, b)").unwrap(),
            ("FOO".to_string(), vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            parse_macro_declaration("BAR()").unwrap(),
            ("BAR".to_string(), vec![])
        );
        assert!(parse_macro_declaration("no parens").is_err());
    }
}
