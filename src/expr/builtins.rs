// ABOUTME: Table of built-in expression functions (min, max, abs, ...).
//! The table of built-in expression functions (`min`, `max`, `abs`, ...).
//!
//! Entries are collected via `inventory` rather than hand-listed in a match
//! statement, so adding a built-in is just writing the function and
//! annotating it with `#[builder_macros::builtin]`. `defined` and `include`
//! are not here: they need access to unevaluated argument syntax or the
//! execution machine, which doesn't fit this table's `&[Value]` signature.

use crate::error::ExprError;
use crate::value::Value;

pub struct BuiltinEntry {
    pub name: &'static str,
    pub summary: &'static str,
    pub func: fn(&[Value]) -> Result<Value, ExprError>,
}

inventory::collect!(BuiltinEntry);

pub fn lookup(name: &str) -> Option<&'static BuiltinEntry> {
    inventory::iter::<BuiltinEntry>().find(|e| e.name == name)
}

fn as_number(func: &str, v: &Value) -> Result<f64, ExprError> {
    match v {
        Value::Number(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(ExprError::Syntax(format!(
            "{func}() cannot accept a {} argument",
            other.type_name()
        ))),
    }
}

#[builder_macros::builtin(name = "min")]
/// Smallest of one or more numeric arguments.
fn builtin_min(args: &[Value]) -> Result<Value, ExprError> {
    if args.is_empty() {
        return Err(ExprError::WrongArgumentCount("min".to_string()));
    }
    let mut smallest = as_number("min", &args[0])?;
    for a in &args[1..] {
        smallest = smallest.min(as_number("min", a)?);
    }
    Ok(Value::Number(smallest))
}

#[builder_macros::builtin(name = "max")]
/// Largest of one or more numeric arguments.
fn builtin_max(args: &[Value]) -> Result<Value, ExprError> {
    if args.is_empty() {
        return Err(ExprError::WrongArgumentCount("max".to_string()));
    }
    let mut largest = as_number("max", &args[0])?;
    for a in &args[1..] {
        largest = largest.max(as_number("max", a)?);
    }
    Ok(Value::Number(largest))
}

#[builder_macros::builtin(name = "abs")]
/// Absolute value of a single numeric argument.
fn builtin_abs(args: &[Value]) -> Result<Value, ExprError> {
    if args.len() != 1 {
        return Err(ExprError::WrongArgumentCount("abs".to_string()));
    }
    Ok(Value::Number(as_number("abs", &args[0])?.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_and_max_are_registered() {
        assert!(lookup("min").is_some());
        assert!(lookup("max").is_some());
        assert!(lookup("abs").is_some());
        assert!(lookup("nope").is_none());
    }

    #[test]
    fn abs_rejects_wrong_arity() {
        let err = builtin_abs(&[]).unwrap_err();
        assert!(err.to_string().contains("abs()"));
    }

    #[test]
    fn abs_of_negative_number() {
        assert_eq!(builtin_abs(&[Value::Number(-4.0)]).unwrap(), Value::Number(4.0));
    }
}
