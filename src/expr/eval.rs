// ABOUTME: Expression evaluation against a Context/GlobalContext pair.
//! Expression evaluation against a `Context`/`GlobalContext` pair.
//!
//! The evaluator never runs instructions itself — a call through a
//! `Value::Function(FunctionValue::Macro(..))`, or to the internal
//! `include` built-in, has to re-enter the execution machine, so both are
//! routed through the [`MacroInvoker`] trait object the caller supplies.
//! [`crate::engine::Builder`] is the only real implementor.

use std::rc::Rc;

use crate::context::{Context, GlobalContext};
use crate::error::ExprError;
use crate::expr::ast::{BinaryOp, Expr, UnaryOp};
use crate::expr::builtins;
use crate::expr::parser;
use crate::value::{FunctionValue, Value};

/// Bridges expression-level macro/include calls back into the machine.
pub trait MacroInvoker {
    fn invoke_macro(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ExprError>;

    fn invoke_include(&mut self, _reference: &Value) -> Result<Value, ExprError> {
        Err(ExprError::NotCallable("include".to_string()))
    }
}

/// An invoker for contexts with no access to the machine (e.g. isolated
/// expression unit tests): any macro or include call fails cleanly.
pub struct NoMacros;

impl MacroInvoker for NoMacros {
    fn invoke_macro(&mut self, name: &str, _args: Vec<Value>) -> Result<Value, ExprError> {
        Err(ExprError::NotCallable(name.to_string()))
    }
}

/// Parses and evaluates `source`, with no macro/include support.
pub fn evaluate(source: &str, local: &Rc<Context>, global: &GlobalContext) -> Result<Value, ExprError> {
    evaluate_with(source, local, global, &mut NoMacros)
}

/// Parses and evaluates `source`, dispatching macro/include calls through `invoker`.
pub fn evaluate_with(
    source: &str,
    local: &Rc<Context>,
    global: &GlobalContext,
    invoker: &mut dyn MacroInvoker,
) -> Result<Value, ExprError> {
    let expr = parser::parse(source)?;
    eval_expr(&expr, local, global, invoker)
}

/// Attempts to read `source` as a call to a macro already present in
/// `is_known_macro`. Returns `Ok(None)` (not an error) when the source
/// doesn't parse as a call, or parses as a call to something else — that
/// is how `@include MacroName(1,2)` is told apart from `@include "file"`.
pub fn try_parse_macro_call(
    source: &str,
    is_known_macro: impl Fn(&str) -> bool,
    local: &Rc<Context>,
    global: &GlobalContext,
    invoker: &mut dyn MacroInvoker,
) -> Result<Option<(String, Vec<Value>)>, ExprError> {
    let trimmed = source.trim();
    let expr = match parser::parse(trimmed) {
        Ok(e) => e,
        Err(_) => return Ok(None),
    };
    if let Expr::Call { name, args } = expr {
        if is_known_macro(&name) {
            let values = args
                .iter()
                .map(|a| eval_expr(a, local, global, invoker))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Some((name, values)));
        }
    }
    Ok(None)
}

fn lookup_var(name: &str, local: &Rc<Context>, global: &GlobalContext) -> Value {
    local
        .get(name)
        .or_else(|| global.get(name))
        .unwrap_or(Value::Null)
}

fn eval_expr(
    expr: &Expr,
    local: &Rc<Context>,
    global: &GlobalContext,
    invoker: &mut dyn MacroInvoker,
) -> Result<Value, ExprError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Identifier(name) => Ok(lookup_var(name, local, global)),
        Expr::Array(items) => items
            .iter()
            .map(|e| eval_expr(e, local, global, invoker))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Unary { op, expr } => {
            let v = eval_expr(expr, local, global, invoker)?;
            eval_unary(*op, v)
        }
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, local, global, invoker),
        Expr::Ternary {
            test,
            consequent,
            alternate,
        } => {
            if eval_expr(test, local, global, invoker)?.is_truthy() {
                eval_expr(consequent, local, global, invoker)
            } else {
                eval_expr(alternate, local, global, invoker)
            }
        }
        Expr::Member { target, field } => {
            let v = eval_expr(target, local, global, invoker)?;
            Ok(member_access(&v, field))
        }
        Expr::Index { target, index } => {
            let v = eval_expr(target, local, global, invoker)?;
            let idx = eval_expr(index, local, global, invoker)?;
            Ok(index_access(&v, &idx))
        }
        Expr::Call { name, args } => eval_call(name, args, local, global, invoker),
    }
}

fn eval_call(
    name: &str,
    args: &[Expr],
    local: &Rc<Context>,
    global: &GlobalContext,
    invoker: &mut dyn MacroInvoker,
) -> Result<Value, ExprError> {
    if name == "defined" {
        if args.len() != 1 {
            return Err(ExprError::WrongArgumentCount("defined".to_string()));
        }
        return match &args[0] {
            Expr::Identifier(id) => Ok(Value::Bool(local.get(id).is_some() || global.get(id).is_some())),
            _ => Err(ExprError::DefinedRequiresIdentifier),
        };
    }

    let values = args
        .iter()
        .map(|a| eval_expr(a, local, global, invoker))
        .collect::<Result<Vec<_>, _>>()?;

    if name == "include" {
        let reference = values
            .into_iter()
            .next()
            .ok_or_else(|| ExprError::WrongArgumentCount("include".to_string()))?;
        return invoker.invoke_include(&reference);
    }

    if let Some(entry) = builtins::lookup(name) {
        return (entry.func)(&values);
    }

    match local.get(name).or_else(|| global.get(name)) {
        Some(Value::Function(FunctionValue::Native(f))) => f(&values),
        Some(Value::Function(FunctionValue::Macro(mname))) => invoker.invoke_macro(&mname, values),
        _ => Err(ExprError::NotCallable(name.to_string())),
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    local: &Rc<Context>,
    global: &GlobalContext,
    invoker: &mut dyn MacroInvoker,
) -> Result<Value, ExprError> {
    match op {
        BinaryOp::Or => {
            let l = eval_expr(lhs, local, global, invoker)?;
            if l.is_truthy() {
                return Ok(Value::Bool(true));
            }
            let r = eval_expr(rhs, local, global, invoker)?;
            Ok(Value::Bool(r.is_truthy()))
        }
        BinaryOp::And => {
            let l = eval_expr(lhs, local, global, invoker)?;
            if !l.is_truthy() {
                return Ok(Value::Bool(false));
            }
            let r = eval_expr(rhs, local, global, invoker)?;
            Ok(Value::Bool(r.is_truthy()))
        }
        _ => {
            let l = eval_expr(lhs, local, global, invoker)?;
            let r = eval_expr(rhs, local, global, invoker)?;
            eval_binary_values(op, l, r)
        }
    }
}

fn eval_binary_values(op: BinaryOp, l: Value, r: Value) -> Result<Value, ExprError> {
    match op {
        BinaryOp::Add => match (&l, &r) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            _ => Ok(Value::String(format!("{l}{r}"))),
        },
        BinaryOp::Sub => Ok(Value::Number(as_number(&l)? - as_number(&r)?)),
        BinaryOp::Mul => Ok(Value::Number(as_number(&l)? * as_number(&r)?)),
        BinaryOp::Div => {
            let b = as_number(&r)?;
            if b == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            Ok(Value::Number(as_number(&l)? / b))
        }
        BinaryOp::Mod => {
            let b = as_number(&r)?;
            if b == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            Ok(Value::Number(as_number(&l)? % b))
        }
        BinaryOp::Eq => Ok(Value::Bool(l == r)),
        BinaryOp::Ne => Ok(Value::Bool(l != r)),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let ordering = compare_values(&l, &r);
            let result = matches!(
                (op, ordering),
                (BinaryOp::Lt, Some(std::cmp::Ordering::Less))
                    | (BinaryOp::Gt, Some(std::cmp::Ordering::Greater))
                    | (BinaryOp::Le, Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal))
                    | (BinaryOp::Ge, Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal))
            );
            Ok(Value::Bool(result))
        }
        BinaryOp::Or | BinaryOp::And => unreachable!("short-circuited above"),
    }
}

fn compare_values(l: &Value, r: &Value) -> Option<std::cmp::Ordering> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        _ => None,
    }
}

fn as_number(v: &Value) -> Result<f64, ExprError> {
    match v {
        Value::Number(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null => Ok(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ExprError::Syntax(format!("cannot convert \"{s}\" to a number"))),
        other => Err(ExprError::Syntax(format!(
            "cannot convert {} to a number",
            other.type_name()
        ))),
    }
}

fn eval_unary(op: UnaryOp, v: Value) -> Result<Value, ExprError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
        UnaryOp::Neg => Ok(Value::Number(-as_number(&v)?)),
        UnaryOp::Plus => Ok(Value::Number(as_number(&v)?)),
    }
}

fn member_access(v: &Value, field: &str) -> Value {
    match v {
        Value::Object(map) => map.get(field).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn index_access(v: &Value, idx: &Value) -> Value {
    match v {
        Value::Array(items) => match idx {
            Value::Number(n) if *n >= 0.0 => items.get(*n as usize).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        },
        Value::Object(map) => map.get(&idx.to_string()).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn eval(source: &str) -> Result<Value, ExprError> {
        let local = Context::root();
        let global = GlobalContext::new();
        evaluate(source, &local, &global)
    }

    #[test]
    fn arithmetic_respects_precedence() {
        assert_eq!(eval("156*4+3").unwrap(), Value::Number(627.0));
        assert_eq!(eval("(256-128)/2").unwrap(), Value::Number(64.0));
    }

    #[test]
    fn boolean_short_circuit_precedence() {
        assert_eq!(eval("true || false && false").unwrap(), Value::Bool(true));
    }

    #[test]
    fn ternary_does_not_evaluate_the_dead_branch() {
        assert_eq!(eval("1 ? 100 : undefinedVar").unwrap(), Value::Number(100.0));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let err = eval("1/0").unwrap_err();
        assert!(err.to_string().contains("Division by zero"));
    }

    #[test]
    fn undefined_identifiers_are_null() {
        assert_eq!(eval("nope").unwrap(), Value::Null);
    }

    #[test]
    fn defined_requires_a_bare_identifier() {
        let local = Context::root();
        let mut bindings = HashMap::new();
        bindings.insert("known".to_string(), Value::Number(1.0));
        let local = Context::overlay(&local, bindings);
        let global = GlobalContext::new();

        assert_eq!(
            evaluate("defined(known)", &local, &global).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            evaluate("defined(undef)", &local, &global).unwrap(),
            Value::Bool(false)
        );
        assert!(evaluate("defined(\"str\")", &local, &global).is_err());
    }

    #[test]
    fn string_plus_number_concatenates() {
        assert_eq!(eval("\"x\" + 1").unwrap(), Value::String("x1".to_string()));
    }

    #[test]
    fn min_and_max_builtins() {
        assert_eq!(eval("min(3,1,2)").unwrap(), Value::Number(1.0));
        assert_eq!(eval("max(3,1,2)").unwrap(), Value::Number(3.0));
        assert!(eval("min()").unwrap_err().to_string().contains("min()"));
    }

    #[test]
    fn array_indexing() {
        assert_eq!(eval("[10,20,30][1]").unwrap(), Value::Number(20.0));
    }
}
