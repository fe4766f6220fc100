//! The C-like expression sub-language: AST, parser, evaluator, built-ins.

pub mod ast;
pub mod builtins;
pub mod eval;
pub mod parser;

pub use ast::Expr;
pub use eval::{evaluate, evaluate_with, try_parse_macro_call, MacroInvoker};
pub use parser::{parse, parse_macro_declaration};
