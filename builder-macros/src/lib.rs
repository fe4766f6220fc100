//! Procedural macros for the expression evaluator's built-in function table.
//!
//! Provides the `#[builtin]` attribute, which turns a plain Rust function
//! into an entry in the expression evaluator's built-in registry: it keeps
//! the function as-is and emits an `inventory::submit!` registering its
//! name (and a one-line summary pulled from its doc comment) alongside a
//! pointer to it, so `expr::builtins::lookup` can dispatch by name without
//! a hand-maintained match statement.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, ItemFn, Meta};

/// Extract the first line of the rustdoc comment attached to a function.
fn doc_summary(attrs: &[Attribute]) -> String {
    for attr in attrs {
        if attr.path().is_ident("doc") {
            if let Meta::NameValue(nv) = &attr.meta {
                if let syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(lit_str),
                    ..
                }) = &nv.value
                {
                    let line = lit_str.value();
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        return trimmed.to_string();
                    }
                }
            }
        }
    }
    String::new()
}

/// Parse `name = "..."` out of the attribute's token stream.
fn parse_name_arg(attr_stream: TokenStream) -> Option<String> {
    let attr_str = attr_stream.to_string();
    let start = attr_str.find("name")?;
    let rest = &attr_str[start..];
    let quote_start = rest.find('"')?;
    let rest = &rest[quote_start + 1..];
    let quote_end = rest.find('"')?;
    Some(rest[..quote_end].to_string())
}

/// Registers a built-in expression function under the given `name`.
///
/// The annotated function must have signature
/// `fn(&[Value]) -> Result<Value, ExprError>`. The attribute leaves the
/// function body untouched and adds an `inventory::submit!` block next to
/// it; nothing about the call site changes.
///
/// ```ignore
/// #[builtin(name = "abs")]
/// /// Absolute value of a single numeric argument.
/// pub fn builtin_abs(args: &[Value]) -> Result<Value, ExprError> { .. }
/// ```
#[proc_macro_attribute]
pub fn builtin(attr: TokenStream, item: TokenStream) -> TokenStream {
    let func = parse_macro_input!(item as ItemFn);

    let fn_name = func.sig.ident.clone();
    let name = parse_name_arg(attr).unwrap_or_else(|| fn_name.to_string());
    let summary = doc_summary(&func.attrs);

    let expanded = quote! {
        #func

        inventory::submit! {
            crate::expr::builtins::BuiltinEntry {
                name: #name,
                summary: #summary,
                func: #fn_name,
            }
        }
    };

    expanded.into()
}
