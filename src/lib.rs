//! A source-level preprocessor: directives, a C-like expression language,
//! and pluggable file inclusion over plain text.

pub mod cache;
pub mod config;
pub mod context;
pub mod directive;
pub mod engine;
pub mod error;
pub mod expr;
pub mod macros;
pub mod readers;
pub mod value;

pub use config::BuilderConfig;
pub use engine::Builder;
pub use error::BuilderError;
pub use value::Value;
