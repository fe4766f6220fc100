// ABOUTME: Error types for every layer of the preprocessor.
//! Error types for every layer of the preprocessor.
//!
//! `ExprError` covers the expression sub-language in isolation (it never
//! knows about files or line numbers); `BuilderError` is what callers of
//! [`crate::engine::Builder`] see, and carries the file:line provenance
//! that the execution machine attaches at instruction boundaries.
//! `ReaderError` and `CacheError` cover the I/O-facing collaborators and
//! get folded into `BuilderError::SourceInclusion` once they cross that
//! boundary.

use thiserror::Error;

/// Failure raised while parsing or evaluating a single expression.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExprError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Wrong number of arguments for {0}()")]
    WrongArgumentCount(String),

    #[error("defined() requires a bare identifier argument")]
    DefinedRequiresIdentifier,

    #[error("Unexpected \"`\"")]
    BacktickStringsUnsupported,

    #[error("`this` keyword is not supported")]
    ThisKeywordUnsupported,

    #[error("{0}")]
    Syntax(String),

    #[error("{0} is not callable")]
    NotCallable(String),

    #[error("{0}")]
    MacroExpansion(String),
}

/// Failure raised by a [`crate::readers::Reader`].
#[derive(Debug, Clone, Error)]
pub enum ReaderError {
    #[error("Source \"{0}\" is not supported")]
    Unsupported(String),

    #[error("path escapes configured search roots: {0}")]
    PathTraversal(String),

    #[error("{0}")]
    Io(String),

    #[error("network access is disabled")]
    NetworkDisabled,

    #[error("address \"{0}\" is not in the network allowlist")]
    AddressNotAllowed(String),

    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("{url} responded with status {status}")]
    BadStatus { url: String, status: u16 },
}

/// Failure raised by the inclusion cache.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("{0}")]
    Storage(String),
}

/// The single error type returned by [`crate::engine::Builder::execute`].
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("({file}:{line}) {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("({file}:{line}) {source}")]
    ExpressionEvaluation {
        file: String,
        line: usize,
        #[source]
        source: ExprError,
    },

    #[error("({file}:{line}) {message}")]
    SourceInclusion {
        file: String,
        line: usize,
        message: String,
    },

    #[error(
        "macro \"{name}\" is already declared at {origin_file}:{origin_line} (redeclared at {file}:{line})"
    )]
    MacroIsAlreadyDeclared {
        name: String,
        origin_file: String,
        origin_line: usize,
        file: String,
        line: usize,
    },

    #[error("({file}:{line}) {message}")]
    UserDefined {
        file: String,
        line: usize,
        message: String,
    },

    #[error("({file}:{line}) maximum execution depth ({limit}) reached")]
    MaxExecutionDepthReached {
        file: String,
        line: usize,
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expr_error_messages_match_the_contracted_wording() {
        assert_eq!(ExprError::DivisionByZero.to_string(), "Division by zero");
        assert_eq!(
            ExprError::WrongArgumentCount("min".into()).to_string(),
            "Wrong number of arguments for min()"
        );
        assert_eq!(
            ExprError::BacktickStringsUnsupported.to_string(),
            "Unexpected \"`\""
        );
        assert_eq!(
            ExprError::ThisKeywordUnsupported.to_string(),
            "`this` keyword is not supported"
        );
    }

    #[test]
    fn builder_error_renders_file_line_provenance() {
        let err = BuilderError::UserDefined {
            file: "main.txt".into(),
            line: 7,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "(main.txt:7) boom");
    }

    #[test]
    fn macro_redeclaration_cites_both_sites() {
        let err = BuilderError::MacroIsAlreadyDeclared {
            name: "FOO".into(),
            origin_file: "a.txt".into(),
            origin_line: 1,
            file: "a.txt".into(),
            line: 9,
        };
        let msg = err.to_string();
        assert!(msg.contains("a.txt:1"));
        assert!(msg.contains("a.txt:9"));
    }
}
