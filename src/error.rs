use std::io;

use thiserror::Error;

use crate::ast::Value;

/// Errors raised while parsing or evaluating a program
///
/// Every evaluation step propagates these unchanged; there is no local recovery. `Exit` is not a
/// failure as such but a request from `std.exit()` to end the process with the given status.
#[derive(Debug, Error)]
pub enum Error {
    #[error("syntax error at line {line}, column {column}: unexpected `{near}`")]
    Syntax {
        line: usize,
        column: usize,
        near: String,
    },

    #[error("`{0}` is not defined")]
    UndefinedVariable(String),

    #[error("`{0}` is not a function")]
    UndefinedFunction(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("arithmetic error: {0}")]
    Arithmetic(&'static str),

    #[error("{func}: {message}")]
    Argument { func: String, message: String },

    #[error("maximum call depth of {0} exceeded")]
    StackOverflow(usize),

    #[error("maximum nesting depth of {0} exceeded")]
    Nesting(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{func}: {source}")]
    Io {
        func: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("uncaught exception: {0}")]
    Thrown(Value),

    #[error("exit requested with status {0}")]
    Exit(i32),
}

impl Error {
    pub(crate) fn argument(func: &str, message: impl Into<String>) -> Self {
        Error::Argument {
            func: func.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn io(func: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Error::Io { func, source }
    }

    /// Builds a Syntax error pointing at `remaining`, the unparsed tail of `source`
    pub(crate) fn syntax(source: &str, remaining: &str) -> Self {
        let offset = source.len().saturating_sub(remaining.len());
        let consumed = &source[..offset];
        let line = consumed.matches('\n').count() + 1;
        let column = match consumed.rfind('\n') {
            Some(nl) => consumed[nl + 1..].chars().count() + 1,
            None => consumed.chars().count() + 1,
        };
        let mut near: String = remaining.trim_start().chars().take(16).collect();
        if near.is_empty() {
            near.push_str("end of input");
        }
        Error::Syntax { line, column, near }
    }
}
