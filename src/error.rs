use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the turbine template engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("lex error at {line}:{column} (offset {offset}): {message}")]
    Lex {
        message: String,
        offset: usize,
        line: usize,
        column: usize,
    },

    #[error("parse error in template {template:?} at line {line}: {message}")]
    Parse {
        template: String,
        message: String,
        line: usize,
    },

    #[error("unresolved template: {0}")]
    UnresolvedTemplate(String),

    #[error("undefined block: {0}")]
    UndefinedBlock(String),

    #[error("undefined field: {0}")]
    UndefinedField(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("error calling {name}: {message}")]
    Call { name: String, message: String },

    #[error("value of type {0} is not iterable")]
    NotIterable(String),

    #[error("recursion limit of {0} exceeded")]
    RecursionLimit(usize),

    #[error("division by zero")]
    DivisionByZero,

    #[error("output error: {0}")]
    Output(#[from] std::fmt::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a call error naming the callee.
    pub fn call(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Call {
            name: name.into(),
            message: message.into(),
        }
    }
}
