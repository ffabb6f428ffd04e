use thiserror::Error;

/// Errors produced while building, interpreting or compiling a model.
///
/// Every failure aborts the operation that detected it; nothing in the crate
/// retries.
#[derive(Debug, Error)]
pub enum Error {
    /// A node, port or argument could not be found, or a reference is stale.
    #[error("null reference: {0}")]
    NullReference(String),

    /// Elements or values of incompatible types were combined.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("index out of range: {0}")]
    IndexOutOfRange(String),

    /// An emission protocol step was called in the wrong state.
    #[error("sequencing error: {0}")]
    Sequencing(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed port specification text. `position` is the token index.
    #[error("parse error at token {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Failure reported by the code generator or JIT module.
    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn type_mismatch(expected: impl ToString, found: impl ToString) -> Self {
        Error::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
