//! Error types shared by every layer of LumenKV.
//!
//! Precondition failures (`SET ... NX` on an existing key, `EXPIRE` on a
//! missing key, ...) are ordinary return values and never show up here.
//! Everything in this enum is a real failure: the caller passed something
//! the command cannot accept, or persistence could not do its job.

use crate::persistence::ParseError;
use crate::storage::DataType;
use thiserror::Error;

/// Errors returned by LumenKV operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The key holds a value of a different type than the command expects.
    #[error("WRONGTYPE key '{key}' holds a {actual} value, expected {expected}")]
    WrongType {
        key: String,
        expected: DataType,
        actual: DataType,
    },

    /// A command argument (or combination of flags) is not acceptable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The command requires the key to exist.
    #[error("no such key: '{0}'")]
    NoSuchKey(String),

    /// A list index is outside the list.
    #[error("index out of range")]
    IndexOutOfRange,

    /// The stored value (or argument) is not an integer.
    #[error("value is not an integer or out of range")]
    NotInteger,

    /// The stored value (or argument) is not a valid float.
    #[error("value is not a valid float")]
    NotFloat,

    /// An integer increment would overflow.
    #[error("increment or decrement would overflow")]
    Overflow,

    /// The database has been closed.
    #[error("database '{0}' is closed")]
    Closed(String),

    /// The connection string could not be understood.
    #[error("invalid connection string '{0}'")]
    InvalidConnectionString(String),

    /// The snapshot file is damaged or was written by something else.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// The write-ahead log contains bytes that are not a valid frame.
    #[error("log parse error: {0}")]
    Parse(#[from] ParseError),

    /// A log frame parsed, but does not describe a known command.
    #[error("malformed log record: {0}")]
    MalformedRecord(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn wrong_type(key: &str, expected: DataType, actual: DataType) -> Self {
        Error::WrongType {
            key: key.to_string(),
            expected,
            actual,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }
}

/// Result type used throughout LumenKV.
pub type Result<T> = std::result::Result<T, Error>;
