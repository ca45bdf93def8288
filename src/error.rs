use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// FileDB errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The addressed collection, document, or index does not exist.
    NotFound(String),
    /// A collection or index with the same identity already exists.
    AlreadyExists(String),
    /// Invalid user input, typically malformed names, options, or filenames.
    InvalidArgument(String),
    /// A query string that does not conform to the query grammar.
    Syntax(String),
    /// A field locator was applied to a value of an incompatible kind.
    Type(String),
    /// A field locator produced values of more than one scalar kind.
    TypeConflict(String),
    /// A query condition referenced a field with no index.
    UnindexedCondition(String),
    /// An IO error.
    Io(String),
    /// Encoding or decoding failed, including corrupt persisted state.
    Codec(String),
    /// A gzip stream could not be written or read.
    Compression(String),
    /// A document write succeeded but index maintenance on it failed. The
    /// document is on disk and retrievable; retrying the write repairs the
    /// affected indexes.
    IndexUpdate(String),
    /// A repartition is already running elsewhere in the process.
    Busy,
    /// The global client was initialized more than once.
    AlreadyInitialized,
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "not found: {msg}"),
            Error::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::Syntax(msg) => write!(f, "syntax error: {msg}"),
            Error::Type(msg) => write!(f, "type error: {msg}"),
            Error::TypeConflict(msg) => write!(f, "type conflict: {msg}"),
            Error::UnindexedCondition(msg) => write!(f, "no index for condition: {msg}"),
            Error::Io(msg) => write!(f, "io error: {msg}"),
            Error::Codec(msg) => write!(f, "codec error: {msg}"),
            Error::Compression(msg) => write!(f, "compression error: {msg}"),
            Error::IndexUpdate(msg) => write!(f, "index update failed: {msg}"),
            Error::Busy => write!(f, "a repartition is already in progress, retry later"),
            Error::AlreadyInitialized => write!(f, "client initialized more than once"),
        }
    }
}

impl Error {
    /// Whether this error means the addressed entity does not exist, so
    /// optional-get operations can treat absence as "no value, no error".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Constructs an Error::InvalidArgument for the given format string.
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::error::Error::InvalidArgument(format!($($args)*)).into() };
}

/// A FileDB Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(err.to_string())
        } else {
            Error::Io(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Codec(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for Error {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        Error::Codec(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Io(err.to_string())
    }
}
