//! Protocol Error Types
//!
//! Uses `exn` for automatic location tracking and error tree construction.
//! Unknown packages are not errors here: view functions return `None`.

use derive_more::{Display, Error};

/// A protocol error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for protocol views.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The base URL supplied by the caller is unusable.
    #[display("invalid base URL {_0:?}")]
    InvalidBaseUrl(#[error(not(source))] String),
    /// A stored archive no longer yields its manifest.
    #[display("stored package {id} {version} has an unreadable manifest")]
    CorruptPackage { id: String, version: String },
    /// The package store failed.
    #[display("package store failure")]
    Store,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store)
    }
}
