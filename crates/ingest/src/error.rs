//! Ingestion Error Types
//!
//! Uses `exn` for automatic location tracking and error tree construction.

use derive_more::{Display, Error};

/// An ingestion error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for ingestion.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// `Validation` and `Conflict` are the uploader's fault and should be
/// reported back to them; the rest are server-side failures.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The upload is not an acceptable package.
    #[display("invalid package: {_0}")]
    Validation(#[error(not(source))] String),
    /// The `(id, version)` pair is already registered.
    #[display("package {id} {version} already exists")]
    Conflict { id: String, version: String },
    /// The upload stream failed mid-read.
    #[display("cannot read uploaded package")]
    Read,
    /// The package store failed to register the package.
    #[display("package store failure")]
    Store,
}

impl ErrorKind {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Read | Self::Store)
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
