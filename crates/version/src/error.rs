//! Version Parsing Error Types
//!
//! Uses `exn` for automatic location tracking, in line with the other crates
//! in the workspace.

use derive_more::{Display, Error};

/// A version parsing error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for version parsing.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a version string was rejected.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing left to parse after trimming and removing build metadata.
    #[display("empty version string")]
    Empty,
    /// The dotted numeric part has too few or too many components.
    #[display("expected 1 to 4 numeric components, found {_0}")]
    ComponentCount(#[error(not(source))] usize),
    /// A numeric component is empty, non-numeric, or too large.
    #[display("invalid numeric component: {_0:?}")]
    InvalidNumber(#[error(not(source))] String),
    /// The prerelease label is empty or contains an invalid segment.
    #[display("invalid prerelease label: {_0:?}")]
    InvalidLabel(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A version string either parses or it doesn't.
        false
    }
}
