//! Manifest Extraction Error Types
//!
//! Uses `exn` for automatic location tracking and error tree construction.

use derive_more::{Display, Error};

/// A manifest extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for manifest extraction.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Every variant means the archive itself is unusable; none are retryable.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bytes are not a readable zip archive.
    #[display("not a valid package archive")]
    Archive,
    /// No `.nuspec` file at the root of the archive.
    #[display("package archive contains no manifest")]
    MissingManifest,
    /// More than one `.nuspec` file at the root of the archive.
    #[display("package archive contains {_0} manifests")]
    AmbiguousManifest(#[error(not(source))] usize),
    /// The manifest is not well-formed XML, or not a package manifest.
    #[display("malformed manifest")]
    MalformedManifest,
    /// A required manifest field is missing or blank.
    #[display("manifest is missing required field: {_0}")]
    MissingField(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // The archive is either readable or it isn't.
        false
    }
}
