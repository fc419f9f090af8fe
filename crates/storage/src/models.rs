//! Storage models.

use std::path::PathBuf;
use time::OffsetDateTime;

/// Blob metadata returned by storage backends.
///
/// Used by listings (to discover archives during a rebuild) and by `stat`
/// (to confirm a blob is still present and intact).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: impl Into<OffsetDateTime>) -> Self {
        Self { path: path.into(), size, modified: modified.into() }
    }

    /// Whether the file has the given extension, ignoring ASCII case.
    pub fn has_extension(&self, extension: &str) -> bool {
        self.path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_extension() {
        let info = FileInfo::new("Foo.1.0.0.NUPKG", 0, OffsetDateTime::UNIX_EPOCH);
        assert!(info.has_extension("nupkg"));
        assert!(!info.has_extension("zip"));
        let info = FileInfo::new("nupkg", 0, OffsetDateTime::UNIX_EPOCH);
        assert!(!info.has_extension("nupkg"));
    }
}
