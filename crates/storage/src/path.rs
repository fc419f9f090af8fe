//! Path validation.
//!
//! Blob names come from uploaded manifests, so a hostile package id must
//! never be able to address a file outside the storage root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path and returns its normalized form.
///
/// Rejects anything that would escape the storage root (`..` past the top),
/// absolute prefixes on Windows, null bytes, and paths that normalize to
/// nothing. Root and current-directory components are dropped.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use nupack_storage::validate_path;
/// assert!(validate_path("Newtonsoft.Json.13.0.3.nupkg").is_ok());
/// assert!(validate_path("mirror/Foo.1.0.0.nupkg").is_ok());
/// assert!(validate_path("../Foo.1.0.0.nupkg").is_err());
/// assert!(validate_path("Foo\0.nupkg").is_err());
/// assert_eq!(
///     validate_path("./a/../Foo.1.0.0.nupkg").unwrap(),
///     Path::new("Foo.1.0.0.nupkg")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes survive Path::components() on Unix but truncate
                // the path in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(invalid()),
        false => Ok(components.into_iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate("Foo.1.0.0.nupkg").unwrap(), Path::new("Foo.1.0.0.nupkg"));
        assert_eq!(validate("feed/Foo.2.0.0-beta.nupkg").unwrap(), Path::new("feed/Foo.2.0.0-beta.nupkg"));
    }

    #[test]
    fn test_normalization() {
        assert_eq!(validate("a//b").unwrap(), Path::new("a/b"));
        assert_eq!(validate("./a/./b/").unwrap(), Path::new("a/b"));
        assert_eq!(validate("/Foo.1.0.0.nupkg").unwrap(), Path::new("Foo.1.0.0.nupkg"));
        assert_eq!(validate("a/b/..").unwrap(), Path::new("a"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate("../Foo.1.0.0.nupkg").is_err());
        assert!(validate("a/../../b").is_err());
        assert!(validate("..").is_err());
    }

    #[test]
    fn test_rejected_inputs() {
        assert!(validate("Foo\0.nupkg").is_err());
        assert!(validate("").is_err());
        assert!(validate(".").is_err());
        assert!(validate("//").is_err());
        let err = validate("../x").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(p) if p == Path::new("../x")));
    }
}
