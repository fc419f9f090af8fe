//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Blobs are stored in a `HashMap` behind a [`RwLock`]. Writes replace the
/// whole entry under the write lock, which is as atomic as the trait asks
/// for.
///
/// # Examples
///
/// ```
/// use nupack_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("Foo.1.0.0.nupkg", b"PK\x03\x04")]);
/// assert!(backend.exists(Path::new("Foo.1.0.0.nupkg")).await.map_err(|e| format!("{e:?}"))?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (OffsetDateTime, Vec<u8>)>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = OffsetDateTime::now_utc();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
        }
    }

    /// Overwrite a blob in place without going through [`StorageBackend::write`].
    ///
    /// Simulates out-of-band tampering (truncation, replacement) in tests.
    pub async fn tamper(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        let Ok(validated) = validate_path(path.as_ref()) else {
            panic!("MockBackend::tamper: invalid path {}", path.as_ref().display());
        };
        self.storage.write().await.insert(validated, (OffsetDateTime::now_utc(), data.into()));
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &[u8]); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot under the read lock; never hold it across a yield.
            let mut entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .map(|(path, (inserted, data))| FileInfo::new(path.clone(), data.len() as u64, *inserted))
                    .collect()
            };
            entries.sort_by(|a, b| a.path.cmp(&b.path));
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let (_inserted, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.insert(path, (OffsetDateTime::now_utc(), data.to_vec()));
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let (inserted, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(FileInfo::new(path.clone(), data.len() as u64, *inserted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let backend = MockBackend::default();
        backend.write(Path::new("Foo.1.0.0.nupkg"), b"hello").await.unwrap();
        assert_eq!(backend.read(Path::new("Foo.1.0.0.nupkg")).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let backend = MockBackend::default();
        let err = backend.read(Path::new("missing.nupkg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MockBackend::default();
        backend.write(Path::new("Foo.1.0.0.nupkg"), b"data").await.unwrap();
        backend.delete(Path::new("Foo.1.0.0.nupkg")).await.unwrap();
        assert!(!backend.exists(Path::new("Foo.1.0.0.nupkg")).await.unwrap());
        let err = backend.delete(Path::new("Foo.1.0.0.nupkg")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_stat_and_tamper() {
        let backend = MockBackend::default();
        backend.write(Path::new("Foo.1.0.0.nupkg"), b"12345").await.unwrap();
        assert_eq!(backend.stat(Path::new("Foo.1.0.0.nupkg")).await.unwrap().size, 5);
        backend.tamper("Foo.1.0.0.nupkg", *b"12").await;
        assert_eq!(backend.stat(Path::new("Foo.1.0.0.nupkg")).await.unwrap().size, 2);
    }

    #[tokio::test]
    async fn test_list_sorted_with_prefix() {
        let backend = MockBackend::with_files([
            ("feed/B.1.0.0.nupkg", Vec::from(*b"a")),
            ("feed/A.1.0.0.nupkg", Vec::from(*b"b")),
            ("other/C.1.0.0.nupkg", Vec::from(*b"c")),
        ]);
        let files = backend.list(Some(Path::new("feed"))).await.unwrap();
        let paths = files.iter().map(|f| f.path.clone()).collect::<Vec<_>>();
        assert_eq!(paths, [PathBuf::from("feed/A.1.0.0.nupkg"), PathBuf::from("feed/B.1.0.0.nupkg")]);
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let backend = MockBackend::default();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape.nupkg"), b"bad").await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", Vec::from(*b"bad"))]);
    }
}
