//! Local filesystem storage backend.
//!
//! Files are stored in a configured directory and accessed through
//! `tokio::fs`. Writes go to a hidden temporary sibling first and are renamed
//! into place once synced, so a crash never leaves a truncated archive under
//! its final name.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, DirEntry};
use tokio::io::AsyncWriteExt;

/// Prefix and suffix of in-flight temporary files.
const TEMP_PREFIX: &str = ".tmp-";
const TEMP_SUFFIX: &str = ".partial";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// All paths are relative to the configured root directory.
///
/// # Examples
///
/// ```no_run
/// use nupack_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("packages", "/var/lib/nupack/packages").map_err(|e| format!("{e:?}"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory holding the package archives
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend, creating the root if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists but is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Only happens once at startup; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    /// Validate a relative storage path and join it with the root directory.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Convert an absolute path back to a relative storage path.
    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        validate_path(relative)
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(path, metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    fn is_temporary(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX))
    }

    fn temporary_sibling(target: &Path) -> PathBuf {
        let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = target.file_name().and_then(|name| name.to_str()).unwrap_or("blob");
        target.with_file_name(format!("{TEMP_PREFIX}{name}.{}-{unique}{TEMP_SUFFIX}", std::process::id()))
    }

    async fn write_synced(temp: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(temp).await?;
        file.write_all(data).await?;
        file.sync_all().await
    }

    /// Persist the rename itself; without this a crash could forget it.
    #[cfg(unix)]
    async fn sync_dir(dir: &Path) -> std::io::Result<()> {
        fs::File::open(dir).await?.sync_all().await
    }

    #[cfg(not(unix))]
    async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
        Ok(())
    }

    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        if Self::is_temporary(&path) {
            return Ok(WalkEntry::Skip);
        }
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        let mut stack = vec![self.root.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Listing a directory that doesn't exist is an empty
                    // listing, not an error.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'dirs; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        let parent = abs_path.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&parent).await.map_err(|e| Self::map_io_error(e, path))?;

        let temp = Self::temporary_sibling(&abs_path);
        if let Err(e) = Self::write_synced(&temp, data).await {
            _ = fs::remove_file(&temp).await;
            exn::bail!(Self::map_io_error(e, path));
        }
        if let Err(e) = fs::rename(&temp, &abs_path).await {
            _ = fs::remove_file(&temp).await;
            exn::bail!(Self::map_io_error(e, path));
        }
        if let Err(e) = Self::sync_dir(&parent).await {
            // The data itself is synced; only the directory entry may lag.
            tracing::warn!(backend = %self.name, path = %path.display(), error = %e, "Cannot sync directory after write");
        }
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        Self::metadata(path, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("test", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
        assert!(LocalBackend::new("name", "./relative").is_err());
    }

    #[test]
    fn test_new_creates_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("nested/packages");
        LocalBackend::new("name", &root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_new_rejects_file_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        assert!(LocalBackend::new("name", &file).is_err());
    }

    #[test]
    fn test_absolute_and_relative_paths() {
        let (temp_dir, backend) = backend();
        let expected = temp_dir.path().join("Foo.1.0.0.nupkg");
        assert_eq!(backend.absolute_path("Foo.1.0.0.nupkg").unwrap(), expected);
        assert_eq!(backend.relative_path(&expected).unwrap(), Path::new("Foo.1.0.0.nupkg"));
        assert!(backend.absolute_path("../etc/passwd").is_err());
        assert!(backend.relative_path("/other/file.nupkg").is_err());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_dir, backend) = backend();
        backend.write(Path::new("Foo.1.0.0.nupkg"), b"PK\x03\x04data").await.unwrap();
        assert_eq!(backend.read(Path::new("Foo.1.0.0.nupkg")).await.unwrap(), b"PK\x03\x04data");
    }

    #[tokio::test]
    async fn test_write_replaces_and_leaves_no_temporaries() {
        let (temp_dir, backend) = backend();
        backend.write(Path::new("Foo.1.0.0.nupkg"), b"first").await.unwrap();
        backend.write(Path::new("Foo.1.0.0.nupkg"), b"second").await.unwrap();
        assert_eq!(backend.read(Path::new("Foo.1.0.0.nupkg")).await.unwrap(), b"second");
        let names = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(names, ["Foo.1.0.0.nupkg"]);
    }

    #[tokio::test]
    async fn test_write_creates_directories() {
        let (_dir, backend) = backend();
        backend.write(Path::new("a/b/Foo.1.0.0.nupkg"), b"data").await.unwrap();
        assert!(backend.exists(Path::new("a/b/Foo.1.0.0.nupkg")).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_skips_temporaries() {
        let (temp_dir, backend) = backend();
        backend.write(Path::new("Foo.1.0.0.nupkg"), b"data").await.unwrap();
        let crashed = LocalBackend::temporary_sibling(&temp_dir.path().join("Bar.1.0.0.nupkg"));
        std::fs::write(&crashed, b"half").unwrap();
        let files = backend.list(None).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, Path::new("Foo.1.0.0.nupkg"));
        assert_eq!(files[0].size, 4);
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let (_dir, backend) = backend();
        backend.write(Path::new("feed/Foo.1.0.0.nupkg"), b"data").await.unwrap();
        backend.write(Path::new("feed/Foo.2.0.0.nupkg"), b"data").await.unwrap();
        backend.write(Path::new("other/Bar.1.0.0.nupkg"), b"data").await.unwrap();
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
        let feed = backend.list(Some(Path::new("feed"))).await.unwrap();
        assert_eq!(feed.len(), 2);
        assert!(feed.iter().all(|f| f.path.starts_with("feed")));
        assert!(backend.list(Some(Path::new("nonexistent"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, backend) = backend();
        backend.write(Path::new("Foo.1.0.0.nupkg"), b"data").await.unwrap();
        backend.delete(Path::new("Foo.1.0.0.nupkg")).await.unwrap();
        assert!(!backend.exists(Path::new("Foo.1.0.0.nupkg")).await.unwrap());
        let err = backend.delete(Path::new("Foo.1.0.0.nupkg")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_stat() {
        let (_dir, backend) = backend();
        backend.write(Path::new("Foo.1.0.0.nupkg"), b"Hello, world!").await.unwrap();
        let info = backend.stat(Path::new("Foo.1.0.0.nupkg")).await.unwrap();
        assert_eq!(info.path, PathBuf::from("Foo.1.0.0.nupkg"));
        assert_eq!(info.size, 13);
        let err = backend.stat(Path::new("missing.nupkg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_dir, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape.nupkg"), b"data").await.is_err());
        assert!(backend.delete(Path::new("../../file")).await.is_err());
    }
}
