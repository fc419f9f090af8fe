use crate::error::{Error, ErrorKind, Result};
use crate::locks::KeyLocks;
use crate::query::Query;
use crate::record::{Key, PackageRecord};
use exn::ResultExt;
use futures::{StreamExt, TryStreamExt, stream};
use nupack_manifest::PACKAGE_EXTENSION;
use nupack_storage::{BackendHandle, FileInfo};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

/// Blob checks in flight at once while filtering a listing.
const VERIFY_CONCURRENCY: usize = 16;
/// Archives read and parsed at once during a rebuild.
const REBUILD_CONCURRENCY: usize = 4;

type Index = HashMap<Key, Arc<PackageRecord>>;

/// Outcome of [`Store::rebuild`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Archives registered in the new index
    pub loaded: usize,
    /// Archives (or listing entries) that could not be registered
    pub skipped: usize,
}

/// The package index.
///
/// Maps `(id, version)` to immutable [`PackageRecord`]s. The index lives in
/// memory and is a cache over the archives in the storage backend: anything
/// it holds can be recovered with [`rebuild`](Self::rebuild).
///
/// # Concurrency
///
/// Writers (`put`, `delete`) exclude each other per key, and then per blob
/// path, since distinct keys can spell the same file name (`Foo.1 0.0.1` and
/// `Foo 1.0.0.1`). Readers never wait on writers beyond the brief moment an
/// entry is inserted or removed.
/// A rebuild waits for in-flight writes and holds new ones back until the new
/// index is in place, so no write is lost to the swap.
///
/// # Visibility
///
/// A record is returned only while its blob exists with the recorded size.
/// Entries whose blob has gone missing are evicted on the read that notices.
pub struct Store {
    backend: BackendHandle,
    index: RwLock<Index>,
    locks: KeyLocks,
    blob_locks: KeyLocks<String>,
    gate: RwLock<()>,
}

/// Blob paths compare ignoring case, as they would on a case-insensitive
/// filesystem.
fn blob_lock_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

fn sort_records(records: &mut [Arc<PackageRecord>]) {
    let outcome = nupack_version::sort_versions(records, |record| record.version.as_str());
    if outcome.degraded {
        tracing::warn!("Unparseable version in index; versions ordered lexically");
    }
    // Stable, so versions stay ascending within each id.
    records.sort_by_cached_key(|record| record.id.to_lowercase());
}

impl Store {
    /// Create an empty store over a backend. Call [`rebuild`](Self::rebuild)
    /// to load the archives the backend already holds.
    pub fn new(backend: BackendHandle) -> Self {
        Self {
            backend,
            index: RwLock::new(Index::new()),
            locks: KeyLocks::default(),
            blob_locks: KeyLocks::default(),
            gate: RwLock::new(()),
        }
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    async fn is_intact(&self, record: &PackageRecord) -> Result<bool> {
        match self.backend.stat(&record.blob).await {
            Ok(info) => Ok(info.size == record.size),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e).or_raise(|| ErrorKind::Storage),
        }
    }

    /// Remove an entry, unless it has been replaced since it was read.
    async fn evict(&self, key: &Key, stale: &Arc<PackageRecord>) {
        let mut index = self.index.write().await;
        if index.get(key).is_some_and(|current| Arc::ptr_eq(current, stale)) {
            index.remove(key);
            tracing::warn!(
                id = %stale.id,
                version = %stale.version,
                path = %stale.blob.display(),
                "Blob missing or altered; evicted index entry"
            );
        }
    }

    async fn lookup(&self, key: &Key) -> Result<Option<Arc<PackageRecord>>> {
        let Some(record) = self.index.read().await.get(key).cloned() else {
            return Ok(None);
        };
        if self.is_intact(&record).await? {
            return Ok(Some(record));
        }
        self.evict(key, &record).await;
        Ok(None)
    }

    /// The package, other than `key`, that already claims the archive at `path`.
    ///
    /// Looks at the index first and then at any unregistered blob on disk. An
    /// unregistered blob that is unreadable, or holds this same key, is free to
    /// be overwritten.
    async fn blob_owner(&self, path: &Path, key: &Key) -> Result<Option<Key>> {
        let wanted = blob_lock_key(path);
        let registered = self
            .index
            .read()
            .await
            .iter()
            .find(|(other, record)| *other != key && blob_lock_key(&record.blob) == wanted)
            .map(|(other, record)| (other.clone(), Arc::clone(record)));
        if let Some((other, record)) = registered {
            if self.is_intact(&record).await? {
                return Ok(Some(other));
            }
            self.evict(&other, &record).await;
        }

        let bytes = match self.backend.read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Storage),
        };
        match tokio::task::spawn_blocking(move || nupack_manifest::extract(bytes)).await {
            Ok(Ok(manifest)) => {
                let owner = Key::new(&manifest.id, &manifest.version);
                if owner != *key {
                    return Ok(Some(owner));
                }
                tracing::warn!(path = %path.display(), "Overwriting unregistered copy of this package");
            },
            _ => tracing::warn!(path = %path.display(), "Overwriting unreadable unregistered blob"),
        }
        Ok(None)
    }

    /// Every visible record matching `query`, ordered by id (ignoring case)
    /// and then ascending version.
    pub async fn find(&self, query: &Query) -> Result<Vec<Arc<PackageRecord>>> {
        let candidates = self
            .index
            .read()
            .await
            .iter()
            .filter(|(_, record)| query.matches(record))
            .map(|(key, record)| (key.clone(), Arc::clone(record)))
            .collect::<Vec<_>>();
        let checked = stream::iter(candidates)
            .map(|(key, record)| async move {
                let intact = self.is_intact(&record).await?;
                Ok::<_, Error>((key, record, intact))
            })
            .buffered(VERIFY_CONCURRENCY)
            .try_collect::<Vec<_>>()
            .await?;
        let mut visible = Vec::with_capacity(checked.len());
        for (key, record, intact) in checked {
            match intact {
                true => visible.push(record),
                false => self.evict(&key, &record).await,
            }
        }
        sort_records(&mut visible);
        Ok(visible)
    }

    /// Register a package, writing its archive first.
    ///
    /// The index entry only appears once the blob write is durable; if the
    /// process dies in between, the next rebuild picks the blob up. The
    /// record's size is taken from `blob`.
    ///
    /// # Errors
    ///
    /// [`Conflict`](ErrorKind::Conflict) if the key is already registered or
    /// its archive path already holds another package,
    /// [`Storage`](ErrorKind::Storage) if the blob cannot be written.
    #[instrument(skip(self, record, blob), fields(id = %record.id, version = %record.version, size = blob.len()))]
    pub async fn put(&self, mut record: PackageRecord, blob: &[u8]) -> Result<Arc<PackageRecord>> {
        let _gate = self.gate.read().await;
        let key = record.key();
        let _lock = self.locks.lock(&key).await;
        if self.lookup(&key).await?.is_some() {
            exn::bail!(ErrorKind::Conflict { id: record.id, version: record.version });
        }
        let _blob_lock = self.blob_locks.lock(&blob_lock_key(&record.blob)).await;
        if let Some(owner) = self.blob_owner(&record.blob, &key).await? {
            tracing::warn!(
                path = %record.blob.display(),
                owner_id = %owner.id,
                owner_version = %owner.version,
                "Archive path already holds another package"
            );
            exn::bail!(ErrorKind::Conflict { id: record.id, version: record.version });
        }
        record.size = blob.len() as u64;
        self.backend.write(&record.blob, blob).await.or_raise(|| ErrorKind::Storage)?;
        let record = Arc::new(record);
        self.index.write().await.insert(key, Arc::clone(&record));
        tracing::info!("Package registered");
        Ok(record)
    }

    /// Look up one version. The id is matched ignoring case and the version
    /// after normalization, so `foo 1.0` finds `Foo 1.0.0`.
    pub async fn get(&self, id: &str, version: &str) -> Result<Option<Arc<PackageRecord>>> {
        self.lookup(&Key::new(id, version)).await
    }

    /// One page of [`find`](Self::find).
    pub async fn list(&self, query: &Query, skip: usize, take: usize) -> Result<Vec<Arc<PackageRecord>>> {
        Ok(self.find(query).await?.into_iter().skip(skip).take(take).collect())
    }

    /// Number of records [`list`](Self::list) would page over.
    pub async fn count(&self, query: &Query) -> Result<usize> {
        Ok(self.find(query).await?.len())
    }

    /// All versions of one package id, ascending.
    pub async fn versions(&self, id: &str) -> Result<Vec<Arc<PackageRecord>>> {
        self.find(&Query::id(id)).await
    }

    /// Distinct package ids, in the spelling of each id's lowest version.
    pub async fn package_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        for record in self.find(&Query::All).await? {
            if ids.last().is_none_or(|last| last.to_lowercase() != record.id.to_lowercase()) {
                ids.push(record.id.clone());
            }
        }
        Ok(ids)
    }

    /// Remove a package and its archive.
    ///
    /// Returns the removed record, or `None` if nothing visible was
    /// registered under the key. A registered entry whose blob is already
    /// gone is cleaned up and reported as `None`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str, version: &str) -> Result<Option<Arc<PackageRecord>>> {
        let _gate = self.gate.read().await;
        let key = Key::new(id, version);
        let _lock = self.locks.lock(&key).await;
        let Some(record) = self.index.read().await.get(&key).cloned() else {
            return Ok(None);
        };
        let _blob_lock = self.blob_locks.lock(&blob_lock_key(&record.blob)).await;
        let removed = match self.backend.delete(&record.blob).await {
            Ok(()) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e).or_raise(|| ErrorKind::Storage),
        };
        self.index.write().await.remove(&key);
        if !removed {
            tracing::warn!(path = %record.blob.display(), "Blob already missing; removed stale index entry");
            return Ok(None);
        }
        tracing::info!("Package deleted");
        Ok(Some(record))
    }

    /// Read a record's archive.
    ///
    /// Returns `None` (and evicts the entry) if the blob has vanished or
    /// changed size since the record was obtained.
    pub async fn read_blob(&self, record: &Arc<PackageRecord>) -> Result<Option<Vec<u8>>> {
        match self.backend.read(&record.blob).await {
            Ok(bytes) if bytes.len() as u64 == record.size => Ok(Some(bytes)),
            Ok(_) => {
                self.evict(&record.key(), record).await;
                Ok(None)
            },
            Err(e) if e.is_not_found() => {
                self.evict(&record.key(), record).await;
                Ok(None)
            },
            Err(e) => Err(e).or_raise(|| ErrorKind::Storage),
        }
    }

    async fn load(&self, file: FileInfo) -> Option<PackageRecord> {
        let path = file.path.display().to_string();
        let bytes = match self.backend.read(&file.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%path, error = ?e, "Cannot read package archive; skipping");
                return None;
            },
        };
        let size = bytes.len() as u64;
        let manifest = match tokio::task::spawn_blocking(move || nupack_manifest::extract(bytes)).await {
            Ok(Ok(manifest)) => manifest,
            Ok(Err(e)) => {
                tracing::warn!(%path, error = ?e, "Corrupt package archive; skipping");
                return None;
            },
            Err(e) => {
                tracing::warn!(%path, error = %e, "Manifest extraction aborted; skipping");
                return None;
            },
        };
        match PackageRecord::from_manifest(manifest, size, file.modified) {
            Ok(record) => Some(record.with_blob(file.path)),
            Err(e) => {
                tracing::warn!(%path, error = ?e, "Package version does not parse; skipping");
                None
            },
        }
    }

    /// Replace the whole index with one rebuilt from the archives in storage.
    ///
    /// Unreadable or corrupt archives are logged and skipped. When two
    /// archives claim the same key, the first by path wins. Creation and
    /// publication times are taken from the blobs' modification times.
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let _gate = self.gate.write().await;
        let mut report = RebuildReport::default();

        let mut files = Vec::new();
        let mut listing = self.backend.list_stream(None);
        while let Some(entry) = listing.next().await {
            match entry {
                Ok(file) if file.has_extension(PACKAGE_EXTENSION) => files.push(file),
                Ok(_) => {},
                Err(e) => {
                    report.skipped += 1;
                    tracing::warn!(error = ?e, "Unreadable entry in package listing; skipping");
                },
            }
        }
        drop(listing);
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let loaded = stream::iter(files)
            .map(|file| self.load(file))
            .buffered(REBUILD_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;
        let mut index = Index::with_capacity(loaded.len());
        for record in loaded {
            let Some(record) = record else {
                report.skipped += 1;
                continue;
            };
            match index.entry(record.key()) {
                Entry::Occupied(existing) => {
                    report.skipped += 1;
                    tracing::warn!(
                        path = %record.blob.display(),
                        kept = %existing.get().blob.display(),
                        "Duplicate package archive; skipping"
                    );
                },
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(record));
                    report.loaded += 1;
                },
            }
        }
        *self.index.write().await = index;
        tracing::info!(loaded = report.loaded, skipped = report.skipped, "Package index rebuilt");
        Ok(report)
    }
}
