//! Package ingestion.
//!
//! Turns an uploaded byte stream into a registered [`PackageRecord`]:
//! validate the upload, read its manifest, refuse duplicates, then hand the
//! archive to the [`Store`], which makes it visible only once it is durable.

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::{AsyncRead, AsyncReadExt};
use nupack_manifest::{PACKAGE_EXTENSION, ZIP_MAGIC};
use nupack_store::{PackageRecord, Store};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

/// Largest accepted upload unless configured otherwise: 250 MiB.
pub const DEFAULT_MAX_PACKAGE_SIZE: u64 = 250 * 1024 * 1024;
/// Longest accepted package id.
pub const MAX_ID_LENGTH: usize = 100;

/// Limits applied to every upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Uploads larger than this many bytes are rejected
    pub max_package_size: u64,
}
impl Default for IngestOptions {
    fn default() -> Self {
        Self { max_package_size: DEFAULT_MAX_PACKAGE_SIZE }
    }
}

fn has_package_extension(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case(PACKAGE_EXTENSION))
}

/// Whether `id` is a well-formed package id.
///
/// Ids are runs of ASCII letters, digits and `_`, joined by single `.` or
/// `-`, and at most [`MAX_ID_LENGTH`] characters long. They end up in file
/// names and URLs verbatim.
pub fn is_valid_id(id: &str) -> bool {
    id.len() <= MAX_ID_LENGTH
        && id
            .split(['.', '-'])
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

async fn read_limited<R: AsyncRead + Unpin>(archive: R, limit: u64) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    // One byte past the limit is enough to know it was exceeded.
    archive.take(limit.saturating_add(1)).read_to_end(&mut bytes).await.or_raise(|| ErrorKind::Read)?;
    if bytes.len() as u64 > limit {
        exn::bail!(ErrorKind::validation(format!("package exceeds the {limit} byte limit")));
    }
    Ok(bytes)
}

/// Validate and register an uploaded package archive.
///
/// `declared_name` is the file name the uploader supplied; it must end in
/// `.nupkg`. On success the returned record has `created` and `published`
/// set to now and `size` set to the archive length.
///
/// # Errors
///
/// - [`Validation`](ErrorKind::Validation): wrong extension, empty or
///   oversized upload, not a zip archive, missing or unreadable manifest, a
///   malformed id, or an unparseable version.
/// - [`Conflict`](ErrorKind::Conflict): the id and version already exist.
/// - [`Read`](ErrorKind::Read) / [`Store`](ErrorKind::Store): I/O failures.
#[instrument(skip(store, archive, options), fields(id, version))]
pub async fn ingest<R: AsyncRead + Unpin>(
    store: &Store,
    archive: R,
    declared_name: &str,
    options: &IngestOptions,
) -> Result<Arc<PackageRecord>> {
    if !has_package_extension(declared_name.trim()) {
        exn::bail!(ErrorKind::validation(format!("file must be a .{PACKAGE_EXTENSION} package")));
    }
    let bytes = read_limited(archive, options.max_package_size).await?;
    if bytes.is_empty() {
        exn::bail!(ErrorKind::validation("package file is empty"));
    }
    if !bytes.starts_with(&ZIP_MAGIC) {
        exn::bail!(ErrorKind::validation("file is not a package archive"));
    }

    let (manifest, bytes) = tokio::task::spawn_blocking(move || (nupack_manifest::extract(&bytes), bytes))
        .await
        .or_raise(|| ErrorKind::validation("package manifest could not be read"))?;
    let manifest = manifest.or_raise(|| ErrorKind::validation("package manifest is missing or malformed"))?;
    tracing::Span::current().record("id", manifest.id.as_str()).record("version", manifest.version.as_str());
    if !is_valid_id(&manifest.id) {
        exn::bail!(ErrorKind::validation(format!("invalid package id {:?}", manifest.id)));
    }

    let size = bytes.len() as u64;
    let raw_version = manifest.version.clone();
    let record = PackageRecord::from_manifest(manifest, size, OffsetDateTime::now_utc())
        .or_raise(|| ErrorKind::validation(format!("invalid package version {raw_version:?}")))?;

    let conflict = || ErrorKind::Conflict { id: record.id.clone(), version: record.version.clone() };
    if store.get(&record.id, &record.version).await.or_raise(|| ErrorKind::Store)?.is_some() {
        exn::bail!(conflict());
    }
    let conflict = conflict();
    match store.put(record, &bytes).await {
        Ok(record) => Ok(record),
        // Lost a race with a concurrent upload of the same version.
        Err(e) if e.is_conflict() => Err(e).or_raise(|| conflict),
        Err(e) => Err(e).or_raise(|| ErrorKind::Store),
    }
}
