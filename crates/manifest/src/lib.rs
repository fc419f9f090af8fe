//! Package archive inspection.
//!
//! A `.nupkg` is a zip archive with exactly one `.nuspec` manifest at its
//! root. This crate locates that manifest and turns it into a [`Manifest`];
//! it never touches the rest of the archive.

pub mod error;
#[cfg(feature = "fixtures")]
pub mod fixtures;
mod models;
mod nuspec;

use crate::error::{ErrorKind, Result};
pub use crate::models::{Dependency, DependencyGroup, Manifest};
use exn::ResultExt;
use std::io::{Cursor, Read};
use tracing::instrument;
use zip::ZipArchive;

/// Archive file extension, without the leading dot.
pub const PACKAGE_EXTENSION: &str = "nupkg";
const MANIFEST_EXTENSION: &str = ".nuspec";
/// Local file header signature that every zip archive starts with.
pub const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

fn open(archive: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>> {
    if !archive.starts_with(&ZIP_MAGIC) {
        exn::bail!(ErrorKind::Archive);
    }
    ZipArchive::new(Cursor::new(archive)).or_raise(|| ErrorKind::Archive)
}

fn manifest_entry(archive: &ZipArchive<Cursor<&[u8]>>) -> Result<String> {
    let mut candidates = archive
        .file_names()
        .filter(|name| !name.contains('/') && name.to_ascii_lowercase().ends_with(MANIFEST_EXTENSION))
        .map(str::to_string)
        .collect::<Vec<_>>();
    match candidates.len() {
        0 => exn::bail!(ErrorKind::MissingManifest),
        1 => Ok(candidates.remove(0)),
        n => exn::bail!(ErrorKind::AmbiguousManifest(n)),
    }
}

/// Raw bytes of the archive's `.nuspec` manifest, exactly as packed.
///
/// # Errors
///
/// Fails if the input is not a zip archive or does not contain exactly one
/// root-level manifest.
#[instrument(skip(archive), fields(archive_size = archive.as_ref().len()))]
pub fn nuspec(archive: impl AsRef<[u8]>) -> Result<Vec<u8>> {
    let mut archive = open(archive.as_ref())?;
    let name = manifest_entry(&archive)?;
    let mut entry = archive.by_name(&name).or_raise(|| ErrorKind::Archive)?;
    let mut document = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or_default());
    entry.read_to_end(&mut document).or_raise(|| ErrorKind::Archive)?;
    Ok(document)
}

/// Top-level entrypoint: read and parse the manifest of a package archive.
///
/// CPU-bound and synchronous; async callers should run it on a blocking
/// thread.
///
/// # Errors
///
/// Anything [`nuspec`] rejects, plus [`MalformedManifest`](ErrorKind::MalformedManifest)
/// for unreadable XML and [`MissingField`](ErrorKind::MissingField) when the
/// id or version is absent.
#[instrument(skip(archive), fields(archive_size = archive.as_ref().len(), id, version))]
pub fn extract(archive: impl AsRef<[u8]>) -> Result<Manifest> {
    let document = nuspec(archive)?;
    let document = std::str::from_utf8(&document).or_raise(|| ErrorKind::MalformedManifest)?;
    let manifest = nuspec::parse(document)?;
    tracing::Span::current().record("id", manifest.id.as_str()).record("version", manifest.version.as_str());
    Ok(manifest)
}
