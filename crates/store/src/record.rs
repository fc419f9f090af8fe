use nupack_manifest::{DependencyGroup, Manifest, PACKAGE_EXTENSION};
use nupack_version::Version;
use nupack_version::error::Result as VersionResult;
use std::path::PathBuf;
use time::OffsetDateTime;

/// Case-insensitive identity of a package version.
///
/// Both halves are lowercase; the version is in normalized form whenever it
/// parses, so `Foo 1.0` and `foo 1.0.0` share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub id: String,
    pub version: String,
}
impl Key {
    pub fn new(id: &str, version: &str) -> Self {
        let version = match Version::parse(version) {
            Ok(parsed) => parsed.to_lowercase(),
            Err(_) => version.trim().to_lowercase(),
        };
        Self { id: id.trim().to_lowercase(), version }
    }
}

/// One stored package version.
///
/// Records are immutable once registered. "Latest" flags are not stored;
/// they are derived from the current snapshot whenever they are needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    /// Package id as written by the author
    pub id: String,
    /// Normalized version (original case of the prerelease label preserved)
    pub version: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub authors: Vec<String>,
    pub owners: Vec<String>,
    pub tags: Vec<String>,
    pub release_notes: Option<String>,
    pub copyright: Option<String>,
    pub language: Option<String>,
    pub icon_url: Option<String>,
    pub project_url: Option<String>,
    pub license_url: Option<String>,
    pub require_license_acceptance: bool,
    /// Dependencies exactly as declared, per target framework
    pub dependency_groups: Vec<DependencyGroup>,
    /// Distinct dependency ids across all groups
    pub dependencies: Vec<String>,
    pub created: OffsetDateTime,
    pub published: OffsetDateTime,
    /// Byte length of the stored archive
    pub size: u64,
    /// Path of the archive relative to the storage root
    pub blob: PathBuf,
}

impl PackageRecord {
    /// Build a record from an extracted manifest.
    ///
    /// The blob path defaults to [`file_name()`](Self::file_name); use
    /// [`with_blob`](Self::with_blob) when the archive already lives elsewhere.
    ///
    /// # Errors
    ///
    /// Fails if the manifest version does not parse.
    pub fn from_manifest(manifest: Manifest, size: u64, timestamp: OffsetDateTime) -> VersionResult<Self> {
        let version = Version::parse(&manifest.version)?.to_string();
        let dependencies = manifest.dependency_ids();
        let mut record = Self {
            id: manifest.id,
            version,
            title: manifest.title,
            description: manifest.description,
            summary: manifest.summary,
            authors: manifest.authors,
            owners: manifest.owners,
            tags: manifest.tags,
            release_notes: manifest.release_notes,
            copyright: manifest.copyright,
            language: manifest.language,
            icon_url: manifest.icon_url,
            project_url: manifest.project_url,
            license_url: manifest.license_url,
            require_license_acceptance: manifest.require_license_acceptance,
            dependency_groups: manifest.dependency_groups,
            dependencies,
            created: timestamp,
            published: timestamp,
            size,
            blob: PathBuf::new(),
        };
        record.blob = PathBuf::from(record.file_name());
        Ok(record)
    }

    pub fn with_blob(mut self, blob: impl Into<PathBuf>) -> Self {
        self.blob = blob.into();
        self
    }

    pub fn key(&self) -> Key {
        Key::new(&self.id, &self.version)
    }

    /// Canonical archive file name: `{id}.{version}.nupkg`.
    pub fn file_name(&self) -> String {
        format!("{}.{}.{PACKAGE_EXTENSION}", self.id, self.version)
    }

    pub fn is_prerelease(&self) -> bool {
        nupack_version::is_prerelease(&self.version)
    }

    pub fn authors_display(&self) -> String {
        self.authors.join(", ")
    }

    pub fn owners_display(&self) -> String {
        self.owners.join(", ")
    }

    /// Case-insensitive substring match against id, description and tags.
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.id.to_lowercase().contains(&needle)
            || self.description.as_deref().is_some_and(|d| d.to_lowercase().contains(&needle))
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(&needle))
    }
}
