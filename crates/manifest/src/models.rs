/// Package metadata read from a `.nuspec` manifest.
///
/// Only `id` and `version` are mandatory. Every optional text field is
/// trimmed, and blank values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Package id as written by the author (identity is case-insensitive)
    pub id: String,
    /// Version as written, not yet validated or normalized
    pub version: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    /// Authors in declaration order
    pub authors: Vec<String>,
    /// Owners in declaration order
    pub owners: Vec<String>,
    /// Distinct tags in declaration order
    pub tags: Vec<String>,
    pub release_notes: Option<String>,
    pub copyright: Option<String>,
    pub language: Option<String>,
    pub icon_url: Option<String>,
    pub project_url: Option<String>,
    pub license_url: Option<String>,
    pub require_license_acceptance: bool,
    pub dependency_groups: Vec<DependencyGroup>,
}

impl Manifest {
    /// Distinct dependency ids across all groups, in first-seen order.
    ///
    /// Ids are compared case-insensitively; the first spelling wins.
    pub fn dependency_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for dependency in self.dependency_groups.iter().flat_map(|group| &group.dependencies) {
            if !ids.iter().any(|seen| seen.eq_ignore_ascii_case(&dependency.id)) {
                ids.push(dependency.id.clone());
            }
        }
        ids
    }
}

/// Dependencies declared for one target framework.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGroup {
    /// `None` for an ungrouped (framework-agnostic) dependency list
    pub target_framework: Option<String>,
    pub dependencies: Vec<Dependency>,
}

/// A single declared dependency. The range is recorded, never resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub id: String,
    pub range: Option<String>,
}
