//! `.nuspec` document parsing.

use crate::error::{ErrorKind, Result};
use crate::models::{Dependency, DependencyGroup, Manifest};
use exn::{OptionExt, ResultExt};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawPackage {
    metadata: RawMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawMetadata {
    id: Option<String>,
    version: Option<String>,
    title: Option<String>,
    description: Option<String>,
    summary: Option<String>,
    authors: Option<String>,
    owners: Option<String>,
    tags: Option<String>,
    release_notes: Option<String>,
    copyright: Option<String>,
    language: Option<String>,
    icon_url: Option<String>,
    project_url: Option<String>,
    license_url: Option<String>,
    require_license_acceptance: Option<String>,
    dependencies: Option<RawDependencies>,
}

/// Either a list of `<group>` elements or a flat list of `<dependency>`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDependencies {
    #[serde(rename = "group")]
    groups: Vec<RawGroup>,
    #[serde(rename = "dependency")]
    dependencies: Vec<RawDependency>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawGroup {
    #[serde(rename = "@targetFramework")]
    target_framework: Option<String>,
    #[serde(rename = "dependency")]
    dependencies: Vec<RawDependency>,
}

#[derive(Debug, Deserialize)]
struct RawDependency {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@version", default)]
    version: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Comma-separated people lists (`authors`, `owners`).
fn people(value: Option<String>) -> Vec<String> {
    value
        .as_deref()
        .map(|v| v.split(',').map(str::trim).filter(|p| !p.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Tags are separated by whitespace, and in practice also by `,` or `;`.
fn tags(value: Option<String>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let raw = value.unwrap_or_default();
    for tag in raw.split(|c: char| c.is_whitespace() || c == ',' || c == ';').filter(|t| !t.is_empty()) {
        if !tags.iter().any(|seen| seen == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

fn dependencies(raw: Vec<RawDependency>) -> Vec<Dependency> {
    raw.into_iter()
        .filter_map(|dependency| {
            let id = dependency.id.trim();
            // A dependency without an id cannot be echoed back meaningfully.
            (!id.is_empty()).then(|| Dependency { id: id.to_string(), range: clean(dependency.version) })
        })
        .collect()
}

fn dependency_groups(raw: Option<RawDependencies>) -> Vec<DependencyGroup> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let mut groups = raw
        .groups
        .into_iter()
        .map(|group| DependencyGroup {
            target_framework: clean(group.target_framework),
            dependencies: dependencies(group.dependencies),
        })
        .collect::<Vec<_>>();
    let flat = dependencies(raw.dependencies);
    if !flat.is_empty() {
        groups.push(DependencyGroup { target_framework: None, dependencies: flat });
    }
    groups
}

/// Parse a `.nuspec` document.
pub(crate) fn parse(document: &str) -> Result<Manifest> {
    let document = document.trim_start_matches('\u{feff}');
    let raw: RawPackage = quick_xml::de::from_str(document).or_raise(|| ErrorKind::MalformedManifest)?;
    let metadata = raw.metadata;
    Ok(Manifest {
        id: clean(metadata.id).ok_or_raise(|| ErrorKind::MissingField("id"))?,
        version: clean(metadata.version).ok_or_raise(|| ErrorKind::MissingField("version"))?,
        title: clean(metadata.title),
        description: clean(metadata.description),
        summary: clean(metadata.summary),
        authors: people(metadata.authors),
        owners: people(metadata.owners),
        tags: tags(metadata.tags),
        release_notes: clean(metadata.release_notes),
        copyright: clean(metadata.copyright),
        language: clean(metadata.language),
        icon_url: clean(metadata.icon_url),
        project_url: clean(metadata.project_url),
        license_url: clean(metadata.license_url),
        require_license_acceptance: clean(metadata.require_license_acceptance)
            .is_some_and(|v| v.eq_ignore_ascii_case("true")),
        dependency_groups: dependency_groups(metadata.dependencies),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FULL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata minClientVersion="2.12">
    <id>Contoso.Utility</id>
    <version>1.2.0-beta.1</version>
    <title>Contoso Utility</title>
    <authors>Alice, Bob ,</authors>
    <owners>Contoso</owners>
    <requireLicenseAcceptance>True</requireLicenseAcceptance>
    <licenseUrl>https://example.com/license</licenseUrl>
    <projectUrl>https://example.com/</projectUrl>
    <description>Utilities &amp; helpers.</description>
    <summary>   </summary>
    <releaseNotes>First beta.</releaseNotes>
    <copyright>(c) Contoso</copyright>
    <language>en-US</language>
    <tags>util helpers,json;util</tags>
    <dependencies>
      <group targetFramework="net6.0">
        <dependency id="Newtonsoft.Json" version="[13.0.1, )" exclude="Build" />
      </group>
      <group targetFramework="netstandard2.0" />
    </dependencies>
  </metadata>
  <files>
    <file src="bin/**" target="lib" />
  </files>
</package>"#;

    #[test]
    fn test_parse_full_manifest() {
        let manifest = parse(FULL).unwrap();
        assert_eq!(manifest.id, "Contoso.Utility");
        assert_eq!(manifest.version, "1.2.0-beta.1");
        assert_eq!(manifest.title.as_deref(), Some("Contoso Utility"));
        assert_eq!(manifest.authors, ["Alice", "Bob"]);
        assert_eq!(manifest.owners, ["Contoso"]);
        assert!(manifest.require_license_acceptance);
        assert_eq!(manifest.description.as_deref(), Some("Utilities & helpers."));
        assert_eq!(manifest.summary, None);
        assert_eq!(manifest.language.as_deref(), Some("en-US"));
        assert_eq!(manifest.tags, ["util", "helpers", "json"]);
        assert_eq!(manifest.dependency_groups.len(), 2);
        assert_eq!(manifest.dependency_groups[0].target_framework.as_deref(), Some("net6.0"));
        assert_eq!(
            manifest.dependency_groups[0].dependencies,
            [Dependency { id: "Newtonsoft.Json".to_string(), range: Some("[13.0.1, )".to_string()) }]
        );
        assert!(manifest.dependency_groups[1].dependencies.is_empty());
    }

    #[test]
    fn test_parse_flat_dependencies() {
        let document = r#"<package><metadata>
            <id>Foo</id><version>1.0.0</version>
            <dependencies>
              <dependency id="Bar" version="2.0.0" />
              <dependency id="Baz" />
            </dependencies>
        </metadata></package>"#;
        let manifest = parse(document).unwrap();
        assert_eq!(manifest.dependency_groups.len(), 1);
        assert_eq!(manifest.dependency_groups[0].target_framework, None);
        assert_eq!(manifest.dependency_ids(), ["Bar", "Baz"]);
        assert_eq!(manifest.dependency_groups[0].dependencies[1].range, None);
    }

    #[test]
    fn test_parse_minimal_manifest() {
        let manifest = parse("\u{feff}<package><metadata><id> Foo </id><version>1.0</version></metadata></package>").unwrap();
        assert_eq!(manifest.id, "Foo");
        assert_eq!(manifest.version, "1.0");
        assert!(manifest.authors.is_empty());
        assert!(manifest.tags.is_empty());
        assert!(!manifest.require_license_acceptance);
        assert!(manifest.dependency_groups.is_empty());
    }

    #[rstest]
    #[case("<package><metadata><version>1.0.0</version></metadata></package>", ErrorKind::MissingField("id"))]
    #[case("<package><metadata><id>Foo</id></metadata></package>", ErrorKind::MissingField("version"))]
    #[case("<package><metadata><id> </id><version>1.0.0</version></metadata></package>", ErrorKind::MissingField("id"))]
    #[case("<package><files/></package>", ErrorKind::MalformedManifest)]
    #[case("not xml at all", ErrorKind::MalformedManifest)]
    fn test_parse_rejected(#[case] document: &str, #[case] expected: ErrorKind) {
        let err = parse(document).unwrap_err();
        assert_eq!(*err, expected);
    }
}
