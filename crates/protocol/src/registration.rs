//! Registration tree: index, page and leaf documents.
//!
//! Every id has exactly one page holding all of its versions, however many
//! there are.

use crate::error::{ErrorKind, Result};
use crate::models::{
    CatalogDependency, CatalogDependencyGroup, CatalogEntry, RegistrationIndex, RegistrationLeaf, RegistrationPage,
};
use crate::url::BaseUrl;
use exn::ResultExt;
use nupack_store::{PackageRecord, Store};
use std::sync::Arc;
use tracing::instrument;

/// Range given to every dependency: the recorded ranges are not resolved.
pub const OPEN_RANGE: &str = "(, )";

const INDEX_TYPES: [&str; 3] = ["catalog:CatalogRoot", "PackageRegistration", "catalog:Permalink"];

fn dependency_groups(record: &PackageRecord, base: &BaseUrl, leaf_url: &str) -> Vec<CatalogDependencyGroup> {
    if record.dependencies.is_empty() {
        return Vec::new();
    }
    let dependencies = record
        .dependencies
        .iter()
        .map(|id| {
            let registration = base.registration_index(id);
            CatalogDependency {
                url: registration.clone(),
                kind: "PackageDependency".to_string(),
                id: id.clone(),
                range: OPEN_RANGE.to_string(),
                registration,
            }
        })
        .collect();
    vec![CatalogDependencyGroup {
        url: format!("{leaf_url}#dependencygroup"),
        kind: "PackageDependencyGroup".to_string(),
        dependencies,
        target_framework: None,
    }]
}

/// The leaf document for one stored version.
pub fn leaf(record: &PackageRecord, base: &BaseUrl) -> RegistrationLeaf {
    let url = base.registration_leaf(&record.id, &record.version);
    let package_content = base.package_content(&record.id, &record.version);
    let catalog_entry = CatalogEntry {
        url: url.clone(),
        kind: "PackageDetails".to_string(),
        authors: record.authors_display(),
        dependency_groups: dependency_groups(record, base, &url),
        description: record.description.clone(),
        icon_url: record.icon_url.clone(),
        id: record.id.clone(),
        language: record.language.clone(),
        license_url: record.license_url.clone(),
        listed: true,
        package_content: package_content.clone(),
        project_url: record.project_url.clone(),
        published: record.published,
        require_license_acceptance: record.require_license_acceptance,
        summary: record.summary.clone(),
        tags: record.tags.clone(),
        title: record.title.clone().unwrap_or_else(|| record.id.clone()),
        version: record.version.clone(),
    };
    RegistrationLeaf {
        url,
        kind: "Package".to_string(),
        catalog_entry,
        package_content,
        registration: base.registration_index(&record.id),
    }
}

fn page(id: &str, records: &[Arc<PackageRecord>], lower: String, upper: String, base: &BaseUrl) -> RegistrationPage {
    RegistrationPage {
        url: base.registration_page(id, &lower, &upper),
        kind: "catalog:CatalogPage".to_string(),
        count: records.len(),
        items: records.iter().map(|r| leaf(r, base)).collect(),
        lower,
        upper,
    }
}

/// All versions of `id` in a single page, or `None` if there are none.
#[instrument(skip(store, base))]
pub async fn registration_index(store: &Store, id: &str, base: &BaseUrl) -> Result<Option<RegistrationIndex>> {
    let records = store.versions(id).await.or_raise(|| ErrorKind::Store)?;
    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        return Ok(None);
    };
    let (lower, upper) = (first.version.to_lowercase(), last.version.to_lowercase());
    let page = page(id, &records, lower, upper, base);
    Ok(Some(RegistrationIndex {
        url: base.registration_index(id),
        kinds: INDEX_TYPES.iter().map(ToString::to_string).collect(),
        count: 1,
        items: vec![page],
    }))
}

/// Versions of `id` between `lower` and `upper` inclusive, ascending.
///
/// Returns `None` when no version falls in the range.
#[instrument(skip(store, base))]
pub async fn registration_page(
    store: &Store,
    id: &str,
    lower: &str,
    upper: &str,
    base: &BaseUrl,
) -> Result<Option<RegistrationPage>> {
    let (lower, upper) = (lower.trim().to_lowercase(), upper.trim().to_lowercase());
    let mut degraded = false;
    let records = store
        .versions(id)
        .await
        .or_raise(|| ErrorKind::Store)?
        .into_iter()
        .filter(|r| {
            let outcome = nupack_version::in_range(&r.version, &lower, &upper);
            degraded |= outcome.degraded;
            outcome.value
        })
        .collect::<Vec<_>>();
    if degraded {
        tracing::debug!("Range bound is not a valid version; compared lexically");
    }
    if records.is_empty() {
        return Ok(None);
    }
    Ok(Some(page(id, &records, lower, upper, base)))
}

/// One version's leaf, or `None` if that exact version is not stored.
#[instrument(skip(store, base))]
pub async fn registration_leaf(
    store: &Store,
    id: &str,
    version: &str,
    base: &BaseUrl,
) -> Result<Option<RegistrationLeaf>> {
    let record = store.get(id, version).await.or_raise(|| ErrorKind::Store)?;
    Ok(record.map(|r| leaf(&r, base)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{base, publish, publish_with, store};
    use nupack_manifest::fixtures::NupkgBuilder;
    use rstest::rstest;

    #[tokio::test]
    async fn test_index_single_page() {
        let store = store();
        for version in ["2.0.0-beta", "1.0.0", "1.10.0", "1.2.0"] {
            publish(&store, "Foo", version).await;
        }
        let index = registration_index(&store, "FOO", &base()).await.unwrap().unwrap();
        assert_eq!(index.url, "http://localhost:5000/v3/registrations/foo/index.json");
        assert_eq!(index.count, 1);
        assert_eq!(index.kinds, INDEX_TYPES);

        let page = &index.items[0];
        assert_eq!(page.count, 4);
        assert_eq!(page.lower, "1.0.0");
        assert_eq!(page.upper, "2.0.0-beta");
        assert_eq!(page.url, "http://localhost:5000/v3/registrations/foo/page/1.0.0/2.0.0-beta.json");
        let versions = page.items.iter().map(|l| l.catalog_entry.version.as_str()).collect::<Vec<_>>();
        assert_eq!(versions, ["1.0.0", "1.2.0", "1.10.0", "2.0.0-beta"]);
    }

    #[tokio::test]
    async fn test_index_unknown_id() {
        let store = store();
        publish(&store, "Foo", "1.0.0").await;
        assert!(registration_index(&store, "Bar", &base()).await.unwrap().is_none());
    }

    #[rstest]
    #[case("1.0.0", "2.0.0", &["1.0.0", "1.5.0", "2.0.0-beta"])]
    #[case("1.5", "1.5", &["1.5.0"])]
    #[case("1.1.0", "1.4.0", &[])]
    #[case("2.0.0-alpha", "3.0.0", &["2.0.0-beta"])]
    #[tokio::test]
    async fn test_page(#[case] lower: &str, #[case] upper: &str, #[case] expected: &[&str]) {
        let store = store();
        for version in ["0.9.0", "1.0.0", "1.5.0", "2.0.0-beta"] {
            publish(&store, "Foo", version).await;
        }
        let page = registration_page(&store, "foo", lower, upper, &base()).await.unwrap();
        let versions = page
            .iter()
            .flat_map(|p| &p.items)
            .map(|l| l.catalog_entry.version.as_str())
            .collect::<Vec<_>>();
        assert_eq!(versions, expected);
        if let Some(page) = page {
            assert_eq!(page.lower, lower);
            assert_eq!(page.upper, upper);
            assert_eq!(page.count, expected.len());
        }
    }

    #[tokio::test]
    async fn test_leaf() {
        let store = store();
        let archive = NupkgBuilder::new("Contoso.Utility", "1.2.0-RC")
            .element("authors", "Alice, Bob")
            .element("description", "Helpers")
            .element("tags", "util helpers")
            .element("requireLicenseAcceptance", "true")
            .dependency_group(Some("net6.0"), [("Newtonsoft.Json", "13.0.1"), ("Serilog", "")])
            .dependency_group(Some("netstandard2.0"), [("newtonsoft.json", "12.0.0")])
            .build();
        publish_with(&store, archive).await;

        let leaf = registration_leaf(&store, "contoso.utility", "1.2.0-rc", &base()).await.unwrap().unwrap();
        assert_eq!(leaf.url, "http://localhost:5000/v3/registrations/contoso.utility/1.2.0-rc.json");
        assert_eq!(
            leaf.package_content,
            "http://localhost:5000/v3-flatcontainer/contoso.utility/1.2.0-rc/contoso.utility.1.2.0-rc.nupkg"
        );
        assert_eq!(leaf.registration, "http://localhost:5000/v3/registrations/contoso.utility/index.json");

        let entry = &leaf.catalog_entry;
        assert_eq!(entry.id, "Contoso.Utility");
        assert_eq!(entry.version, "1.2.0-RC");
        assert_eq!(entry.authors, "Alice, Bob");
        assert_eq!(entry.title, "Contoso.Utility");
        assert_eq!(entry.tags, ["util", "helpers"]);
        assert!(entry.listed);
        assert!(entry.require_license_acceptance);

        let [group] = entry.dependency_groups.as_slice() else {
            panic!("expected one dependency group: {:?}", entry.dependency_groups);
        };
        let ids = group.dependencies.iter().map(|d| d.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["Newtonsoft.Json", "Serilog"]);
        assert!(group.dependencies.iter().all(|d| d.range == OPEN_RANGE));
        assert_eq!(
            group.dependencies[0].registration,
            "http://localhost:5000/v3/registrations/newtonsoft.json/index.json"
        );

        let json = serde_json::to_value(&leaf).unwrap();
        assert_eq!(json["catalogEntry"]["@type"], "PackageDetails");
        assert_eq!(json["catalogEntry"]["dependencyGroups"][0]["@type"], "PackageDependencyGroup");
        assert!(json["catalogEntry"]["published"].is_string());
    }

    #[tokio::test]
    async fn test_leaf_missing_version() {
        let store = store();
        publish(&store, "Foo", "1.0.0").await;
        assert!(registration_leaf(&store, "Foo", "1.0.1", &base()).await.unwrap().is_none());
        assert!(registration_leaf(&store, "Foo", "1.0", &base()).await.unwrap().is_some());
    }
}
