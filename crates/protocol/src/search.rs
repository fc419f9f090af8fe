use crate::error::{ErrorKind, Result};
use crate::models::{PackageType, SearchResponse, SearchResult, SearchVersion};
use crate::url::BaseUrl;
use exn::ResultExt;
use nupack_store::{PackageRecord, Query, Store};
use std::sync::Arc;
use tracing::instrument;

/// Page size when the caller does not ask for one.
pub const DEFAULT_TAKE: usize = 20;

/// Search request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    /// Free text matched against id, description and tags; blank matches all
    pub query: Option<String>,
    pub skip: usize,
    pub take: usize,
    pub include_prerelease: bool,
}
impl Default for SearchParams {
    fn default() -> Self {
        Self { query: None, skip: 0, take: DEFAULT_TAKE, include_prerelease: true }
    }
}

struct Group {
    records: Vec<Arc<PackageRecord>>,
    representative: Arc<PackageRecord>,
    downloads: u64,
}

impl Group {
    fn new(mut records: Vec<Arc<PackageRecord>>) -> Option<Self> {
        nupack_version::sort_versions(&mut records, |r| r.version.as_str());
        let representative = Arc::clone(records.last()?);
        // Downloads are not tracked.
        Some(Self { records, representative, downloads: 0 })
    }

    fn into_result(self, base: &BaseUrl) -> SearchResult {
        let latest = self.representative;
        let registration = base.registration_index(&latest.id);
        let versions = self
            .records
            .iter()
            .map(|r| SearchVersion {
                version: r.version.clone(),
                downloads: 0,
                url: base.registration_leaf(&r.id, &r.version),
            })
            .collect();
        SearchResult {
            url: registration.clone(),
            kind: "Package".to_string(),
            registration,
            id: latest.id.clone(),
            version: latest.version.clone(),
            description: latest.description.clone(),
            summary: latest.summary.clone(),
            title: latest.title.clone().unwrap_or_else(|| latest.id.clone()),
            icon_url: latest.icon_url.clone(),
            license_url: latest.license_url.clone(),
            project_url: latest.project_url.clone(),
            tags: latest.tags.clone(),
            authors: latest.authors.clone(),
            total_downloads: self.downloads,
            verified: false,
            package_types: vec![PackageType { name: "Dependency".to_string() }],
            versions,
        }
    }
}

/// Split records into runs sharing an id (ignoring case).
fn group_by_id(records: impl IntoIterator<Item = Arc<PackageRecord>>) -> Vec<Vec<Arc<PackageRecord>>> {
    let mut groups: Vec<Vec<Arc<PackageRecord>>> = Vec::new();
    for record in records {
        match groups.last_mut() {
            Some(group) if group.first().is_some_and(|first| first.id.to_lowercase() == record.id.to_lowercase()) => {
                group.push(record)
            },
            _ => groups.push(vec![record]),
        }
    }
    groups
}

/// Search packages, one result per id.
///
/// Prerelease versions are dropped first when `include_prerelease` is off,
/// so the representative of each id is the highest version that remains.
/// Results are ordered by downloads (descending) and then id.
#[instrument(skip(store, base), fields(query = params.query.as_deref(), skip = params.skip, take = params.take))]
pub async fn search(store: &Store, params: &SearchParams, base: &BaseUrl) -> Result<SearchResponse> {
    let query = params.query.as_deref().map_or(Query::All, Query::text);
    // `find` orders by id, so every id forms one contiguous run.
    let records = store
        .find(&query)
        .await
        .or_raise(|| ErrorKind::Store)?
        .into_iter()
        .filter(|r| params.include_prerelease || !r.is_prerelease());
    let mut groups = group_by_id(records).into_iter().filter_map(Group::new).collect::<Vec<_>>();
    groups.sort_by(|a, b| {
        b.downloads
            .cmp(&a.downloads)
            .then_with(|| a.representative.id.to_lowercase().cmp(&b.representative.id.to_lowercase()))
    });

    let total_hits = groups.len();
    let data = groups.into_iter().skip(params.skip).take(params.take).map(|g| g.into_result(base)).collect();
    tracing::debug!(total_hits, "Search complete");
    Ok(SearchResponse { total_hits, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{base, publish, store};
    use rstest::rstest;

    async fn seeded() -> Store {
        let store = store();
        publish(&store, "Foo", "1.0.0").await;
        publish(&store, "Foo", "2.0.0-beta").await;
        publish(&store, "foo.Extensions", "0.9.0").await;
        publish(&store, "Bar", "3.1.0").await;
        publish(&store, "Bar", "3.0.0").await;
        publish(&store, "Preview", "0.1.0-alpha").await;
        store
    }

    #[rstest]
    #[case::stable_only(false, "1.0.0")]
    #[case::with_prerelease(true, "2.0.0-beta")]
    #[tokio::test]
    async fn test_representative(#[case] include_prerelease: bool, #[case] expected: &str) {
        let store = seeded().await;
        let params = SearchParams { query: Some("foo".to_string()), include_prerelease, ..Default::default() };
        let response = search(&store, &params, &base()).await.unwrap();
        assert_eq!(response.total_hits, 2);
        let foo = &response.data[0];
        assert_eq!(foo.id, "Foo");
        assert_eq!(foo.version, expected);
        assert_eq!(foo.versions.last().map(|v| v.version.as_str()), Some(expected));
        assert_eq!(response.data[1].id, "foo.Extensions");
    }

    #[tokio::test]
    async fn test_prerelease_only_ids_disappear() {
        let store = seeded().await;
        let params = SearchParams { include_prerelease: false, ..Default::default() };
        let response = search(&store, &params, &base()).await.unwrap();
        let ids = response.data.iter().map(|r| r.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["Bar", "Foo", "foo.Extensions"]);
        assert!(response.data.iter().all(|r| !r.version.contains('-')));
    }

    #[tokio::test]
    async fn test_result_shape() {
        let store = seeded().await;
        let params = SearchParams { query: Some("bar".to_string()), ..Default::default() };
        let response = search(&store, &params, &base()).await.unwrap();
        let bar = &response.data[0];
        assert_eq!(bar.version, "3.1.0");
        assert_eq!(bar.title, "Bar");
        assert_eq!(bar.url, "http://localhost:5000/v3/registrations/bar/index.json");
        assert_eq!(bar.registration, bar.url);
        assert_eq!(bar.versions[0].version, "3.0.0");
        assert_eq!(bar.versions[0].url, "http://localhost:5000/v3/registrations/bar/3.0.0.json");
        assert_eq!(bar.package_types, [PackageType { name: "Dependency".to_string() }]);

        let json = serde_json::to_value(bar).unwrap();
        assert_eq!(json["@type"], "Package");
        assert_eq!(json["totalDownloads"], 0);
        assert_eq!(json["verified"], false);
    }

    #[rstest]
    #[case(0, 2, &["Bar", "Foo"])]
    #[case(2, 2, &["foo.Extensions", "Preview"])]
    #[case(4, 2, &[])]
    #[tokio::test]
    async fn test_pagination(#[case] skip: usize, #[case] take: usize, #[case] expected: &[&str]) {
        let store = seeded().await;
        let params = SearchParams { skip, take, ..Default::default() };
        let response = search(&store, &params, &base()).await.unwrap();
        assert_eq!(response.total_hits, 4);
        let ids = response.data.iter().map(|r| r.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, expected);
    }
}
