use crate::error::{ErrorKind, Result};
use crate::models::{PackageList, PackageSummary, PackageVersions};
use exn::ResultExt;
use nupack_store::{PackageRecord, Query, Store};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Flat container listing for `id`, or `None` if it has no versions.
#[instrument(skip(store))]
pub async fn versions(store: &Store, id: &str) -> Result<Option<PackageVersions>> {
    let records = store.versions(id).await.or_raise(|| ErrorKind::Store)?;
    if records.is_empty() {
        return Ok(None);
    }
    let versions = records.iter().map(|r| r.version.to_lowercase()).collect();
    Ok(Some(PackageVersions { versions }))
}

/// The archive bytes of one version.
#[instrument(skip(store))]
pub async fn content(store: &Store, id: &str, version: &str) -> Result<Option<Vec<u8>>> {
    let Some(record) = store.get(id, version).await.or_raise(|| ErrorKind::Store)? else {
        return Ok(None);
    };
    store.read_blob(&record).await.or_raise(|| ErrorKind::Store)
}

/// The `.nuspec` document embedded in one version's archive.
#[instrument(skip(store))]
pub async fn manifest(store: &Store, id: &str, version: &str) -> Result<Option<Vec<u8>>> {
    let Some(record) = store.get(id, version).await.or_raise(|| ErrorKind::Store)? else {
        return Ok(None);
    };
    let Some(archive) = store.read_blob(&record).await.or_raise(|| ErrorKind::Store)? else {
        return Ok(None);
    };
    let corrupt = || ErrorKind::CorruptPackage { id: record.id.clone(), version: record.version.clone() };
    let document = tokio::task::spawn_blocking(move || nupack_manifest::nuspec(archive))
        .await
        .or_raise(corrupt)?
        .or_raise(corrupt)?;
    Ok(Some(document))
}

pub async fn package_exists(store: &Store, id: &str, version: &str) -> Result<bool> {
    Ok(store.get(id, version).await.or_raise(|| ErrorKind::Store)?.is_some())
}

/// Distinct package ids, ordered ignoring case.
pub async fn package_ids(store: &Store) -> Result<Vec<String>> {
    store.package_ids().await.or_raise(|| ErrorKind::Store)
}

#[derive(Default)]
struct Latest {
    any: Option<String>,
    stable: Option<String>,
}

/// Highest and highest non-prerelease version per lowercase id.
fn latest_versions(records: &[Arc<PackageRecord>]) -> HashMap<String, Latest> {
    let mut by_id: HashMap<String, Vec<&Arc<PackageRecord>>> = HashMap::new();
    for record in records {
        by_id.entry(record.id.to_lowercase()).or_default().push(record);
    }
    by_id
        .into_iter()
        .map(|(id, versions)| {
            let any = nupack_version::max_version(versions.iter().copied(), |r| r.version.as_str()).value;
            let stable = versions.iter().copied().filter(|r| !r.is_prerelease());
            let stable = nupack_version::max_version(stable, |r| r.version.as_str()).value;
            let latest = Latest { any: any.map(|r| r.version.clone()), stable: stable.map(|r| r.version.clone()) };
            (id, latest)
        })
        .collect()
}

fn summary(record: &PackageRecord, latest: Option<&Latest>) -> PackageSummary {
    let is = |version: Option<&String>| version.is_some_and(|v| *v == record.version);
    PackageSummary {
        id: record.id.clone(),
        version: record.version.clone(),
        title: record.title.clone(),
        description: record.description.clone(),
        summary: record.summary.clone(),
        authors: record.authors_display(),
        owners: record.owners_display(),
        tags: record.tags.clone(),
        release_notes: record.release_notes.clone(),
        copyright: record.copyright.clone(),
        language: record.language.clone(),
        icon_url: record.icon_url.clone(),
        project_url: record.project_url.clone(),
        license_url: record.license_url.clone(),
        require_license_acceptance: record.require_license_acceptance,
        dependencies: record.dependencies.clone(),
        created: record.created,
        published: record.published,
        size: record.size,
        file_name: record.file_name(),
        is_prerelease: record.is_prerelease(),
        is_latest_version: is(latest.and_then(|l| l.any.as_ref())),
        is_absolute_latest_version: is(latest.and_then(|l| l.stable.as_ref())),
    }
}

/// Legacy per-version listing.
///
/// The latest flags are computed against every stored version of each id,
/// not only the ones matching `query`.
#[instrument(skip(store))]
pub async fn packages(store: &Store, query: &Query, skip: usize, take: usize) -> Result<PackageList> {
    let matching = store.find(query).await.or_raise(|| ErrorKind::Store)?;
    let all = match query {
        Query::All => matching.clone(),
        _ => store.find(&Query::All).await.or_raise(|| ErrorKind::Store)?,
    };
    let latest = latest_versions(&all);
    let total_count = matching.len();
    let packages = matching
        .iter()
        .skip(skip)
        .take(take)
        .map(|r| summary(r, latest.get(&r.id.to_lowercase())))
        .collect();
    Ok(PackageList { packages, total_count })
}
