use crate::models::{SERVICE_INDEX_VERSION, ServiceIndex, ServiceResource};
use crate::url::BaseUrl;

const CONTENT_COMMENT: &str = "Base URL of where NuGet packages are stored, in the format \
    {base}/v3-flatcontainer/{id-lower}/{version-lower}/{id-lower}.{version-lower}.nupkg";
const SEARCH_COMMENT: &str = "Query endpoint of NuGet Search service (primary)";
const REGISTRATIONS_COMMENT: &str = "Base URL of where NuGet package registration info is stored, in the format \
    {base}/v3/registrations/{id-lower}/index.json";

fn resource(url: String, kind: &str, comment: &str) -> ServiceResource {
    ServiceResource { url, kind: kind.to_string(), comment: Some(comment.to_string()) }
}

/// Discovery document listing the flat container, search and registration
/// roots. Search and registrations are advertised under every type tag
/// clients probe for.
pub fn service_index(base: &BaseUrl) -> ServiceIndex {
    let mut resources = vec![resource(base.flat_container(), "PackageBaseAddress/3.0.0", CONTENT_COMMENT)];
    for kind in ["SearchQueryService", "SearchQueryService/3.0.0-beta", "SearchQueryService/3.0.0-rc"] {
        resources.push(resource(base.search(), kind, SEARCH_COMMENT));
    }
    for kind in ["RegistrationsBaseUrl", "RegistrationsBaseUrl/3.0.0-beta", "RegistrationsBaseUrl/3.0.0-rc"] {
        resources.push(resource(base.registrations(), kind, REGISTRATIONS_COMMENT));
    }
    ServiceIndex { version: SERVICE_INDEX_VERSION.to_string(), resources }
}
