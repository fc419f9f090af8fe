use crate::error::{ErrorKind, Result};
use derive_more::Display;
use nupack_manifest::PACKAGE_EXTENSION;
use std::str::FromStr;

/// Path of the flat container (package base address) below the base URL.
pub const FLAT_CONTAINER_ROOT: &str = "v3-flatcontainer";
/// Path of the search endpoint below the base URL.
pub const SEARCH_ROOT: &str = "v3/search";
/// Path of the registration tree below the base URL.
pub const REGISTRATIONS_ROOT: &str = "v3/registrations";

/// The externally visible root every protocol link is built from.
///
/// Never guessed: the caller resolves it (from a request, configuration, or
/// the command line) and passes it in. Trailing slashes are dropped so links
/// can always be joined with a single `/`.
///
/// ```
/// use nupack_protocol::BaseUrl;
///
/// let base = BaseUrl::new("https://pkgs.example.com/feed/").unwrap();
/// assert_eq!(base.as_str(), "https://pkgs.example.com/feed");
/// assert_eq!(
///     base.package_content("Foo", "2.0.0-Beta"),
///     "https://pkgs.example.com/feed/v3-flatcontainer/foo/2.0.0-beta/foo.2.0.0-beta.nupkg",
/// );
/// assert!(BaseUrl::new(" / ").is_err());
/// ```
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
#[display("{_0}")]
pub struct BaseUrl(String);

impl BaseUrl {
    pub fn new(url: impl AsRef<str>) -> Result<Self> {
        let raw = url.as_ref();
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            exn::bail!(ErrorKind::InvalidBaseUrl(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn flat_container(&self) -> String {
        format!("{}/{FLAT_CONTAINER_ROOT}/", self.0)
    }

    pub fn search(&self) -> String {
        format!("{}/{SEARCH_ROOT}", self.0)
    }

    pub fn registrations(&self) -> String {
        format!("{}/{REGISTRATIONS_ROOT}/", self.0)
    }

    pub fn registration_index(&self, id: &str) -> String {
        format!("{}{}/index.json", self.registrations(), id.to_lowercase())
    }

    pub fn registration_page(&self, id: &str, lower: &str, upper: &str) -> String {
        format!(
            "{}{}/page/{}/{}.json",
            self.registrations(),
            id.to_lowercase(),
            lower.to_lowercase(),
            upper.to_lowercase()
        )
    }

    pub fn registration_leaf(&self, id: &str, version: &str) -> String {
        format!("{}{}/{}.json", self.registrations(), id.to_lowercase(), version.to_lowercase())
    }

    /// `{base}/v3-flatcontainer/{id}/{version}/{id}.{version}.nupkg`, all lowercase.
    pub fn package_content(&self, id: &str, version: &str) -> String {
        let (id, version) = (id.to_lowercase(), version.to_lowercase());
        format!("{}{id}/{version}/{id}.{version}.{PACKAGE_EXTENSION}", self.flat_container())
    }
}

impl FromStr for BaseUrl {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://localhost:5000", "http://localhost:5000")]
    #[case("http://localhost:5000/", "http://localhost:5000")]
    #[case("  https://example.com/nuget//  ", "https://example.com/nuget")]
    fn test_new(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(BaseUrl::new(input).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("///")]
    #[case("http://exa mple.com")]
    fn test_rejected(#[case] input: &str) {
        let err = BaseUrl::new(input).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidBaseUrl(input.to_string()));
    }

    #[test]
    fn test_links_are_lowercase() {
        let base: BaseUrl = "http://host".parse().unwrap();
        assert_eq!(base.flat_container(), "http://host/v3-flatcontainer/");
        assert_eq!(base.search(), "http://host/v3/search");
        assert_eq!(base.registration_index("Foo.Bar"), "http://host/v3/registrations/foo.bar/index.json");
        assert_eq!(base.registration_leaf("Foo", "1.0.0-RC"), "http://host/v3/registrations/foo/1.0.0-rc.json");
        assert_eq!(
            base.registration_page("Foo", "1.0.0", "2.0.0-Beta"),
            "http://host/v3/registrations/foo/page/1.0.0/2.0.0-beta.json"
        );
    }
}
