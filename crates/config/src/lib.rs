//! Layered configuration.
//!
//! Sources are merged in order, later ones winning:
//!
//! 1. built-in defaults,
//! 2. `nupack.{toml,yaml,yml,json}` in the platform config directory,
//! 3. an explicitly given file (its format picked by extension),
//! 4. `NUPACK_*` environment variables, with `__` separating nested keys
//!    (`NUPACK_SEARCH__MAX_TAKE=500`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use nupack_ingest::{DEFAULT_MAX_PACKAGE_SIZE, IngestOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "NUPACK_";
const APPLICATION: &str = "nupack";
const FILE_STEM: &str = "nupack";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Package root. `${VAR}` references are expanded; relative paths are
    /// taken from the working directory. Unset means the platform data
    /// directory.
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Largest accepted upload, in bytes
    pub max_package_size: u64,
}
impl Default for IngestConfig {
    fn default() -> Self {
        Self { max_package_size: DEFAULT_MAX_PACKAGE_SIZE }
    }
}

impl IngestConfig {
    pub fn options(&self) -> IngestOptions {
        IngestOptions { max_package_size: self.max_package_size }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_take: usize,
    pub max_take: usize,
}
impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_take: 20, max_take: 1000 }
    }
}

impl SearchConfig {
    /// Page size for a request: the default when unspecified, never above
    /// `max_take`.
    pub fn take(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_take).min(self.max_take)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APPLICATION)
}

fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

impl Config {
    /// Load configuration from every layer.
    ///
    /// # Errors
    ///
    /// Fails if `explicit` is given but missing or of an unknown format, if a
    /// source does not parse, or if the merged values are invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(dirs) = project_dirs() {
            for extension in ["toml", "yaml", "yml", "json"] {
                let path = dirs.config_dir().join(format!("{FILE_STEM}.{extension}"));
                if path.is_file() {
                    tracing::debug!(path = %path.display(), "Loading user configuration");
                    figment = file_provider(figment, &path)?;
                }
            }
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = file_provider(figment, path)?;
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate a configuration from an assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.max_package_size == 0 {
            exn::bail!(ErrorKind::Invalid("ingest.max_package_size must be positive".to_string()));
        }
        if self.search.max_take == 0 {
            exn::bail!(ErrorKind::Invalid("search.max_take must be positive".to_string()));
        }
        if self.search.default_take == 0 || self.search.default_take > self.search.max_take {
            exn::bail!(ErrorKind::Invalid(format!(
                "search.default_take must be between 1 and {}",
                self.search.max_take
            )));
        }
        Ok(())
    }

    /// The package root this configuration points at.
    pub fn storage_root(&self) -> Result<PathBuf> {
        self.storage_root_with(|name| std::env::var(name).ok())
    }

    fn storage_root_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
        let Some(raw) = self.storage.path.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
            let dirs = project_dirs().ok_or_raise(|| ErrorKind::NoDataDirectory)?;
            return Ok(dirs.data_dir().join("packages"));
        };
        let path = PathBuf::from(expand_vars(raw, lookup)?);
        if path.is_absolute() {
            return Ok(path);
        }
        let cwd = std::env::current_dir()
            .or_raise(|| ErrorKind::Invalid("cannot resolve relative storage path".to_string()))?;
        Ok(cwd.join(path))
    }
}

/// Replace every `${NAME}` with the value `lookup` gives for it.
fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            exn::bail!(ErrorKind::Invalid(format!("unterminated variable in {input:?}")));
        };
        let name = &after[..end];
        let value = lookup(name).ok_or_raise(|| ErrorKind::UndefinedVariable(name.to_string()))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/user".to_string()),
            "DATA" => Some("data".to_string()),
            _ => None,
        }
    }

    #[rstest]
    #[case("/srv/packages", "/srv/packages")]
    #[case("${HOME}/packages", "/home/user/packages")]
    #[case("${HOME}/${DATA}", "/home/user/data")]
    #[case("$HOME/literal", "$HOME/literal")]
    fn test_expand_vars(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(expand_vars(input, lookup).unwrap(), expected);
    }

    #[rstest]
    #[case("${MISSING}/x", ErrorKind::UndefinedVariable("MISSING".to_string()))]
    #[case("${HOME", ErrorKind::Invalid("unterminated variable in \"${HOME\"".to_string()))]
    fn test_expand_vars_errors(#[case] input: &str, #[case] expected: ErrorKind) {
        assert_eq!(*expand_vars(input, lookup).unwrap_err(), expected);
    }

    #[test]
    fn test_storage_root() {
        let storage = StorageConfig { path: Some("${HOME}/pkgs".to_string()) };
        let absolute = Config { storage, ..Default::default() };
        assert_eq!(absolute.storage_root_with(lookup).unwrap(), PathBuf::from("/home/user/pkgs"));

        let relative = Config { storage: StorageConfig { path: Some("${DATA}".to_string()) }, ..Default::default() };
        assert_eq!(relative.storage_root_with(lookup).unwrap(), std::env::current_dir().unwrap().join("data"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_figment(Figment::from(Serialized::defaults(Config::default()))).unwrap();
        assert_eq!(config.ingest.options(), IngestOptions::default());
        assert_eq!(config.search.default_take, 20);
        assert_eq!(config.search.max_take, 1000);
        assert_eq!(config.storage.path, None);
    }

    #[rstest]
    #[case("toml", "[storage]\npath = \"/srv/nupack\"\n[search]\nmax_take = 50\n")]
    #[case("yaml", "storage:\n  path: /srv/nupack\nsearch:\n  max_take: 50\n")]
    #[case("json", r#"{"storage": {"path": "/srv/nupack"}, "search": {"max_take": 50}}"#)]
    fn test_explicit_file(#[case] extension: &str, #[case] contents: &str) {
        let mut file = tempfile::Builder::new().suffix(&format!(".{extension}")).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let figment = file_provider(Figment::from(Serialized::defaults(Config::default())), file.path()).unwrap();
        let config = Config::from_figment(figment).unwrap();
        assert_eq!(config.storage.path.as_deref(), Some("/srv/nupack"));
        assert_eq!(config.search.max_take, 50);
        assert_eq!(config.search.default_take, 20);
    }

    #[test]
    fn test_explicit_file_errors() {
        let missing = Path::new("/definitely/not/here/nupack.toml");
        assert_eq!(*Config::load(Some(missing)).unwrap_err(), ErrorKind::NotFound(missing.to_path_buf()));

        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat(file.path().to_path_buf()));
    }

    #[rstest]
    #[case(r#"{"search": {"default_take": 0}}"#)]
    #[case(r#"{"search": {"default_take": 20, "max_take": 10}}"#)]
    #[case(r#"{"ingest": {"max_package_size": 0}}"#)]
    fn test_invalid(#[case] json: &str) {
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Json::string(json));
        assert!(matches!(*Config::from_figment(figment).unwrap_err(), ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_malformed() {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Json::string(r#"{"search": {"max_take": "lots"}}"#));
        assert_eq!(*Config::from_figment(figment).unwrap_err(), ErrorKind::Parse);
    }

    #[rstest]
    #[case(None, 20)]
    #[case(Some(5), 5)]
    #[case(Some(5000), 1000)]
    fn test_take(#[case] requested: Option<usize>, #[case] expected: usize) {
        assert_eq!(SearchConfig::default().take(requested), expected);
    }
}
