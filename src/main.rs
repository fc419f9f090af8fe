use clap::{ArgAction, Parser, Subcommand};
use derive_more::{Display, Error};
use exn::{OptionExt, ResultExt};
use nupack_config::Config;
use nupack_protocol::{BaseUrl, SearchParams};
use nupack_storage::backend::LocalBackend;
use nupack_store::{Query, Store};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "NUPACK_LOG";

#[derive(Debug, Display, Error)]
enum CliError {
    #[display("cannot load configuration")]
    Config,
    #[display("cannot open package storage")]
    Storage,
    #[display("--base-url is required for this command")]
    MissingBaseUrl,
    #[display("invalid --base-url")]
    BaseUrl,
    #[display("cannot read {}", _0.display())]
    Input(#[error(not(source))] PathBuf),
    #[display("cannot write {}", _0.display())]
    Output(#[error(not(source))] PathBuf),
    #[display("push rejected")]
    Push,
    #[display("{_0} not found")]
    NotFound(#[error(not(source))] String),
    #[display("registry operation failed")]
    Registry,
}

type Result<T> = std::result::Result<T, exn::Exn<CliError>>;

/// Self-hosted NuGet package registry
#[derive(Debug, Parser)]
#[command(name = "nupack", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, env = "NUPACK_CONFIG")]
    config: Option<PathBuf>,
    /// Externally visible root used in protocol links
    #[arg(long, global = true, env = "NUPACK_BASE_URL")]
    base_url: Option<String>,
    /// More logging; repeat for more
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Publish a package archive
    Push { file: PathBuf },
    /// Remove one package version
    Delete { id: String, version: String },
    /// List individual package versions
    List {
        /// Exact package id
        #[arg(long)]
        id: Option<String>,
        /// Substring of id, description or tags
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long)]
        take: Option<usize>,
    },
    /// Search packages, one result per id
    Search {
        query: Option<String>,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long)]
        take: Option<usize>,
        /// Leave out prerelease versions
        #[arg(long)]
        stable: bool,
    },
    /// Versions of a package, as served by the flat container
    Versions { id: String },
    /// Service index document
    ServiceIndex,
    /// Registration index, page (--lower/--upper) or leaf (version)
    Registration {
        id: String,
        version: Option<String>,
        #[arg(long, requires = "upper", conflicts_with = "version")]
        lower: Option<String>,
        #[arg(long, requires = "lower", conflicts_with = "version")]
        upper: Option<String>,
    },
    /// Save a package archive
    Download {
        id: String,
        version: String,
        #[arg(long, short = 'o')]
        output: PathBuf,
    },
    /// Print the manifest embedded in a package
    Manifest { id: String, version: String },
    /// Reload the index from storage and report what was found
    Rebuild,
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).or_raise(|| CliError::Output(PathBuf::from("-")))?;
    println!("{json}");
    Ok(())
}

fn found<T>(value: Option<T>, what: impl FnOnce() -> String) -> Result<T> {
    value.ok_or_raise(|| CliError::NotFound(what()))
}

struct Registry {
    config: Config,
    store: Store,
    base_url: Option<String>,
}

impl Registry {
    async fn open(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref()).or_raise(|| CliError::Config)?;
        let root = config.storage_root().or_raise(|| CliError::Config)?;
        tracing::debug!(root = %root.display(), "Opening package storage");
        let backend = LocalBackend::new("packages", &root).or_raise(|| CliError::Storage)?;
        let store = Store::new(Arc::new(backend));
        store.rebuild().await.or_raise(|| CliError::Storage)?;
        Ok(Self { config, store, base_url: cli.base_url.clone() })
    }

    fn base_url(&self) -> Result<BaseUrl> {
        let raw = self.base_url.as_deref().ok_or_raise(|| CliError::MissingBaseUrl)?;
        BaseUrl::new(raw).or_raise(|| CliError::BaseUrl)
    }

    async fn run(&self, command: Command) -> Result<()> {
        let store = &self.store;
        match command {
            Command::Push { file } => {
                let bytes = tokio::fs::read(&file).await.or_raise(|| CliError::Input(file.clone()))?;
                let name = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                let options = self.config.ingest.options();
                let record = nupack_ingest::ingest(store, futures::io::Cursor::new(bytes), &name, &options)
                    .await
                    .or_raise(|| CliError::Push)?;
                print_json(&serde_json::json!({
                    "id": record.id,
                    "version": record.version,
                    "size": record.size,
                }))
            },
            Command::Delete { id, version } => {
                let deleted = store.delete(&id, &version).await.or_raise(|| CliError::Registry)?;
                let record = found(deleted, || format!("package {id} {version}"))?;
                print_json(&serde_json::json!({ "deleted": { "id": record.id, "version": record.version } }))
            },
            Command::List { id, query, skip, take } => {
                let query = Query::from_filters(id.as_deref(), query.as_deref());
                let take = self.config.search.take(take);
                let list = nupack_protocol::packages(store, &query, skip, take).await;
                print_json(&list.or_raise(|| CliError::Registry)?)
            },
            Command::Search { query, skip, take, stable } => {
                let base = self.base_url()?;
                let take = self.config.search.take(take);
                let params = SearchParams { query, skip, take, include_prerelease: !stable };
                let response = nupack_protocol::search(store, &params, &base).await;
                print_json(&response.or_raise(|| CliError::Registry)?)
            },
            Command::Versions { id } => {
                let versions = nupack_protocol::versions(store, &id).await.or_raise(|| CliError::Registry)?;
                print_json(&found(versions, || format!("package {id}"))?)
            },
            Command::ServiceIndex => print_json(&nupack_protocol::service_index(&self.base_url()?)),
            Command::Registration { id, version, lower, upper } => {
                let base = self.base_url()?;
                match (version, lower, upper) {
                    (Some(version), _, _) => {
                        let leaf = nupack_protocol::registration_leaf(store, &id, &version, &base)
                            .await
                            .or_raise(|| CliError::Registry)?;
                        print_json(&found(leaf, || format!("package {id} {version}"))?)
                    },
                    (None, Some(lower), Some(upper)) => {
                        let page = nupack_protocol::registration_page(store, &id, &lower, &upper, &base)
                            .await
                            .or_raise(|| CliError::Registry)?;
                        print_json(&found(page, || format!("versions of {id} between {lower} and {upper}"))?)
                    },
                    _ => {
                        let index = nupack_protocol::registration_index(store, &id, &base)
                            .await
                            .or_raise(|| CliError::Registry)?;
                        print_json(&found(index, || format!("package {id}"))?)
                    },
                }
            },
            Command::Download { id, version, output } => {
                let bytes = nupack_protocol::content(store, &id, &version).await;
                let bytes = found(bytes.or_raise(|| CliError::Registry)?, || format!("package {id} {version}"))?;
                tokio::fs::write(&output, &bytes).await.or_raise(|| CliError::Output(output.clone()))?;
                print_json(&serde_json::json!({ "path": output, "size": bytes.len() }))
            },
            Command::Manifest { id, version } => {
                let document = nupack_protocol::manifest(store, &id, &version).await;
                let document = found(document.or_raise(|| CliError::Registry)?, || format!("package {id} {version}"))?;
                println!("{}", String::from_utf8_lossy(&document));
                Ok(())
            },
            Command::Rebuild => {
                // Already rebuilt on open; this pass only reports the counts.
                let report = store.rebuild().await.or_raise(|| CliError::Storage)?;
                print_json(&serde_json::json!({ "loaded": report.loaded, "skipped": report.skipped }))
            },
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let registry = Registry::open(&cli).await?;
    registry.run(cli.command).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:?}");
            ExitCode::FAILURE
        },
    }
}
