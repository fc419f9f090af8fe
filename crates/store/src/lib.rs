//! Package metadata store.
//!
//! The durable state of a registry is exactly the set of archives in its
//! storage backend. This crate keeps the in-memory index over those archives:
//! it registers new packages blob-first, hides and evicts entries whose blob
//! disappears, and rebuilds the whole index from storage on demand.
//!
//! ```no_run
//! use std::sync::Arc;
//! use nupack_storage::backend::LocalBackend;
//! use nupack_store::{Query, Store};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = LocalBackend::new("packages", "/srv/packages").map_err(|e| format!("{e:?}"))?;
//! let store = Store::new(Arc::new(backend));
//! store.rebuild().await.map_err(|e| format!("{e:?}"))?;
//! for record in store.list(&Query::text("json"), 0, 20).await.map_err(|e| format!("{e:?}"))? {
//!     println!("{} {}", record.id, record.version);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
mod locks;
mod query;
mod record;
mod store;

pub use crate::query::Query;
pub use crate::record::{Key, PackageRecord};
pub use crate::store::{RebuildReport, Store};
pub use nupack_manifest::{Dependency, DependencyGroup};
