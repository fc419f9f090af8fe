//! Durable blob storage.
//!
//! Package archives are the only durable state of a registry: every index is
//! rebuilt from whatever this layer lists at startup. Backends must therefore
//! never expose a partially written blob, see [`StorageBackend::write`].

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
