//! NuGet V3 protocol views over the package store.
//!
//! Every function here is a stateless read of the [`Store`](nupack_store::Store)'s
//! current contents. Documents that embed links take a caller-supplied
//! [`BaseUrl`]; absent packages come back as `None` for the caller to turn
//! into a not-found response.
//!
//! ```no_run
//! use nupack_protocol::{BaseUrl, SearchParams, search, service_index};
//! # async fn example(store: &nupack_store::Store) -> Result<(), Box<dyn std::error::Error>> {
//! let base = BaseUrl::new("https://pkgs.example.com").map_err(|e| format!("{e:?}"))?;
//! let index = service_index(&base);
//! let params = SearchParams { query: Some("json".to_string()), ..Default::default() };
//! let results = search(store, &params, &base).await.map_err(|e| format!("{e:?}"))?;
//! println!("{} resources, {} hits", index.resources.len(), results.total_hits);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod models;
mod packages;
mod registration;
mod search;
mod service;
mod url;

pub use crate::packages::{content, manifest, package_exists, package_ids, packages, versions};
pub use crate::registration::{OPEN_RANGE, leaf, registration_index, registration_leaf, registration_page};
pub use crate::search::{DEFAULT_TAKE, SearchParams, search};
pub use crate::service::service_index;
pub use crate::url::{BaseUrl, FLAT_CONTAINER_ROOT, REGISTRATIONS_ROOT, SEARCH_ROOT};
