//! Catalog handling for the extmirror mirror.
//!
//! This crate owns the catalog data model ([`CatalogRecord`]), the persisted
//! [`CatalogSnapshot`] with its id and hash indexes, and [`CatalogSync`], the
//! paginated download of the remote catalog.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use extmirror_config::config::Config;
//! use extmirror_dl::{http_client::ClientConfig, pool::Interrupt};
//! use extmirror_registry::{CatalogQuery, CatalogSnapshot, CatalogSync, HttpCatalogSource};
//!
//! async fn refresh(config: &Config) -> extmirror_registry::Result<()> {
//!     let source = HttpCatalogSource::new(ClientConfig::default().build());
//!     let sync = CatalogSync::from_config(config, Arc::new(source), Interrupt::new())?;
//!     let records = sync.fetch(&CatalogQuery::new(config.page_size())).await?;
//!
//!     let snapshot = CatalogSnapshot::new(records).webext_only();
//!     snapshot.save(config.snapshot_path()?)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod record;
pub mod snapshot;
pub mod sync;

pub use error::{ErrorContext, RegistryError, Result};
pub use record::{CatalogRecord, FileEntry, LocalizedName, Permissions};
pub use snapshot::CatalogSnapshot;
pub use sync::{CatalogQuery, CatalogSource, CatalogSync, HttpCatalogSource, SearchPage};
