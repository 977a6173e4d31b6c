//! The mirror as a whole: configuration, catalog snapshot and package store.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use extmirror_config::config::Config;
use extmirror_dl::{http_client::HttpClient, pool::Interrupt};
use extmirror_registry::{
    CatalogQuery, CatalogRecord, CatalogSnapshot, CatalogSource, CatalogSync, HttpCatalogSource,
    RegistryError,
};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::{
    error::MirrorError,
    file_sync::{FileSync, FileSyncReport, HttpPackageSource, PackageSource},
    selector::{Selection, SelectorResolver},
    store::ContentStore,
    MirrorResult,
};

/// Limits of a sync run.
#[derive(Clone, Debug, Default)]
pub struct SyncOptions {
    /// Keep the stored catalog instead of downloading a new one.
    pub no_meta: bool,
    pub max_pages: Option<u64>,
    pub max_records: Option<usize>,
    pub min_users: Option<u64>,
    pub max_users: Option<u64>,
}

#[derive(Debug)]
pub struct SyncReport {
    /// Web extensions in the catalog the files were synced against.
    pub records: usize,
    pub files: FileSyncReport,
    /// Set when the catalog could not be refreshed in full and the previous
    /// snapshot was used instead.
    pub catalog_error: Option<RegistryError>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.catalog_error.is_none() && self.files.missing.is_empty()
    }
}

/// Counts shown by `info`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MirrorInfo {
    pub ids: usize,
    pub referenced: usize,
    pub files: usize,
    pub orphans: usize,
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub checked: usize,
    pub corrupt: Vec<String>,
    pub missing: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.corrupt.is_empty() && self.missing.is_empty()
    }
}

pub struct MirrorContext {
    config: Config,
    snapshot: CatalogSnapshot,
    snapshot_path: PathBuf,
    store: Arc<ContentStore>,
    interrupt: Interrupt,
    catalog_source: Arc<dyn CatalogSource>,
    package_source: Arc<dyn PackageSource>,
}

impl MirrorContext {
    /// Opens the mirror described by `config`, talking to the network through
    /// `client`.
    pub fn open(config: Config, client: HttpClient, interrupt: Interrupt) -> MirrorResult<Self> {
        let catalog_source = Arc::new(HttpCatalogSource::new(client.clone()));
        let package_source = Arc::new(HttpPackageSource::new(client));
        Self::with_sources(config, catalog_source, package_source, interrupt)
    }

    pub fn with_sources(
        config: Config,
        catalog_source: Arc<dyn CatalogSource>,
        package_source: Arc<dyn PackageSource>,
        interrupt: Interrupt,
    ) -> MirrorResult<Self> {
        let snapshot_path = config.snapshot_path()?;
        let store = ContentStore::open(
            config.store_path()?,
            config.store_depth(),
            config.store_width(),
        )?;
        let snapshot = CatalogSnapshot::load(&snapshot_path)?;
        debug!(
            records = snapshot.len(),
            "opened mirror in {}",
            config.workdir()?.display()
        );

        Ok(Self {
            config,
            snapshot,
            snapshot_path,
            store: Arc::new(store),
            interrupt,
            catalog_source,
            package_source,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn snapshot(&self) -> &CatalogSnapshot {
        &self.snapshot
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Refreshes the catalog, unless `no_meta` is set, then downloads every
    /// package file not stored yet.
    ///
    /// If some catalog pages could not be fetched the previous snapshot is
    /// kept and files are still synced against it. The catalog error is then
    /// carried in [`SyncReport::catalog_error`].
    pub async fn sync(&mut self, options: &SyncOptions) -> MirrorResult<SyncReport> {
        let mut catalog_error = None;

        if options.no_meta {
            warn!("Using cached AMO metadata, not updating");
        } else {
            match self.fetch_catalog(options).await {
                Ok(records) => {
                    self.snapshot = CatalogSnapshot::new(records).webext_only();
                    self.snapshot.save(&self.snapshot_path)?;
                }
                Err(RegistryError::Interrupted) => return Err(MirrorError::Interrupted),
                Err(err @ RegistryError::IncompleteCatalog { .. }) => {
                    error!("{err}, keeping the previous catalog");
                    catalog_error = Some(err);
                }
                Err(err) => return Err(err.into()),
            }
        }
        info!("Metadata set contains {} web extensions", self.snapshot.len());

        let file_sync = FileSync::from_config(
            &self.config,
            Arc::clone(&self.package_source),
            Arc::clone(&self.store),
            self.interrupt.clone(),
        )?;
        let files = file_sync.sync(self.snapshot.iter()).await;
        if files.interrupted {
            return Err(MirrorError::Interrupted);
        }

        Ok(SyncReport {
            records: self.snapshot.len(),
            files,
            catalog_error,
        })
    }

    async fn fetch_catalog(&self, options: &SyncOptions) -> Result<Vec<CatalogRecord>, RegistryError> {
        let sync = CatalogSync::from_config(
            &self.config,
            Arc::clone(&self.catalog_source),
            self.interrupt.clone(),
        )?;
        let query = CatalogQuery {
            max_pages: options.max_pages,
            max_records: options.max_records,
            min_users: options.min_users,
            max_users: options.max_users,
            ..CatalogQuery::new(self.config.page_size())
        };
        sync.fetch(&query).await
    }

    pub fn select<S: AsRef<str>>(&self, selectors: &[S]) -> Selection {
        SelectorResolver::new(&self.snapshot, &self.store).resolve(selectors)
    }

    /// Catalog records of the selection; orphans have none.
    pub fn get_meta<S: AsRef<str>>(
        &self,
        selectors: &[S],
    ) -> BTreeMap<Option<u64>, Option<&CatalogRecord>> {
        self.select(selectors)
            .into_keys()
            .map(|id| (id, id.and_then(|id| self.snapshot.get_by_id(id))))
            .collect()
    }

    /// Stored paths of the selection. Hashes missing from the store are
    /// logged and left out.
    pub fn get_files<S: AsRef<str>>(
        &self,
        selectors: &[S],
    ) -> BTreeMap<Option<u64>, BTreeMap<String, PathBuf>> {
        let mut files = BTreeMap::new();
        for (id, hashes) in self.select(selectors) {
            let mut paths = BTreeMap::new();
            for hash in hashes {
                match self.store.get(&hash) {
                    Some(path) => {
                        paths.insert(hash, path);
                    }
                    None => warn!(id, "Cache miss for {hash}"),
                }
            }
            if !paths.is_empty() {
                files.insert(id, paths);
            }
        }
        files
    }

    pub fn info(&self) -> MirrorInfo {
        let stored = self.store.hashes();
        let referenced = stored
            .iter()
            .filter(|hash| self.snapshot.is_known_hash(hash))
            .count();

        MirrorInfo {
            ids: self.snapshot.len(),
            referenced,
            files: stored.len(),
            orphans: stored.len() - referenced,
        }
    }

    /// Re-digests every stored file of the selection.
    pub fn verify<S: AsRef<str>>(&self, selectors: &[S]) -> VerifyReport {
        let hashes: Vec<String> = self.select(selectors).into_values().flatten().collect();
        let checks: Vec<(String, Option<bool>)> = hashes
            .into_par_iter()
            .map(|hash| {
                if !self.store.contains(&hash) {
                    return (hash, None);
                }
                let ok = match self.store.verify(&hash) {
                    Ok(ok) => ok,
                    Err(err) => {
                        warn!("Unable to verify {hash}: {err}");
                        false
                    }
                };
                (hash, Some(ok))
            })
            .collect();

        let mut report = VerifyReport::default();
        for (hash, outcome) in checks {
            match outcome {
                Some(true) => report.checked += 1,
                Some(false) => {
                    report.checked += 1;
                    error!("{hash} does not match its content");
                    report.corrupt.push(hash);
                }
                None => report.missing.push(hash),
            }
        }
        report
    }
}
