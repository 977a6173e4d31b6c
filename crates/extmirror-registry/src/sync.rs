//! Paginated download of the remote catalog.
//!
//! The first page is fetched on its own to learn the result count and the
//! page size the server enforces. The remaining pages go through the shared
//! [`RetryPool`]. When the listing is larger than the server's result window
//! and nothing else narrows it, the query is split once by popularity and the
//! two halves are merged.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use extmirror_config::config::Config;
use extmirror_dl::{
    http::fetch_json,
    http_client::HttpClient,
    pool::{Attempt, Interrupt, RetryPool},
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{RegistryError, Result},
    record::CatalogRecord,
};

const PROGRESS_EVERY: usize = 25;

/// One page of search results.
#[derive(Debug, Default, Deserialize)]
pub struct SearchPage {
    pub count: u64,
    pub page_size: u64,
    /// Pages the server is willing to serve for this query.
    #[serde(default)]
    pub page_count: Option<u64>,
    #[serde(default, deserialize_with = "lenient_records")]
    pub results: Vec<CatalogRecord>,
}

/// Decodes results one by one, skipping entries that do not decode.
fn lenient_records<'de, D>(deserializer: D) -> std::result::Result<Vec<CatalogRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();

    Ok(values
        .into_iter()
        .filter_map(|value| {
            let id = value.get("id").cloned().unwrap_or(Value::Null);
            serde_json::from_value::<CatalogRecord>(value)
                .map_err(|err| warn!(%id, "Skipping malformed catalog record: {err}"))
                .ok()
        })
        .collect())
}

impl SearchPage {
    /// Pages needed for the full result count at the enforced page size.
    pub fn total_pages(&self) -> u64 {
        self.count.div_ceil(self.page_size.max(1))
    }

    /// True when the server caps the listing below `wanted` pages.
    fn exceeds_window(&self, wanted: u64) -> bool {
        self.page_count.is_some_and(|served| served < wanted)
    }
}

/// Where catalog pages come from.
pub trait CatalogSource: Send + Sync + 'static {
    fn page(&self, url: &str) -> Attempt<SearchPage>;
}

/// Catalog pages fetched over HTTP.
pub struct HttpCatalogSource {
    client: HttpClient,
}

impl HttpCatalogSource {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl CatalogSource for HttpCatalogSource {
    fn page(&self, url: &str) -> Attempt<SearchPage> {
        fetch_json(&self.client, url).into()
    }
}

/// Limits and filters of a catalog download.
#[derive(Clone, Debug, Default)]
pub struct CatalogQuery {
    pub max_pages: Option<u64>,
    pub max_records: Option<usize>,
    pub page_size: u32,
    pub min_users: Option<u64>,
    pub max_users: Option<u64>,
}

impl CatalogQuery {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    fn is_unbounded(&self) -> bool {
        self.max_pages.is_none()
            && self.max_records.is_none()
            && self.min_users.is_none()
            && self.max_users.is_none()
    }

    fn page_limit(&self, total_pages: u64) -> u64 {
        self.max_pages.map_or(total_pages, |max| max.min(total_pages))
    }
}

/// Result of merging the two popularity partitions.
#[derive(Debug)]
pub struct PartitionMerge {
    pub records: Vec<CatalogRecord>,
    pub duplicates: usize,
    pub reported_total: u64,
}

impl PartitionMerge {
    pub fn merge(reported_total: u64, partitions: Vec<Vec<CatalogRecord>>) -> Self {
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut duplicates = 0;

        for record in partitions.into_iter().flatten() {
            if seen.insert(record.id) {
                records.push(record);
            } else {
                warn!(id = record.id, "record listed in both partitions, keeping one");
                duplicates += 1;
            }
        }

        let merge = Self {
            records,
            duplicates,
            reported_total,
        };
        if merge.diverges() {
            warn!(
                "catalog reported {} records but the partitions yielded {}",
                merge.reported_total,
                merge.records.len()
            );
        }
        merge
    }

    /// The merged count differs from the count first reported.
    pub fn diverges(&self) -> bool {
        self.records.len() as u64 != self.reported_total
    }
}

pub struct CatalogSync {
    source: Arc<dyn CatalogSource>,
    api_url: Url,
    sort: String,
    item_type: String,
    partition_threshold: u64,
    pool: RetryPool,
}

impl CatalogSync {
    pub fn new(source: Arc<dyn CatalogSource>, api_url: Url, pool: RetryPool) -> Self {
        Self {
            source,
            api_url,
            sort: extmirror_config::config::DEFAULT_SORT.to_string(),
            item_type: extmirror_config::config::DEFAULT_ITEM_TYPE.to_string(),
            partition_threshold: extmirror_config::config::DEFAULT_PARTITION_THRESHOLD,
            pool,
        }
    }

    pub fn from_config(
        config: &Config,
        source: Arc<dyn CatalogSource>,
        interrupt: Interrupt,
    ) -> Result<Self> {
        let api_url = Url::parse(config.api_url())
            .map_err(|_| RegistryError::InvalidUrl(config.api_url().to_string()))?;
        let pool = RetryPool::new(
            config.concurrency(),
            config.max_rounds(),
            config.retry_delay()?,
        )
        .with_interrupt(interrupt);

        Ok(Self {
            sort: config.sort().to_string(),
            item_type: config.item_type().to_string(),
            partition_threshold: config.partition_threshold(),
            ..Self::new(source, api_url, pool)
        })
    }

    pub fn with_partition_threshold(mut self, threshold: u64) -> Self {
        self.partition_threshold = threshold;
        self
    }

    /// Downloads the catalog.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::FailedToFetchRemote`] if the first page cannot be
    ///   fetched
    /// * [`RegistryError::IncompleteCatalog`] if some pages stayed
    ///   unavailable
    /// * [`RegistryError::Interrupted`] if the interrupt flag was raised
    pub async fn fetch(&self, query: &CatalogQuery) -> Result<Vec<CatalogRecord>> {
        let first = self
            .first_page(query, query.min_users, query.max_users)
            .await?;
        let num_pages = query.page_limit(first.total_pages());

        let mut records = if first.exceeds_window(num_pages) && query.is_unbounded() {
            info!(
                count = first.count,
                "catalog exceeds the result window, splitting at {} users",
                self.partition_threshold
            );
            self.fetch_partitioned(query, first.count).await?.records
        } else {
            self.fetch_pages(query, query.min_users, query.max_users, first, num_pages)
                .await?
        };

        if let Some(max) = query.max_records {
            records.truncate(max);
        }
        Ok(records)
    }

    async fn fetch_partitioned(
        &self,
        query: &CatalogQuery,
        reported_total: u64,
    ) -> Result<PartitionMerge> {
        let k = self.partition_threshold;
        let mut partitions = Vec::with_capacity(2);

        for (min, max) in [(Some(k), None), (None, Some(k))] {
            let first = self.first_page(query, min, max).await?;
            let mut num_pages = query.page_limit(first.total_pages());
            if let Some(served) = first.page_count.filter(|&served| served < num_pages) {
                warn!(
                    "partition still exceeds the result window, only {} of {} pages available",
                    served, num_pages
                );
                num_pages = served;
            }
            partitions.push(self.fetch_pages(query, min, max, first, num_pages).await?);
        }

        Ok(PartitionMerge::merge(reported_total, partitions))
    }

    async fn first_page(
        &self,
        query: &CatalogQuery,
        min_users: Option<u64>,
        max_users: Option<u64>,
    ) -> Result<SearchPage> {
        let url = self.page_url(query.page_size, min_users, max_users, 1);
        debug!("fetching first catalog page {url}");

        let source = Arc::clone(&self.source);
        let report = self.pool.run(vec![url.clone()], move |u| source.page(u)).await;
        if report.interrupted {
            return Err(RegistryError::Interrupted);
        }

        report
            .completed
            .into_iter()
            .next()
            .map(|(_, page)| page)
            .ok_or(RegistryError::FailedToFetchRemote(url))
    }

    async fn fetch_pages(
        &self,
        query: &CatalogQuery,
        min_users: Option<u64>,
        max_users: Option<u64>,
        first: SearchPage,
        num_pages: u64,
    ) -> Result<Vec<CatalogRecord>> {
        if num_pages == 0 {
            return Ok(Vec::new());
        }
        info!("Fetching {num_pages} pages of catalog metadata");

        let mut records = first.results;
        if num_pages == 1 {
            return Ok(records);
        }

        let urls: Vec<String> = (2..=num_pages)
            .map(|n| self.page_url(query.page_size, min_users, max_users, n))
            .collect();
        let order: HashMap<String, usize> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| (url.clone(), i))
            .collect();

        let source = Arc::clone(&self.source);
        let report = self
            .pool
            .clone()
            .with_progress("catalog pages", PROGRESS_EVERY)
            .run(urls, move |url| source.page(url))
            .await;

        if report.interrupted {
            return Err(RegistryError::Interrupted);
        }
        if !report.is_complete() {
            for url in report.missing() {
                warn!("Unable to download catalog page {url}");
            }
            return Err(RegistryError::IncompleteCatalog {
                missing: report.missing_count(),
            });
        }

        let mut pages = report.completed;
        pages.sort_by_key(|(url, _)| order.get(url).copied().unwrap_or(usize::MAX));
        for (_, page) in pages {
            records.extend(page.results);
        }

        Ok(records)
    }

    fn page_url(
        &self,
        page_size: u32,
        min_users: Option<u64>,
        max_users: Option<u64>,
        page: u64,
    ) -> String {
        let mut url = self.api_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("sort", &self.sort)
                .append_pair("type", &self.item_type)
                .append_pair("page_size", &page_size.to_string());
            if let Some(min) = min_users {
                pairs.append_pair("users__gte", &min.to_string());
            }
            if let Some(max) = max_users {
                pairs.append_pair("users__lt", &max.to_string());
            }
            pairs.append_pair("page", &page.to_string());
        }
        url.into()
    }
}
