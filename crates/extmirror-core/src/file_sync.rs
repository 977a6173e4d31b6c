//! Bulk download of package files into the [`ContentStore`].
//!
//! Only files whose hash is not stored yet are requested, so a re-run against
//! an unchanged catalog issues no requests at all.

use std::{
    collections::{HashMap, HashSet},
    io::Read,
    sync::Arc,
};

use extmirror_config::config::Config;
use extmirror_dl::{
    http::fetch_reader,
    http_client::HttpClient,
    pool::{Attempt, Interrupt, RetryPool},
};
use extmirror_registry::CatalogRecord;
use extmirror_utils::hash::is_sha256_hex;
use tracing::{debug, info, warn};

use crate::{constants::FILE_PROGRESS_EVERY, store::ContentStore, MirrorResult};

/// Where package files come from.
pub trait PackageSource: Send + Sync + 'static {
    fn open(&self, url: &str) -> Attempt<Box<dyn Read + Send>>;
}

/// Package files streamed over HTTP.
pub struct HttpPackageSource {
    client: HttpClient,
}

impl HttpPackageSource {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl PackageSource for HttpPackageSource {
    fn open(&self, url: &str) -> Attempt<Box<dyn Read + Send>> {
        fetch_reader(&self.client, url).into()
    }
}

/// Files to download, keyed by URL, plus what was left out.
#[derive(Debug, Default)]
pub struct DownloadPlan {
    pub downloads: Vec<(String, String)>,
    pub already_present: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct FileSyncReport {
    pub requested: usize,
    pub stored: usize,
    pub already_present: usize,
    pub skipped: usize,
    /// URLs that could not be fetched.
    pub missing: Vec<String>,
    pub interrupted: bool,
}

pub struct FileSync {
    source: Arc<dyn PackageSource>,
    store: Arc<ContentStore>,
    pool: RetryPool,
}

impl FileSync {
    pub fn new(source: Arc<dyn PackageSource>, store: Arc<ContentStore>, pool: RetryPool) -> Self {
        Self {
            source,
            store,
            pool,
        }
    }

    pub fn from_config(
        config: &Config,
        source: Arc<dyn PackageSource>,
        store: Arc<ContentStore>,
        interrupt: Interrupt,
    ) -> MirrorResult<Self> {
        let pool = RetryPool::new(
            config.concurrency(),
            config.max_rounds(),
            config.retry_delay()?,
        )
        .with_interrupt(interrupt);
        Ok(Self::new(source, store, pool))
    }

    /// Collects the web extension files that still need downloading.
    ///
    /// Files are deduplicated by hash. Entries without a usable SHA-256
    /// digest or URL are skipped.
    pub fn plan<'a, I>(&self, records: I) -> DownloadPlan
    where
        I: IntoIterator<Item = &'a CatalogRecord>,
    {
        let mut plan = DownloadPlan::default();
        let mut seen_hashes = HashSet::new();
        let mut url_hashes: HashMap<String, String> = HashMap::new();

        for record in records {
            for file in record.webext_files() {
                let Some(hash) = file
                    .content_hash()
                    .filter(|h| h.is_sha256() && is_sha256_hex(h.hex()))
                else {
                    warn!(id = record.id, "skipping file with unsupported hash {:?}", file.hash);
                    plan.skipped += 1;
                    continue;
                };
                if file.url.is_empty() {
                    warn!(id = record.id, hash = hash.hex(), "skipping file without URL");
                    plan.skipped += 1;
                    continue;
                }

                if let Some(other) = url_hashes.get(&file.url) {
                    warn!(id = record.id, "URL listed twice in catalog: {}", file.url);
                    if other != hash.hex() {
                        plan.skipped += 1;
                        continue;
                    }
                } else {
                    url_hashes.insert(file.url.clone(), hash.hex().to_string());
                }

                if !seen_hashes.insert(hash.hex().to_string()) {
                    continue;
                }
                if self.store.contains(hash.hex()) {
                    plan.already_present += 1;
                } else {
                    plan.downloads
                        .push((file.url.clone(), hash.hex().to_string()));
                }
            }
        }

        plan
    }

    /// Downloads every missing web extension file of `records`.
    ///
    /// Files that stay unavailable are reported, not treated as an error.
    pub async fn sync<'a, I>(&self, records: I) -> FileSyncReport
    where
        I: IntoIterator<Item = &'a CatalogRecord>,
    {
        let plan = self.plan(records);
        self.run(plan).await
    }

    pub async fn run(&self, plan: DownloadPlan) -> FileSyncReport {
        let mut report = FileSyncReport {
            requested: plan.downloads.len(),
            already_present: plan.already_present,
            skipped: plan.skipped,
            ..Default::default()
        };
        info!("Fetching {} uncached web extensions", report.requested);
        if plan.downloads.is_empty() {
            return report;
        }

        let urls = plan.downloads.iter().map(|(url, _)| url.clone()).collect();
        let targets: HashMap<String, String> = plan.downloads.into_iter().collect();
        let source = Arc::clone(&self.source);
        let store = Arc::clone(&self.store);

        let result = self
            .pool
            .clone()
            .with_progress("package files", FILE_PROGRESS_EVERY)
            .run(urls, move |url| {
                let Some(hash) = targets.get(url) else {
                    return Attempt::Fatal(format!("no hash planned for {url}"));
                };
                match source.open(url) {
                    Attempt::Done(reader) => {
                        match store.put_at(hash, reader) {
                            Ok(path) => Attempt::Done(path),
                            Err(err) if err.is_retriable() => Attempt::Retry(err.to_string()),
                            Err(err) => {
                                warn!(url, "Unable to store {hash}: {err}");
                                Attempt::Fatal(err.to_string())
                            }
                        }
                    }
                    Attempt::Fatal(reason) => Attempt::Fatal(reason),
                    Attempt::Retry(reason) => Attempt::Retry(reason),
                }
            })
            .await;

        report.stored = result.completed.len();
        report.interrupted = result.interrupted;
        report.missing = result.missing().map(str::to_string).collect();

        if !report.missing.is_empty() {
            warn!(
                "Unable to fetch {} extensions, likely deleted add-ons",
                report.missing.len()
            );
            for url in &report.missing {
                debug!("missing {url}");
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        io::Cursor,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    use extmirror_utils::hash::sha256_reader;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn sha(body: &[u8]) -> String {
        sha256_reader(body).unwrap()
    }

    fn record(id: u64, files: &[(&str, &[u8], bool)]) -> CatalogRecord {
        let files: Vec<_> = files
            .iter()
            .map(|(url, body, webext)| {
                json!({
                    "hash": format!("sha256:{}", sha(body)),
                    "url": url,
                    "is_webextension": webext,
                })
            })
            .collect();
        serde_json::from_value(json!({
            "id": id,
            "name": { "en-US": format!("Addon {id}") },
            "current_version": { "files": files }
        }))
        .unwrap()
    }

    #[derive(Default)]
    struct FakePackages {
        bodies: HashMap<String, Vec<u8>>,
        gone: HashSet<String>,
        flaky: Mutex<HashMap<String, usize>>,
        requests: AtomicUsize,
    }

    impl FakePackages {
        fn serve(mut self, url: &str, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), body.to_vec());
            self
        }
    }

    impl PackageSource for FakePackages {
        fn open(&self, url: &str) -> Attempt<Box<dyn Read + Send>> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.gone.contains(url) {
                return Attempt::Fatal("HTTP 404".into());
            }
            if let Some(left) = self.flaky.lock().unwrap().get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    return Attempt::Retry("HTTP 502".into());
                }
            }
            match self.bodies.get(url) {
                Some(body) => Attempt::Done(Box::new(Cursor::new(body.clone()))),
                None => Attempt::Fatal("HTTP 404".into()),
            }
        }
    }

    fn file_sync(source: Arc<FakePackages>, store: Arc<ContentStore>) -> FileSync {
        FileSync::new(source, store, RetryPool::new(4, 8, Duration::ZERO))
    }

    fn open_store(dir: &std::path::Path) -> Arc<ContentStore> {
        Arc::new(ContentStore::open(dir.join("webext_data"), 4, 1).unwrap())
    }

    #[tokio::test]
    async fn test_sync_stores_webextensions_only() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let records = vec![
            record(10, &[("http://pkg/a", b"alpha", true)]),
            record(
                20,
                &[
                    ("http://pkg/b", b"bravo", true),
                    ("http://pkg/d", b"delta", false),
                ],
            ),
        ];
        let source = Arc::new(
            FakePackages::default()
                .serve("http://pkg/a", b"alpha")
                .serve("http://pkg/b", b"bravo")
                .serve("http://pkg/d", b"delta"),
        );

        let report = file_sync(source.clone(), store.clone())
            .sync(&records)
            .await;

        assert_eq!(report.requested, 2);
        assert_eq!(report.stored, 2);
        assert!(report.missing.is_empty());
        assert!(store.contains(&sha(b"alpha")));
        assert!(store.contains(&sha(b"bravo")));
        assert!(!store.contains(&sha(b"delta")));
        assert_eq!(source.requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rerun_issues_no_requests() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let records = vec![record(10, &[("http://pkg/a", b"alpha", true)])];
        let source = Arc::new(FakePackages::default().serve("http://pkg/a", b"alpha"));

        file_sync(source.clone(), store.clone()).sync(&records).await;
        assert_eq!(source.requests.load(Ordering::SeqCst), 1);

        let report = file_sync(source.clone(), store).sync(&records).await;
        assert_eq!(report.requested, 0);
        assert_eq!(report.already_present, 1);
        assert_eq!(source.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_same_hash_fetched_once() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let records = vec![
            record(10, &[("http://pkg/a", b"same", true)]),
            record(11, &[("http://mirror/a", b"same", true)]),
        ];
        let source = Arc::new(
            FakePackages::default()
                .serve("http://pkg/a", b"same")
                .serve("http://mirror/a", b"same"),
        );

        let report = file_sync(source.clone(), store).sync(&records).await;

        assert_eq!(report.requested, 1);
        assert_eq!(source.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_files_are_reported() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let records = vec![
            record(10, &[("http://pkg/a", b"alpha", true)]),
            record(20, &[("http://pkg/gone", b"ghost", true)]),
        ];
        let mut source = FakePackages::default().serve("http://pkg/a", b"alpha");
        source.gone.insert("http://pkg/gone".into());

        let report = file_sync(Arc::new(source), store.clone())
            .sync(&records)
            .await;

        assert_eq!(report.stored, 1);
        assert_eq!(report.missing, vec!["http://pkg/gone".to_string()]);
        assert!(!store.contains(&sha(b"ghost")));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let records = vec![record(10, &[("http://pkg/a", b"alpha", true)])];
        let source = FakePackages::default().serve("http://pkg/a", b"alpha");
        source.flaky.lock().unwrap().insert("http://pkg/a".into(), 2);
        let source = Arc::new(source);

        let report = file_sync(source.clone(), store.clone())
            .sync(&records)
            .await;

        assert_eq!(report.stored, 1);
        assert_eq!(source.requests.load(Ordering::SeqCst), 3);
        assert!(store.verify(&sha(b"alpha")).unwrap());
    }

    #[tokio::test]
    async fn test_content_not_matching_catalog_is_dropped() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let records = vec![record(10, &[("http://pkg/a", b"expected", true)])];
        let source = Arc::new(FakePackages::default().serve("http://pkg/a", b"tampered"));

        let report = file_sync(source.clone(), store.clone())
            .sync(&records)
            .await;

        assert_eq!(report.stored, 0);
        assert_eq!(report.missing.len(), 1);
        assert!(store.is_empty());
        // a mismatch is not retried
        assert_eq!(source.requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_plan_skips_unsupported_hashes() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let record: CatalogRecord = serde_json::from_value(json!({
            "id": 1,
            "current_version": { "files": [
                { "hash": "md5:abcdef", "url": "http://pkg/md5", "is_webextension": true },
                { "hash": "garbage", "url": "http://pkg/bad", "is_webextension": true },
                { "hash": format!("sha256:{}", "a".repeat(64)), "url": "", "is_webextension": true },
                { "hash": format!("sha256:{}", "b".repeat(64)), "url": "http://pkg/b", "is_webextension": true },
                { "hash": format!("sha256:{}", "c".repeat(64)), "url": "http://pkg/b", "is_webextension": true }
            ]}
        }))
        .unwrap();

        let sync = file_sync(Arc::new(FakePackages::default()), store);
        let plan = sync.plan([&record]);

        assert_eq!(
            plan.downloads,
            vec![("http://pkg/b".to_string(), "b".repeat(64))]
        );
        assert_eq!(plan.skipped, 4);
    }

    #[test]
    fn test_http_package_source_into_store() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/files/alpha.xpi");
            then.status(200).body("alpha");
        });
        server.mock(|when, then| {
            when.method(GET).path("/files/gone.xpi");
            then.status(404);
        });

        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let source = HttpPackageSource::new(HttpClient::default());

        match source.open(&server.url("/files/alpha.xpi")) {
            Attempt::Done(reader) => {
                store.put_at(&sha(b"alpha"), reader).unwrap();
            }
            Attempt::Fatal(reason) | Attempt::Retry(reason) => panic!("unexpected {reason}"),
        }
        assert!(store.verify(&sha(b"alpha")).unwrap());
        assert!(matches!(
            source.open(&server.url("/files/gone.xpi")),
            Attempt::Fatal(_)
        ));
    }
}
