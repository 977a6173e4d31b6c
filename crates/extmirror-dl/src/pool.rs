//! Bounded concurrent retry loop shared by the catalog and package
//! downloaders.
//!
//! Every round issues all pending URLs through a pool of at most
//! `concurrency` in-flight requests. Workers only report an [`Attempt`]; the
//! pending list is owned by the coordinating task and updated between rounds.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Outcome of a single request.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The request succeeded; the URL leaves the pending list.
    Done(T),
    /// The request failed permanently (client error); it is not retried.
    Fatal(String),
    /// The request failed transiently; it stays pending for the next round.
    Retry(String),
}

impl<T> Attempt<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Attempt<U> {
        match self {
            Attempt::Done(value) => Attempt::Done(f(value)),
            Attempt::Fatal(reason) => Attempt::Fatal(reason),
            Attempt::Retry(reason) => Attempt::Retry(reason),
        }
    }
}

/// Shared cancellation flag, set from the Ctrl-C handler.
#[derive(Clone, Debug, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct PoolReport<T> {
    /// Successful requests, keyed by the URL originally requested.
    pub completed: Vec<(String, T)>,
    /// URLs that failed with a permanent error.
    pub fatal: Vec<String>,
    /// URLs still failing transiently when the loop stopped.
    pub unfinished: Vec<String>,
    pub rounds: u32,
    pub interrupted: bool,
}

impl<T> PoolReport<T> {
    /// True when every requested URL completed.
    pub fn is_complete(&self) -> bool {
        self.fatal.is_empty() && self.unfinished.is_empty() && !self.interrupted
    }

    /// URLs that did not complete, fatal first.
    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.fatal
            .iter()
            .chain(self.unfinished.iter())
            .map(String::as_str)
    }

    pub fn missing_count(&self) -> usize {
        self.fatal.len() + self.unfinished.len()
    }
}

#[derive(Clone, Debug)]
pub struct RetryPool {
    concurrency: usize,
    max_rounds: u32,
    retry_delay: Duration,
    interrupt: Interrupt,
    progress: Option<(&'static str, usize)>,
}

impl RetryPool {
    pub fn new(concurrency: usize, max_rounds: u32, retry_delay: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            max_rounds: max_rounds.max(1),
            retry_delay,
            interrupt: Interrupt::new(),
            progress: None,
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Logs the number of remaining items every `every` completions.
    pub fn with_progress(mut self, label: &'static str, every: usize) -> Self {
        self.progress = (every > 0).then_some((label, every));
        self
    }

    /// Runs `fetch` for every URL until each one completed, failed fatally, or
    /// the round limit is reached.
    ///
    /// `fetch` runs on the blocking thread pool. Duplicate URLs are collapsed.
    pub async fn run<T, F>(&self, urls: Vec<String>, fetch: F) -> PoolReport<T>
    where
        T: Send + 'static,
        F: Fn(&str) -> Attempt<T> + Send + Sync + 'static,
    {
        let fetch = Arc::new(fetch);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let mut pending = dedup_urls(urls);
        let total = pending.len();
        let mut report = PoolReport {
            completed: Vec::with_capacity(total),
            fatal: Vec::new(),
            unfinished: Vec::new(),
            rounds: 0,
            interrupted: false,
        };

        while !pending.is_empty() {
            if self.interrupt.is_triggered() {
                report.interrupted = true;
                break;
            }
            if report.rounds == self.max_rounds {
                warn!(
                    remaining = pending.len(),
                    "giving up after {} rounds", self.max_rounds
                );
                break;
            }
            if report.rounds > 0 && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
            report.rounds += 1;
            debug!(round = report.rounds, pending = pending.len(), "starting round");

            let mut handles = Vec::with_capacity(pending.len());
            for url in &pending {
                if self.interrupt.is_triggered() {
                    break;
                }
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                if self.interrupt.is_triggered() {
                    break;
                }
                let fetch = Arc::clone(&fetch);
                let url = url.clone();
                handles.push(tokio::task::spawn_blocking(move || {
                    let attempt = fetch(&url);
                    drop(permit);
                    (url, attempt)
                }));
            }

            let mut settled = HashSet::new();
            for handle in handles {
                let (url, attempt) = match handle.await {
                    Ok(result) => result,
                    Err(err) => {
                        warn!("request worker failed: {err}");
                        continue;
                    }
                };
                if self.interrupt.is_triggered() {
                    continue;
                }

                match attempt {
                    Attempt::Done(value) => {
                        settled.insert(url.clone());
                        report.completed.push((url, value));
                        self.log_progress(report.completed.len(), total);
                    }
                    Attempt::Fatal(reason) => {
                        debug!(url = url.as_str(), "fatal: {reason}");
                        settled.insert(url.clone());
                        report.fatal.push(url);
                    }
                    Attempt::Retry(reason) => {
                        debug!(url = url.as_str(), "will retry: {reason}");
                    }
                }
            }

            pending.retain(|url| !settled.contains(url));
        }

        if self.interrupt.is_triggered() {
            report.interrupted = true;
        }
        report.unfinished = pending;

        if !report.fatal.is_empty() {
            warn!("{} of {} requests failed permanently", report.fatal.len(), total);
        }

        report
    }

    fn log_progress(&self, completed: usize, total: usize) {
        if let Some((label, every)) = self.progress {
            if completed % every == 0 {
                info!("{label}: {} remaining", total.saturating_sub(completed));
            }
        }
    }
}

fn dedup_urls(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(urls.len());
    urls.into_iter()
        .filter(|url| {
            let fresh = seen.insert(url.clone());
            if !fresh {
                warn!(url = url.as_str(), "duplicate URL in request list");
            }
            fresh
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{atomic::AtomicUsize, Mutex},
        thread,
    };

    use super::*;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://test/{i}")).collect()
    }

    fn pool() -> RetryPool {
        RetryPool::new(4, 16, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_all_succeed_in_one_round() {
        let report = pool().run(urls(10), |url| Attempt::Done(url.len())).await;

        assert_eq!(report.completed.len(), 10);
        assert_eq!(report.rounds, 1);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_transient_then_success_converges() {
        let calls: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let seen = Arc::clone(&calls);

        let report = pool()
            .run(urls(5), move |url| {
                let mut calls = seen.lock().unwrap();
                let count = calls.entry(url.to_string()).or_insert(0);
                *count += 1;
                if *count < 3 {
                    Attempt::Retry("503".into())
                } else {
                    Attempt::Done(())
                }
            })
            .await;

        assert!(report.is_complete());
        assert!(report.unfinished.is_empty());
        assert_eq!(report.completed.len(), 5);
        assert_eq!(report.rounds, 3);
        assert!(calls.lock().unwrap().values().all(|&c| c == 3));
    }

    #[tokio::test]
    async fn test_all_fatal_terminates_immediately() {
        let report = pool()
            .run(urls(7), |_| Attempt::<()>::Fatal("404".into()))
            .await;

        assert_eq!(report.rounds, 1);
        assert_eq!(report.fatal.len(), 7);
        assert!(report.completed.is_empty());
        assert!(report.unfinished.is_empty());
        assert_eq!(report.missing_count(), 7);
    }

    #[tokio::test]
    async fn test_mixed_fatal_and_success() {
        let report = pool()
            .run(urls(6), |url| {
                if url.ends_with('3') {
                    Attempt::Fatal("410".into())
                } else {
                    Attempt::Done(url.to_string())
                }
            })
            .await;

        assert_eq!(report.completed.len(), 5);
        assert_eq!(report.fatal, vec!["http://test/3".to_string()]);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_round_limit_reports_unfinished() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let report = RetryPool::new(2, 3, Duration::ZERO)
            .run(urls(2), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Attempt::<()>::Retry("timeout".into())
            })
            .await;

        assert_eq!(report.rounds, 3);
        assert_eq!(report.unfinished.len(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_duplicates_are_fetched_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let mut list = urls(3);
        list.push(list[0].clone());

        let report = pool()
            .run(list, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Attempt::Done(())
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(report.completed.len(), 3);
    }

    #[tokio::test]
    async fn test_interrupt_stops_before_fetching() {
        let interrupt = Interrupt::new();
        interrupt.trigger();

        let report = pool()
            .with_interrupt(interrupt)
            .run(urls(4), |_| Attempt::Done(()))
            .await;

        assert!(report.interrupted);
        assert!(report.completed.is_empty());
        assert_eq!(report.unfinished.len(), 4);
    }

    #[tokio::test]
    async fn test_interrupt_discards_in_flight_results() {
        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();

        let report = RetryPool::new(1, 16, Duration::ZERO)
            .with_interrupt(interrupt)
            .run(urls(3), move |_| {
                trigger.trigger();
                Attempt::Done(())
            })
            .await;

        assert!(report.interrupted);
        assert!(report.completed.is_empty());
        assert!(!report.is_complete());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (current, max) = (Arc::clone(&in_flight), Arc::clone(&peak));

        let report = RetryPool::new(3, 16, Duration::ZERO)
            .run(urls(20), move |_| {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                current.fetch_sub(1, Ordering::SeqCst);
                Attempt::Done(())
            })
            .await;

        assert_eq!(report.completed.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_attempt_map() {
        assert!(matches!(Attempt::Done(2).map(|v| v * 2), Attempt::Done(4)));
        assert!(matches!(
            Attempt::<u8>::Fatal("x".into()).map(|v| v + 1),
            Attempt::Fatal(_)
        ));
    }
}
