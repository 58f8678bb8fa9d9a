//! Crawl scheduler
//!
//! A single dispatch loop drains the registry frontier and hands relays to
//! worker tasks. A fixed-size semaphore is the only admission point for new
//! work, so the number of open relay connections never exceeds the
//! concurrency limit no matter how fast the frontier grows.
//!
//! Each worker owns one relay for its whole retry cycle:
//! - fetch; on success register every advertised URL and mark the relay crawled
//! - on failure return the relay to `Pending`, release the slot, back off, reacquire
//! - after the last failed attempt mark the relay offline

use super::fetcher::RelayFetcher;
use crate::config::CrawlerConfig;
use crate::registry::{DiscoveredBy, Registry, RelayRecord};
use crate::url::RelayUrl;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Operational parameters of a crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Maximum simultaneous fetch attempts
    pub concurrency_limit: usize,
    /// Attempts per relay before it is marked offline
    pub max_retries: u32,
    pub attempt_timeout: Duration,
    /// Pause between consecutive attempts against the same relay
    pub retry_backoff: Duration,
    /// Minimum wait before re-polling an empty frontier
    pub repoll_interval: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            concurrency_limit: config.max_concurrent_fetches as usize,
            max_retries: config.max_retries,
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            repoll_interval: Duration::from_millis(config.repoll_interval_ms),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

/// How a scheduler run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// The frontier drained with no attempts outstanding
    Drained,
    /// The cancellation token fired; in-flight attempts were abandoned
    Cancelled,
}

/// Bounded-concurrency driver of the crawl
pub struct Scheduler {
    registry: Arc<Registry>,
    fetcher: Arc<dyn RelayFetcher>,
    settings: SchedulerSettings,
    gate: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<Registry>,
        fetcher: Arc<dyn RelayFetcher>,
        mut settings: SchedulerSettings,
    ) -> Self {
        settings.concurrency_limit = settings.concurrency_limit.max(1);
        settings.max_retries = settings.max_retries.max(1);
        let gate = Arc::new(Semaphore::new(settings.concurrency_limit));

        Self {
            registry,
            fetcher,
            settings,
            gate,
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Number of admission slots currently free
    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }

    /// Crawls until the frontier is exhausted or `cancel` fires
    ///
    /// The run is drained when a full pass over the frontier finds nothing
    /// eligible and no worker is outstanding. While workers are still running
    /// (or backing off) the loop waits for one to finish or for the re-poll
    /// interval, never spinning.
    ///
    /// On cancellation every worker is aborted and awaited, which drops its
    /// connection. Registry state is left exactly as the workers left it.
    pub async fn run(&self, cancel: &CancellationToken) -> CrawlOutcome {
        let mut workers: JoinSet<RelayUrl> = JoinSet::new();
        let mut active: HashSet<RelayUrl> = HashSet::new();

        loop {
            if cancel.is_cancelled() {
                return self.abandon(workers).await;
            }

            while let Some(joined) = workers.try_join_next() {
                reap(joined, &mut active);
            }
            if workers.is_empty() {
                active.clear();
            }

            let eligible: Vec<RelayRecord> = self
                .registry
                .snapshot_pending()
                .into_iter()
                .filter(|record| !active.contains(&record.url))
                .collect();

            if eligible.is_empty() {
                if workers.is_empty() {
                    tracing::debug!("Frontier drained");
                    return CrawlOutcome::Drained;
                }

                tokio::select! {
                    _ = cancel.cancelled() => return self.abandon(workers).await,
                    Some(joined) = workers.join_next() => reap(joined, &mut active),
                    _ = tokio::time::sleep(self.settings.repoll_interval) => {}
                }
                continue;
            }

            tracing::trace!(eligible = eligible.len(), active = active.len(), "Dispatching");

            for record in eligible {
                let permit = tokio::select! {
                    _ = cancel.cancelled() => return self.abandon(workers).await,
                    permit = Arc::clone(&self.gate).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return self.abandon(workers).await,
                    },
                };

                if !self.registry.begin_attempt(&record.url) {
                    continue;
                }

                active.insert(record.url.clone());
                workers.spawn(self.worker().crawl(record, permit));
            }
        }
    }

    fn worker(&self) -> Worker {
        Worker {
            registry: Arc::clone(&self.registry),
            fetcher: Arc::clone(&self.fetcher),
            gate: Arc::clone(&self.gate),
            settings: self.settings.clone(),
        }
    }

    async fn abandon(&self, mut workers: JoinSet<RelayUrl>) -> CrawlOutcome {
        let abandoned = workers.len();
        workers.shutdown().await;
        tracing::info!(abandoned, "Crawl cancelled");
        CrawlOutcome::Cancelled
    }
}

fn reap(joined: Result<RelayUrl, JoinError>, active: &mut HashSet<RelayUrl>) {
    match joined {
        Ok(url) => {
            active.remove(&url);
        }
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::error!(error = %e, "Relay worker panicked"),
    }
}

/// Everything one relay's retry cycle needs
struct Worker {
    registry: Arc<Registry>,
    fetcher: Arc<dyn RelayFetcher>,
    gate: Arc<Semaphore>,
    settings: SchedulerSettings,
}

impl Worker {
    /// Runs the attempt loop for a relay already moved to `InFlight`
    async fn crawl(self, record: RelayRecord, mut permit: OwnedSemaphorePermit) -> RelayUrl {
        let url = record.url;
        let child_depth = record.depth.saturating_add(1);
        let mut attempt = 1;

        loop {
            match self.fetcher.fetch(&url, self.settings.attempt_timeout).await {
                Ok(advertised) => {
                    let parent = DiscoveredBy::Relay(url.clone());
                    let mut new_relays = 0;
                    for child in &advertised {
                        if self
                            .registry
                            .register(child, parent.clone(), child_depth)
                            .is_new
                        {
                            new_relays += 1;
                        }
                    }
                    self.registry.mark_crawled(&url);

                    tracing::info!(
                        relay = %url,
                        attempt,
                        advertised = advertised.len(),
                        new_relays,
                        "Relay crawled"
                    );
                    return url;
                }
                Err(e) if attempt < self.settings.max_retries => {
                    tracing::debug!(
                        relay = %url,
                        attempt,
                        error = %e,
                        "Attempt failed, backing off"
                    );

                    self.registry.retry_later(&url);
                    drop(permit);
                    tokio::time::sleep(self.settings.retry_backoff).await;

                    permit = match Arc::clone(&self.gate).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return url,
                    };
                    if !self.registry.begin_attempt(&url) {
                        tracing::warn!(relay = %url, "Relay claimed elsewhere during backoff");
                        return url;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    self.registry.mark_offline(&url);
                    tracing::info!(relay = %url, attempts = attempt, error = %e, "Relay offline");
                    return url;
                }
            }
        }
    }
}
