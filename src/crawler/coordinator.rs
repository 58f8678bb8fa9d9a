//! Crawler coordinator - run orchestration
//!
//! This module wires the pieces of a crawl together:
//! - Opening the checkpoint and deciding how to start (fresh, resume, new sweep)
//! - Driving the scheduler while checkpointing the registry periodically
//! - Recording the run outcome and exporting the final partitions

use crate::config::Config;
use crate::crawler::fetcher::{RelayFetcher, WebSocketFetcher};
use crate::crawler::scheduler::{CrawlOutcome, Scheduler, SchedulerSettings};
use crate::output::export_partitions;
use crate::registry::{Registry, RegistryCounts};
use crate::state::CrawlState;
use crate::storage::{open_storage, RunStatus, SqliteStorage, Storage};
use crate::url::{Category, RelayUrl};
use crate::AtlasError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// How the registry was populated at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Seeds only; no prior state was used
    Fresh,
    /// Every checkpointed relay restored from an unfinished run
    Resume,
    /// Reachable relays of a finished run re-seeded for another pass
    NewSweep,
}

/// Summary of a finished (or cancelled) crawl
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub run_id: i64,
    pub start_mode: StartMode,
    pub outcome: CrawlOutcome,
    pub status: RunStatus,
    pub counts: RegistryCounts,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    storage: SqliteStorage,
    registry: Arc<Registry>,
    fetcher: Arc<dyn RelayFetcher>,
    run_id: i64,
    start_mode: StartMode,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash recorded with a newly created run
    /// * `fresh` - Whether to ignore and clear prior checkpoint data
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(AtlasError)` - Failed to open or read the checkpoint
    pub fn new(config: Config, config_hash: &str, fresh: bool) -> Result<Self, AtlasError> {
        let storage_path = Path::new(&config.output.database_path);
        let mut storage = open_storage(storage_path)?;
        let registry = Arc::new(Registry::new(config.crawler.max_depth));

        let (run_id, start_mode) =
            prepare_run(&mut storage, &registry, &config, config_hash, fresh)?;

        let fetcher: Arc<dyn RelayFetcher> =
            Arc::new(WebSocketFetcher::from_config(&config.crawler));

        Ok(Self {
            config: Arc::new(config),
            storage,
            registry,
            fetcher,
            run_id,
            start_mode,
        })
    }

    /// Replaces the network fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn RelayFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn start_mode(&self) -> StartMode {
        self.start_mode
    }

    /// Runs the crawl until the frontier drains or `cancel` fires
    ///
    /// The registry is checkpointed every `checkpoint-interval-secs` and once
    /// more at the end, whatever the outcome. The run is recorded as
    /// `completed` only if every relay reached a terminal state; otherwise it
    /// stays resumable as `interrupted`.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<CrawlReport, AtlasError> {
        tracing::info!(
            run = self.run_id,
            mode = ?self.start_mode,
            relays = self.registry.len(),
            frontier = self.registry.snapshot_pending().len(),
            "Starting crawl run"
        );

        let scheduler = Scheduler::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.fetcher),
            SchedulerSettings::from_config(&self.config.crawler),
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(
            self.config.output.checkpoint_interval_secs,
        ));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let crawl = scheduler.run(&cancel);
        tokio::pin!(crawl);

        let outcome = loop {
            tokio::select! {
                outcome = &mut crawl => break outcome,
                _ = ticker.tick() => {
                    if let Err(e) = self.checkpoint() {
                        tracing::warn!(error = %e, "Periodic checkpoint failed");
                    }
                    self.log_progress();
                }
            }
        };

        self.checkpoint()?;

        let status = if outcome == CrawlOutcome::Drained && self.registry.completed() {
            RunStatus::Completed
        } else {
            RunStatus::Interrupted
        };
        self.storage.finish_run(self.run_id, status)?;

        let export_dir = Path::new(&self.config.output.export_dir);
        let exported = export_partitions(&self.registry.snapshot(), export_dir)?;
        tracing::info!(
            dir = %export_dir.display(),
            files = exported.len(),
            "Exported relay partitions"
        );

        let counts = self.registry.counts();
        tracing::info!(
            run = self.run_id,
            status = status.to_db_string(),
            found = counts.total,
            crawled = counts.crawled(),
            offline = counts.offline(),
            excluded = counts.excluded(),
            "Crawl finished"
        );

        Ok(CrawlReport {
            run_id: self.run_id,
            start_mode: self.start_mode,
            outcome,
            status,
            counts,
        })
    }

    /// Writes the full registry snapshot to the checkpoint
    pub fn checkpoint(&mut self) -> Result<usize, AtlasError> {
        let saved = self.storage.save_relays(&self.registry.snapshot())?;
        tracing::debug!(rows = saved, "Checkpoint saved");
        Ok(saved)
    }

    fn log_progress(&self) {
        let counts = self.registry.counts();
        tracing::info!(
            found = counts.total,
            crawled = counts.crawled(),
            offline = counts.offline(),
            in_flight = counts.in_flight(),
            remaining = counts.remaining(),
            wss = counts.secure,
            ws = counts.insecure,
            "Crawl progress"
        );
    }
}

/// Populates the registry and picks the run to record progress under
fn prepare_run(
    storage: &mut SqliteStorage,
    registry: &Registry,
    config: &Config,
    config_hash: &str,
    fresh: bool,
) -> Result<(i64, StartMode), AtlasError> {
    if fresh {
        tracing::info!("Fresh start requested, clearing checkpointed relays");
        storage.clear_relays()?;
        register_seeds(registry, &config.seeds_or_default());
        return Ok((storage.create_run(config_hash)?, StartMode::Fresh));
    }

    let latest_run = storage.get_latest_run()?;
    let prior = storage.load_relays()?;

    if let Some(run) = latest_run.filter(|run| run.status.is_resumable()) {
        if prior.is_empty() {
            tracing::info!(run = run.id, "Unfinished run left no relays, closing it");
            storage.finish_run(run.id, RunStatus::Interrupted)?;
        } else {
            let restored = registry.restore(prior);
            let ignored: Vec<&str> = config
                .seeds
                .iter()
                .map(String::as_str)
                .filter(|seed| registry.get(&RelayUrl::new(seed)).is_none())
                .collect();
            if !ignored.is_empty() {
                tracing::warn!(
                    seeds = ?ignored,
                    "Seeds not in the checkpoint are ignored on resume"
                );
            }

            storage.update_run_status(run.id, RunStatus::Running)?;
            tracing::info!(run = run.id, restored, "Resuming interrupted run");
            return Ok((run.id, StartMode::Resume));
        }
    }

    let reachable: Vec<String> = prior
        .iter()
        .filter(|record| {
            record.category == Category::ClearOnline && record.state != CrawlState::Offline
        })
        .map(|record| record.url.to_string())
        .collect();

    if reachable.is_empty() {
        tracing::info!("No reachable relays checkpointed, starting from seeds");
        storage.clear_relays()?;
        register_seeds(registry, &config.seeds_or_default());
        return Ok((storage.create_run(config_hash)?, StartMode::Fresh));
    }

    tracing::info!(relays = reachable.len(), "Starting new sweep from checkpointed relays");
    storage.clear_relays()?;
    register_seeds(registry, &reachable);
    register_seeds(registry, &config.seeds);
    Ok((storage.create_run(config_hash)?, StartMode::NewSweep))
}

fn register_seeds(registry: &Registry, seeds: &[String]) {
    for seed in seeds {
        let registration = registry.register_seed(seed);
        if registration.is_new && registration.record.category.is_excluded() {
            tracing::warn!(
                seed = %registration.record.url,
                category = %registration.record.category,
                "Seed is not a crawlable relay"
            );
        }
    }
}
