//! Crawler module for relay discovery
//!
//! This module contains the core crawling logic, including:
//! - The Nostr wire messages used to ask a relay for relay lists
//! - The WebSocket fetch client
//! - Bounded-concurrency scheduling with per-relay retries
//! - Overall run coordination and checkpointing

mod coordinator;
mod fetcher;
mod protocol;
mod scheduler;

pub use coordinator::{Coordinator, CrawlReport, StartMode};
pub use fetcher::{RelayFetcher, WebSocketFetcher};
pub use protocol::{
    build_close, build_request, extract_relay_tags, parse_message, RelayMessage, RELAY_LIST_KIND,
    SUBSCRIPTION_ID,
};
pub use scheduler::{CrawlOutcome, Scheduler, SchedulerSettings};

use crate::config::Config;
use crate::AtlasError;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the checkpoint and seed or restore the registry
/// 2. Crawl until the frontier drains or `cancel` fires
/// 3. Save the registry and record the run outcome
/// 4. Export the per-category CSV files
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration, recorded with the run
/// * `fresh` - Ignore prior checkpoint data
/// * `cancel` - Stops the crawl early when cancelled
pub async fn run_crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
    cancel: CancellationToken,
) -> Result<CrawlReport, AtlasError> {
    let mut coordinator = Coordinator::new(config, config_hash, fresh)?;
    coordinator.run(cancel).await
}
