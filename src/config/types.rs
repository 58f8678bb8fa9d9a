use serde::{Deserialize, Serialize};

/// Relay used when neither the configuration nor a checkpoint supplies seeds
pub const DEFAULT_SEED: &str = "wss://nos.lol";

/// Main configuration structure for Relay-Atlas
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Relays the crawl starts from
    pub seeds: Vec<String>,
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Returns the configured seeds, or the default seed when none are set
    pub fn seeds_or_default(&self) -> Vec<String> {
        if self.seeds.is_empty() {
            vec![DEFAULT_SEED.to_string()]
        } else {
            self.seeds.clone()
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of simultaneous relay connections
    #[serde(rename = "max-concurrent-fetches")]
    pub max_concurrent_fetches: u32,

    /// Attempts per relay before it is marked offline
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Deadline for reading a relay's answer (milliseconds)
    #[serde(rename = "attempt-timeout-ms")]
    pub attempt_timeout_ms: u64,

    /// Deadline for TCP connect plus WebSocket handshake (milliseconds)
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// Pause between attempts against the same relay (milliseconds)
    #[serde(rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,

    /// Minimum wait before the frontier is polled again (milliseconds)
    #[serde(rename = "repoll-interval-ms")]
    pub repoll_interval_ms: u64,

    /// Event limit sent with each relay-list request
    #[serde(rename = "result-limit")]
    pub result_limit: u32,

    /// Deepest discovery level that is still fetched; unbounded when absent
    #[serde(rename = "max-depth", skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 32,
            max_retries: 2,
            attempt_timeout_ms: 3_000,
            connect_timeout_ms: 3_000,
            retry_backoff_ms: 2_000,
            repoll_interval_ms: 250,
            result_limit: 100,
            max_depth: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the SQLite checkpoint database
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory receiving the per-category CSV files
    #[serde(rename = "export-dir")]
    pub export_dir: String,

    /// Seconds between registry checkpoints during a crawl
    #[serde(rename = "checkpoint-interval-secs")]
    pub checkpoint_interval_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "relay-atlas.db".to_string(),
            export_dir: "relays".to_string(),
            checkpoint_interval_secs: 30,
        }
    }
}
