//! Relay-Atlas: a relay-list crawler for the Nostr network
//!
//! This crate discovers publicly reachable relays by asking already-known
//! relays for relay-list metadata events (kind 10002), classifying every
//! advertised URL and recursively crawling the reachable ones until the
//! discovery graph is exhausted.

pub mod config;
pub mod crawler;
pub mod output;
pub mod registry;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Relay-Atlas operations
#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors produced by a single fetch attempt against one relay
///
/// Every variant is recoverable: the scheduler retries the relay and only
/// marks it offline once its attempts are exhausted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Connect failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Timed out waiting for {url}")]
    Timeout { url: String },

    #[error("Protocol error from {url}: {message}")]
    Protocol { url: String, message: String },

    #[error("Undecodable message: {0}")]
    Decode(String),
}

/// Result type alias for Relay-Atlas operations
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for fetch attempts
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::Config;
pub use registry::{Registry, RelayRecord};
pub use state::CrawlState;
pub use url::{classify, normalize_relay_url, Category, RelayUrl};
