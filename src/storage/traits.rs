//! Storage traits and error types
//!
//! This module defines the trait interface for checkpoint backends and
//! associated error types.

use crate::registry::RelayRecord;
use crate::state::CrawlState;
use crate::storage::{RunRecord, RunStatus};
use crate::url::Category;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt checkpoint row for {url}: {reason}")]
    CorruptRow { url: String, reason: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for checkpoint backend implementations
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run in the `running` state
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration that started the run
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Sets a final status and the finish timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Relay Snapshot =====

    /// Upserts every record in one transaction
    ///
    /// Returns the number of rows written.
    fn save_relays(&mut self, records: &[RelayRecord]) -> StorageResult<usize>;

    /// Loads every checkpointed relay, ordered by URL
    fn load_relays(&self) -> StorageResult<Vec<RelayRecord>>;

    /// Deletes every checkpointed relay
    fn clear_relays(&mut self) -> StorageResult<()>;

    // ===== Statistics =====

    /// Counts checkpointed relays
    fn count_relays(&self) -> StorageResult<u64>;

    /// Counts checkpointed relays per category
    fn count_by_category(&self) -> StorageResult<BTreeMap<Category, u64>>;

    /// Counts checkpointed relays per crawl state
    fn count_by_state(&self) -> StorageResult<BTreeMap<CrawlState, u64>>;
}
