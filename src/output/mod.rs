//! Output module for crawl reports and exports
//!
//! This module handles:
//! - Printing relay statistics from the checkpoint
//! - Exporting the registry as per-category CSV files

mod csv_export;
pub mod stats;

pub use csv_export::{export_partitions, ExportedFile, Partition};
pub use stats::{format_statistics, load_statistics, print_statistics, CrawlStatistics};

use crate::storage::{Storage, StorageError};
use std::path::Path;
use thiserror::Error;

/// Errors raised while producing reports
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Exports the checkpointed relays of `storage` into `dir`
///
/// # Arguments
///
/// * `storage` - The storage backend containing crawl data
/// * `dir` - Directory receiving the partition files
///
/// # Returns
///
/// * `Ok(Vec<ExportedFile>)` - One entry per partition file written
/// * `Err(OutputError)` - Failed to read the checkpoint or write a file
pub fn export_from_storage(
    storage: &dyn Storage,
    dir: &Path,
) -> Result<Vec<ExportedFile>, OutputError> {
    let records = storage.load_relays()?;
    export_partitions(&records, dir)
}
