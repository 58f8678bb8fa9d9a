//! Per-category CSV exports
//!
//! Every relay lands in exactly one partition file. Rows are ordered by
//! discovery count (most advertised first), then by URL.

use super::OutputError;
use crate::registry::RelayRecord;
use crate::state::CrawlState;
use crate::url::Category;
use std::fs::File;
use std::path::{Path, PathBuf};

const HEADER: [&str; 6] = [
    "Relay URL",
    "Count",
    "Discovered By",
    "Category",
    "Crawl State",
    "Depth",
];

/// One export file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    /// Clear relays that answered
    Online,
    /// Clear relays not crawled (yet): pending, in flight, or beyond max depth
    Pending,
    Offline,
    Api,
    Onion,
    Local,
    Malformed,
}

impl Partition {
    pub fn all() -> [Self; 7] {
        [
            Self::Online,
            Self::Pending,
            Self::Offline,
            Self::Api,
            Self::Onion,
            Self::Local,
            Self::Malformed,
        ]
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Online => "online_relays.csv",
            Self::Pending => "pending_relays.csv",
            Self::Offline => "offline_relays.csv",
            Self::Api => "api_relays.csv",
            Self::Onion => "onion_relays.csv",
            Self::Local => "local_relays.csv",
            Self::Malformed => "malformed_relays.csv",
        }
    }

    /// The partition a record belongs to
    pub fn of(record: &RelayRecord) -> Self {
        match record.category {
            Category::ClearOnline if record.state == CrawlState::Crawled => Self::Online,
            Category::ClearOnline => Self::Pending,
            Category::ClearOffline => Self::Offline,
            Category::ClearApi => Self::Api,
            Category::Onion => Self::Onion,
            Category::Local => Self::Local,
            Category::Malformed => Self::Malformed,
        }
    }
}

/// A written export file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub partition: Partition,
    pub path: PathBuf,
    pub rows: usize,
}

/// Writes every partition file into `dir`, creating it if needed
///
/// Partitions without relays still get a header-only file so a fresh export
/// always replaces stale data from an earlier run.
pub fn export_partitions(
    records: &[RelayRecord],
    dir: &Path,
) -> Result<Vec<ExportedFile>, OutputError> {
    std::fs::create_dir_all(dir)?;

    let mut exported = Vec::with_capacity(Partition::all().len());
    for partition in Partition::all() {
        let mut rows: Vec<&RelayRecord> = records
            .iter()
            .filter(|record| Partition::of(record) == partition)
            .collect();
        rows.sort_by(|a, b| {
            b.discovery_count
                .cmp(&a.discovery_count)
                .then_with(|| a.url.cmp(&b.url))
        });

        let path = dir.join(partition.file_name());
        write_partition(&path, &rows)?;
        tracing::debug!(file = %path.display(), rows = rows.len(), "Exported partition");

        exported.push(ExportedFile {
            partition,
            path,
            rows: rows.len(),
        });
    }

    Ok(exported)
}

fn write_partition(path: &Path, rows: &[&RelayRecord]) -> Result<(), OutputError> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(HEADER)?;

    for record in rows {
        let count = record.discovery_count.to_string();
        let depth = record.depth.to_string();
        writer.write_record([
            record.url.as_str(),
            count.as_str(),
            record.discovered_by.to_db_string(),
            record.category.to_db_string(),
            record.state.to_db_string(),
            depth.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
