//! Statistics from the checkpoint database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use super::OutputError;
use crate::registry::RegistryCounts;
use crate::state::CrawlState;
use crate::storage::{RunRecord, Storage};
use crate::url::Category;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Crawl statistics summary
#[derive(Debug, Clone, Default)]
pub struct CrawlStatistics {
    /// Total number of relays discovered
    pub total_relays: u64,

    /// Count of relays by category
    pub by_category: BTreeMap<Category, u64>,

    /// Count of relays by crawl state
    pub by_state: BTreeMap<CrawlState, u64>,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl CrawlStatistics {
    fn count_state(&self, state: CrawlState) -> u64 {
        self.by_state.get(&state).copied().unwrap_or(0)
    }
}

impl From<&RegistryCounts> for CrawlStatistics {
    fn from(counts: &RegistryCounts) -> Self {
        Self {
            total_relays: counts.total,
            by_category: counts.by_category.clone(),
            by_state: counts.by_state.clone(),
            latest_run: None,
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(OutputError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, OutputError> {
    Ok(CrawlStatistics {
        total_relays: storage.count_relays()?,
        by_category: storage.count_by_category()?,
        by_state: storage.count_by_state()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Renders statistics as a plain-text report
pub fn format_statistics(stats: &CrawlStatistics) -> String {
    let mut out = String::new();
    let percent = |count: u64| {
        if stats.total_relays > 0 {
            (count as f64 / stats.total_relays as f64) * 100.0
        } else {
            0.0
        }
    };

    let _ = writeln!(out, "=== Relay Statistics ===\n");

    if let Some(run) = &stats.latest_run {
        let _ = writeln!(out, "Latest run #{} ({})", run.id, run.status.to_db_string());
        let _ = writeln!(out, "  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            let _ = writeln!(out, "  Finished: {}", finished);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "Total relays discovered: {}\n", stats.total_relays);

    let _ = writeln!(out, "Relays by Category:");
    for category in Category::all() {
        let count = stats.by_category.get(&category).copied().unwrap_or(0);
        let _ = writeln!(out, "  {}: {} ({:.1}%)", category, count, percent(count));
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Relays by Crawl State:");
    for state in CrawlState::all_states() {
        let count = stats.count_state(state);
        if count > 0 {
            let _ = writeln!(out, "  {}: {}", state, count);
        }
    }
    let _ = writeln!(out);

    let crawled = stats.count_state(CrawlState::Crawled);
    let attempted = crawled + stats.count_state(CrawlState::Offline);
    let success_rate = if attempted > 0 {
        (crawled as f64 / attempted as f64) * 100.0
    } else {
        0.0
    };
    let _ = writeln!(
        out,
        "Reachability: {:.1}% ({} / {} attempted relays answered)",
        success_rate, crawled, attempted
    );

    out
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    print!("{}", format_statistics(stats));
}
