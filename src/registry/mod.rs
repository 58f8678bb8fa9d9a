//! Relay registry: the single source of truth for a crawl
//!
//! Every discovered relay URL maps to exactly one [`RelayRecord`]. All
//! mutation goes through the operations on [`Registry`], each of which runs
//! inside one critical section, so concurrent discoverers can never lose a
//! discovery count or create a record twice.

mod progress;
mod record;

pub use progress::RegistryCounts;
pub use record::{DiscoveredBy, RelayRecord};

use crate::state::CrawlState;
use crate::url::{classify, RelayUrl};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Outcome of [`Registry::register`]
#[derive(Debug, Clone)]
pub struct Registration {
    /// True when this call created the record
    pub is_new: bool,
    /// The record as it stands after the call
    pub record: RelayRecord,
}

/// Concurrency-safe store of all discovered relays
#[derive(Debug, Default)]
pub struct Registry {
    relays: Mutex<HashMap<RelayUrl, RelayRecord>>,
    max_depth: Option<u32>,
}

impl Registry {
    /// Creates an empty registry
    ///
    /// # Arguments
    ///
    /// * `max_depth` - Relays first discovered deeper than this are recorded
    ///   but never fetched. `None` disables the bound.
    pub fn new(max_depth: Option<u32>) -> Self {
        Self {
            relays: Mutex::new(HashMap::new()),
            max_depth,
        }
    }

    // Every critical section leaves the map consistent, so a poisoned guard
    // is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<RelayUrl, RelayRecord>> {
        self.relays.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one occurrence of a relay URL
    ///
    /// If the URL is new, it is classified and a record is created with a
    /// discovery count of 1. Frontier relays start `Pending`; excluded
    /// categories start `Excluded`; relays beyond the depth bound start
    /// `DepthExceeded`. If the URL is already known, only the discovery count
    /// changes. Category and depth are never recomputed.
    pub fn register(&self, raw: &str, discovered_by: DiscoveredBy, depth: u32) -> Registration {
        let url = RelayUrl::new(raw);
        let mut relays = self.lock();

        if let Some(record) = relays.get_mut(&url) {
            record.discovery_count += 1;
            record.updated_at = Utc::now();
            return Registration {
                is_new: false,
                record: record.clone(),
            };
        }

        let category = classify(url.as_str());
        let state = if category.is_excluded() {
            CrawlState::Excluded
        } else if self.max_depth.is_some_and(|max| depth > max) {
            CrawlState::DepthExceeded
        } else {
            CrawlState::Pending
        };

        let now = Utc::now();
        let record = RelayRecord {
            url: url.clone(),
            discovery_count: 1,
            discovered_by,
            category,
            state,
            depth,
            attempts: 0,
            first_seen_at: now,
            updated_at: now,
        };
        relays.insert(url, record.clone());

        Registration {
            is_new: true,
            record,
        }
    }

    /// Registers a seed relay at depth 0
    pub fn register_seed(&self, raw: &str) -> Registration {
        self.register(raw, DiscoveredBy::Seed, 0)
    }

    /// Claims a relay for one fetch attempt
    ///
    /// Performs the exclusive `Pending -> InFlight` transition and counts the
    /// attempt. Returns false if the relay is unknown, not in the frontier, or
    /// already in flight, in which case the caller must not fetch it.
    pub fn begin_attempt(&self, url: &RelayUrl) -> bool {
        let mut relays = self.lock();
        match relays.get_mut(url) {
            Some(record) if record.is_frontier() => {
                record.state = CrawlState::InFlight;
                record.attempts += 1;
                record.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Returns an in-flight relay to `Pending` after a failed attempt
    pub fn retry_later(&self, url: &RelayUrl) -> bool {
        self.transition(url, CrawlState::InFlight, CrawlState::Pending)
    }

    /// Marks a relay as successfully crawled
    ///
    /// Idempotent: only an active relay changes state; anything else is left
    /// untouched and false is returned.
    pub fn mark_crawled(&self, url: &RelayUrl) -> bool {
        let mut relays = self.lock();
        match relays.get_mut(url) {
            Some(record) if record.state.is_active() => {
                record.state = CrawlState::Crawled;
                record.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Marks a relay as offline after its retries are exhausted
    ///
    /// Moves the relay to the `ClearOffline` category. Idempotent like
    /// [`Registry::mark_crawled`].
    pub fn mark_offline(&self, url: &RelayUrl) -> bool {
        let mut relays = self.lock();
        match relays.get_mut(url) {
            Some(record) if record.state.is_active() => {
                record.state = CrawlState::Offline;
                record.category = crate::url::Category::ClearOffline;
                record.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    fn transition(&self, url: &RelayUrl, from: CrawlState, to: CrawlState) -> bool {
        let mut relays = self.lock();
        match relays.get_mut(url) {
            Some(record) if record.state == from => {
                record.state = to;
                record.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Returns a consistent view of the frontier
    ///
    /// The frontier is every `ClearOnline` relay in `Pending`, ordered by
    /// depth and then URL so shallow relays are dispatched first.
    pub fn snapshot_pending(&self) -> Vec<RelayRecord> {
        let relays = self.lock();
        let mut pending: Vec<RelayRecord> = relays
            .values()
            .filter(|record| record.is_frontier())
            .cloned()
            .collect();
        drop(relays);

        pending.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.url.cmp(&b.url)));
        pending
    }

    /// Returns a copy of every record, ordered by URL
    pub fn snapshot(&self) -> Vec<RelayRecord> {
        let relays = self.lock();
        let mut all: Vec<RelayRecord> = relays.values().cloned().collect();
        drop(relays);

        all.sort_by(|a, b| a.url.cmp(&b.url));
        all
    }

    /// Looks up a single relay
    pub fn get(&self, url: &RelayUrl) -> Option<RelayRecord> {
        self.lock().get(url).cloned()
    }

    /// Number of known relays
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no relay has been registered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Loads checkpointed records, replacing any record with the same URL
    ///
    /// Records that were in flight when the checkpoint was taken go back to
    /// `Pending`; everything else is restored as saved.
    pub fn restore(&self, records: impl IntoIterator<Item = RelayRecord>) -> usize {
        let mut relays = self.lock();
        let mut restored = 0;
        for mut record in records {
            if record.state == CrawlState::InFlight {
                record.state = CrawlState::Pending;
            }
            relays.insert(record.url.clone(), record);
            restored += 1;
        }
        restored
    }
}
