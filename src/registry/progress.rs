use super::Registry;
use crate::state::CrawlState;
use crate::url::Category;
use std::collections::BTreeMap;

/// Point-in-time counts derived from registry membership
///
/// Computed on demand, never maintained incrementally, so the numbers always
/// agree with the records they describe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryCounts {
    pub total: u64,
    pub by_category: BTreeMap<Category, u64>,
    pub by_state: BTreeMap<CrawlState, u64>,
    /// `wss://` relays
    pub secure: u64,
    /// `ws://` relays
    pub insecure: u64,
}

impl RegistryCounts {
    pub fn category(&self, category: Category) -> u64 {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    pub fn state(&self, state: CrawlState) -> u64 {
        self.by_state.get(&state).copied().unwrap_or(0)
    }

    pub fn crawled(&self) -> u64 {
        self.state(CrawlState::Crawled)
    }

    pub fn offline(&self) -> u64 {
        self.state(CrawlState::Offline)
    }

    pub fn in_flight(&self) -> u64 {
        self.state(CrawlState::InFlight)
    }

    pub fn pending(&self) -> u64 {
        self.state(CrawlState::Pending)
    }

    /// Relays still waiting for, or undergoing, a fetch
    pub fn remaining(&self) -> u64 {
        self.pending() + self.in_flight()
    }

    /// Relays that were never eligible for fetching
    pub fn excluded(&self) -> u64 {
        self.state(CrawlState::Excluded) + self.state(CrawlState::DepthExceeded)
    }
}

impl Registry {
    /// Tallies every record by category, state and scheme
    pub fn counts(&self) -> RegistryCounts {
        let relays = self.lock();
        let mut counts = RegistryCounts::default();

        for record in relays.values() {
            counts.total += 1;
            *counts.by_category.entry(record.category).or_insert(0) += 1;
            *counts.by_state.entry(record.state).or_insert(0) += 1;
            if record.url.is_secure() {
                counts.secure += 1;
            } else if record.url.as_str().starts_with("ws://") {
                counts.insecure += 1;
            }
        }

        counts
    }

    /// Returns true once the crawl has reached a fixed point
    ///
    /// Every relay must be crawled, offline, or never eligible for fetching.
    /// An empty registry is trivially complete.
    pub fn completed(&self) -> bool {
        self.lock().values().all(|record| record.is_settled())
    }
}
