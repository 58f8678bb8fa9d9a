use crate::state::CrawlState;
use crate::url::{Category, RelayUrl};
use chrono::{DateTime, Utc};
use std::fmt;

/// Who first advertised a relay
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiscoveredBy {
    /// The relay was a seed of the crawl
    Seed,
    /// The relay was listed in an event served by another relay
    Relay(RelayUrl),
}

impl DiscoveredBy {
    const SEED: &'static str = "seed";

    /// Converts to the string stored in checkpoints and exports
    pub fn to_db_string(&self) -> &str {
        match self {
            Self::Seed => Self::SEED,
            Self::Relay(url) => url.as_str(),
        }
    }

    /// Parses the checkpoint representation
    pub fn from_db_string(s: &str) -> Self {
        if s == Self::SEED {
            Self::Seed
        } else {
            Self::Relay(RelayUrl::new(s))
        }
    }
}

impl fmt::Display for DiscoveredBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Everything known about one relay
#[derive(Debug, Clone, PartialEq)]
pub struct RelayRecord {
    pub url: RelayUrl,
    /// Number of times any relay list (or the seed set) named this relay
    pub discovery_count: u64,
    pub discovered_by: DiscoveredBy,
    pub category: Category,
    pub state: CrawlState,
    /// Discovery depth, fixed at first registration (seeds are depth 0)
    pub depth: u32,
    /// Fetch attempts started against this relay
    pub attempts: u32,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelayRecord {
    /// Returns true if the relay is waiting in the frontier
    pub fn is_frontier(&self) -> bool {
        self.category == Category::ClearOnline && self.state == CrawlState::Pending
    }

    /// Returns true if the relay needs no further work
    pub fn is_settled(&self) -> bool {
        matches!(self.state, CrawlState::Crawled | CrawlState::Offline)
            || self.category.is_excluded()
            || self.state == CrawlState::DepthExceeded
    }
}
