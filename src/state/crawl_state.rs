/// Crawl state definitions for tracking relay progress
///
/// This module defines every state a relay record can be in during a crawl.
use std::fmt;

/// Represents the current crawl state of a relay
///
/// ```text
/// Pending -> InFlight -> Crawled
///               |
///               +-> Pending (retry) -> InFlight -> ... -> Offline
/// ```
///
/// Relays in an excluded category start (and stay) in `Excluded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CrawlState {
    // ===== Active States =====
    /// Relay is waiting for its next fetch attempt
    Pending,

    /// A fetch attempt is running against this relay
    InFlight,

    // ===== Terminal States =====
    /// Relay answered and its relay lists were read
    Crawled,

    /// Relay failed every attempt
    Offline,

    /// Relay category is never fetched (local, onion, API, malformed)
    Excluded,

    /// Relay was first discovered beyond the configured maximum depth
    DepthExceeded,
}

impl CrawlState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if this is an active state (relay may still be fetched)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InFlight)
    }

    /// Converts the crawl state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Crawled => "crawled",
            Self::Offline => "offline",
            Self::Excluded => "excluded",
            Self::DepthExceeded => "depth_exceeded",
        }
    }

    /// Parses a crawl state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_flight" => Some(Self::InFlight),
            "crawled" => Some(Self::Crawled),
            "offline" => Some(Self::Offline),
            "excluded" => Some(Self::Excluded),
            "depth_exceeded" => Some(Self::DepthExceeded),
            _ => None,
        }
    }

    /// Returns all possible crawl states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::InFlight,
            Self::Crawled,
            Self::Offline,
            Self::Excluded,
            Self::DepthExceeded,
        ]
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
