//! URL handling module for Relay-Atlas
//!
//! This module provides relay URL normalization and the relay classifier
//! that decides which advertised endpoints are worth connecting to.

mod classify;
mod normalize;

// Re-export main functions
pub use classify::classify;
pub use normalize::{normalize_relay_url, RelayUrl};

/// Relay categories
///
/// A category is computed once, when a relay is first registered. Only
/// `ClearOnline` can change afterwards, becoming `ClearOffline` once a relay
/// exhausts its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Publicly reachable relay, crawled
    ClearOnline,
    /// Publicly addressed relay that failed every attempt
    ClearOffline,
    /// Relay URL with a path (filtered or API endpoint)
    ClearApi,
    /// Tor hidden service
    Onion,
    /// mDNS name or non-routable IP literal
    Local,
    /// Not a usable websocket URL
    Malformed,
}

impl Category {
    /// Returns true for categories that are never scheduled for fetching
    pub fn is_excluded(&self) -> bool {
        matches!(
            self,
            Self::ClearApi | Self::Onion | Self::Local | Self::Malformed
        )
    }

    /// Converts the category to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::ClearOnline => "clear_online",
            Self::ClearOffline => "clear_offline",
            Self::ClearApi => "clear_api",
            Self::Onion => "onion",
            Self::Local => "local",
            Self::Malformed => "malformed",
        }
    }

    /// Parses a category from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "clear_online" => Some(Self::ClearOnline),
            "clear_offline" => Some(Self::ClearOffline),
            "clear_api" => Some(Self::ClearApi),
            "onion" => Some(Self::Onion),
            "local" => Some(Self::Local),
            "malformed" => Some(Self::Malformed),
            _ => None,
        }
    }

    /// Returns all categories
    pub fn all() -> [Self; 6] {
        [
            Self::ClearOnline,
            Self::ClearOffline,
            Self::ClearApi,
            Self::Onion,
            Self::Local,
            Self::Malformed,
        ]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_string())
    }
}
