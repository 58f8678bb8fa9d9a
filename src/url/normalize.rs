use std::fmt;

/// Normalizes a relay URL according to Relay-Atlas's identity rules
///
/// # Normalization Steps
///
/// 1. Lowercase the whole string
/// 2. Remove every trailing slash
///
/// Normalization never fails. Strings that are not URLs at all are still
/// normalized so they can be recorded (and classified as malformed).
/// Surrounding whitespace is kept, so a padded URL stays distinct from the
/// clean one and classifies as malformed.
///
/// # Examples
///
/// ```
/// use relay_atlas::url::normalize_relay_url;
///
/// assert_eq!(normalize_relay_url("wss://Relay.Example.COM/"), "wss://relay.example.com");
/// assert_eq!(normalize_relay_url("wss://nos.lol//"), "wss://nos.lol");
/// ```
pub fn normalize_relay_url(raw: &str) -> String {
    raw.to_lowercase().trim_end_matches('/').to_string()
}

/// A normalized relay endpoint identifier
///
/// Two `RelayUrl`s are equal when their normalized strings are equal, so
/// `wss://Nos.lol/` and `wss://nos.lol` name the same relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelayUrl(String);

impl RelayUrl {
    /// Builds a relay URL from raw input, normalizing it
    pub fn new(raw: &str) -> Self {
        Self(normalize_relay_url(raw))
    }

    /// Returns the normalized string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for `wss://` endpoints
    pub fn is_secure(&self) -> bool {
        self.0.starts_with("wss://")
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelayUrl {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl AsRef<str> for RelayUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
