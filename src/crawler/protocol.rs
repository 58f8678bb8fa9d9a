//! Nostr relay wire messages
//!
//! Only the handful of messages the crawler needs are understood:
//! - `["REQ", <sub>, <filter>]` is built for the relay-list query
//! - `["EVENT", <sub>, <event>]` yields the event's `r` tags
//! - `["EOSE", <sub>]` and `["CLOSED", <sub>, <msg>]` end the subscription
//! - `["NOTICE", <msg>]` is surfaced for logging
//!
//! Anything else is reported as [`RelayMessage::Other`] and ignored by the
//! fetcher.

use crate::{FetchError, FetchResult};
use serde_json::{json, Value};

/// Event kind of relay-list metadata (NIP-65)
pub const RELAY_LIST_KIND: u64 = 10002;

/// Subscription id used for every query
pub const SUBSCRIPTION_ID: &str = "relay-atlas";

/// Tag name that carries a relay URL
const RELAY_TAG: &str = "r";

/// A decoded relay-to-client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Event {
        subscription_id: String,
        relay_urls: Vec<String>,
    },
    EndOfStoredEvents {
        subscription_id: String,
    },
    Closed {
        subscription_id: String,
        message: String,
    },
    Notice(String),
    Other(String),
}

impl RelayMessage {
    /// Returns true if this message ends the given subscription
    pub fn ends_subscription(&self, subscription: &str) -> bool {
        match self {
            Self::EndOfStoredEvents { subscription_id }
            | Self::Closed {
                subscription_id, ..
            } => subscription_id == subscription,
            _ => false,
        }
    }
}

/// Builds the relay-list subscription request
///
/// # Example
///
/// ```
/// use relay_atlas::crawler::build_request;
///
/// let req = build_request("relay-atlas", 100);
/// assert_eq!(req, r#"["REQ","relay-atlas",{"kinds":[10002],"limit":100}]"#);
/// ```
pub fn build_request(subscription_id: &str, limit: u32) -> String {
    json!([
        "REQ",
        subscription_id,
        { "kinds": [RELAY_LIST_KIND], "limit": limit }
    ])
    .to_string()
}

/// Builds the request that closes a subscription
pub fn build_close(subscription_id: &str) -> String {
    json!(["CLOSE", subscription_id]).to_string()
}

/// Decodes one text frame
///
/// Returns [`FetchError::Decode`] if the frame is not a JSON array with a
/// string label, or if an `EVENT` carries no event object.
pub fn parse_message(text: &str) -> FetchResult<RelayMessage> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| FetchError::Decode(e.to_string()))?;

    let items = value
        .as_array()
        .ok_or_else(|| FetchError::Decode("message is not an array".to_string()))?;

    let label = items
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::Decode("message has no label".to_string()))?;

    let string_at = |index: usize| {
        items
            .get(index)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let message = match label {
        "EVENT" => {
            let event = items
                .get(2)
                .filter(|event| event.is_object())
                .ok_or_else(|| FetchError::Decode("EVENT without event object".to_string()))?;
            RelayMessage::Event {
                subscription_id: string_at(1),
                relay_urls: extract_relay_tags(event),
            }
        }
        "EOSE" => RelayMessage::EndOfStoredEvents {
            subscription_id: string_at(1),
        },
        "CLOSED" => RelayMessage::Closed {
            subscription_id: string_at(1),
            message: string_at(2),
        },
        "NOTICE" => RelayMessage::Notice(string_at(1)),
        other => RelayMessage::Other(other.to_string()),
    };

    Ok(message)
}

/// Collects the URL of every `["r", <url>, ...]` tag of an event
///
/// Tags of any other shape are skipped. URLs are returned raw; the registry
/// normalizes and classifies them.
pub fn extract_relay_tags(event: &Value) -> Vec<String> {
    let Some(tags) = event.get("tags").and_then(Value::as_array) else {
        return Vec::new();
    };

    tags.iter()
        .filter_map(Value::as_array)
        .filter(|tag| tag.first().and_then(Value::as_str) == Some(RELAY_TAG))
        .filter_map(|tag| tag.get(1).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}
