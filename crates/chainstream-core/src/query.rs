//! The stream query language.
//!
//! Queries arrive as free text in a URL parameter, so parsing is permissive:
//! a malformed token is logged and dropped, never fatal.
//!
//! ```text
//! type:ethereum_blockchain type:ethereum_txpool
//! sub:ethereum_blockchain:from:0xabc… sub:ethereum_txpool:0xdef…
//! event:{"name":"Transfer"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

const TYPE_PREFIX: &str = "type:";
const SUB_PREFIX: &str = "sub:";
const EVENT_PREFIX: &str = "event:";

/// Parsed filter criteria for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamQuery {
    /// Requested provider event types. Empty means every provider.
    pub subscription_types: Vec<String>,
    /// `(event_type, raw_filter)` pairs narrowing a provider to specific addresses.
    pub subscriptions: Vec<(String, String)>,
    /// Structured secondary filter for label-table providers.
    pub event_filters: Option<Map<String, Value>>,
}

impl StreamQuery {
    /// Parse a whitespace-separated query string.
    pub fn parse(text: &str) -> Self {
        let mut query = StreamQuery::default();

        for token in text.split_whitespace() {
            if let Some(event_type) = token.strip_prefix(TYPE_PREFIX) {
                query.push_type(event_type);
            } else if let Some(rest) = token.strip_prefix(SUB_PREFIX) {
                query.push_subscription(token, rest);
            } else if let Some(payload) = token.strip_prefix(EVENT_PREFIX) {
                query.push_event_filter(token, payload);
            } else {
                warn!(token, "ignoring query token with unknown prefix");
            }
        }

        query
    }

    fn push_type(&mut self, event_type: &str) {
        if event_type.is_empty() {
            warn!("ignoring empty type: token");
            return;
        }
        if !self.subscription_types.iter().any(|t| t == event_type) {
            self.subscription_types.push(event_type.to_string());
        }
    }

    fn push_subscription(&mut self, token: &str, rest: &str) {
        let segments: Vec<&str> = rest.split(':').collect();
        if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
            warn!(token, "ignoring malformed sub: token");
            return;
        }
        self.subscriptions
            .push((segments[0].to_string(), segments[1..].join(":")));
    }

    fn push_event_filter(&mut self, token: &str, payload: &str) {
        match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(map)) => {
                self.event_filters.get_or_insert_with(Map::new).extend(map);
            }
            Ok(_) => warn!(token, "ignoring event: token, payload is not a JSON object"),
            Err(e) => warn!(token, error = %e, "ignoring event: token with invalid JSON"),
        }
    }

    /// Returns `true` if a provider of `event_type` is in scope for this query.
    pub fn wants(&self, event_type: &str) -> bool {
        self.subscription_types.is_empty() || self.subscription_types.iter().any(|t| t == event_type)
    }

    /// Raw filters from `sub:` tokens that name `event_type`.
    pub fn filters_for<'a>(&'a self, event_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.subscriptions
            .iter()
            .filter(move |(t, _)| t == event_type)
            .map(|(_, f)| f.as_str())
    }
}
