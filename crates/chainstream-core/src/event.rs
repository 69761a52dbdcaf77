//! Events and the subscriptions that scope them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─── Event ────────────────────────────────────────────────────────────────────

/// A single event emitted by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The provider's event type tag (e.g. `"ethereum_blockchain"`).
    pub event_type: String,
    /// Unix timestamp (seconds since epoch).
    pub event_timestamp: i64,
    /// Source-specific payload.
    pub event_data: Map<String, Value>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, event_timestamp: i64, event_data: Map<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            event_timestamp,
            event_data,
        }
    }
}

// ─── Subscription ─────────────────────────────────────────────────────────────

/// A caller's registered interest in one address under one event type.
///
/// Owned by the resource service; the stream layer only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Resource identifier in the resource service.
    #[serde(default)]
    pub id: String,
    /// The event type this subscription belongs to.
    pub subscription_type_id: String,
    pub address: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Whether an ABI is attached to the subscription.
    #[serde(default)]
    pub abi: bool,
}

impl Subscription {
    pub fn new(subscription_type_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            subscription_type_id: subscription_type_id.into(),
            address: address.into(),
            label: None,
            color: None,
            abi: false,
        }
    }
}

/// A caller's subscriptions grouped by event type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserSubscriptions {
    by_type: HashMap<String, Vec<Subscription>>,
}

impl UserSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription under its own `subscription_type_id`.
    pub fn insert(&mut self, subscription: Subscription) {
        self.by_type
            .entry(subscription.subscription_type_id.clone())
            .or_default()
            .push(subscription);
    }

    /// Subscriptions of one event type (empty if none).
    pub fn of_type(&self, event_type: &str) -> &[Subscription] {
        self.by_type.get(event_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns `true` if the caller has any subscription of `event_type`.
    pub fn has_type(&self, event_type: &str) -> bool {
        !self.of_type(event_type).is_empty()
    }

    /// Subscribed addresses of one event type, in subscription order, without duplicates.
    pub fn addresses(&self, event_type: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for sub in self.of_type(event_type) {
            if !out.iter().any(|a| a.eq_ignore_ascii_case(&sub.address)) {
                out.push(sub.address.clone());
            }
        }
        out
    }

    /// Keep only subscriptions accepted by `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&Subscription) -> bool) {
        for subs in self.by_type.values_mut() {
            subs.retain(|s| keep(s));
        }
        self.by_type.retain(|_, subs| !subs.is_empty());
    }

    /// Total number of subscriptions across all types.
    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Subscription> for UserSubscriptions {
    fn from_iter<I: IntoIterator<Item = Subscription>>(iter: I) -> Self {
        let mut subs = Self::new();
        for s in iter {
            subs.insert(s);
        }
        subs
    }
}
