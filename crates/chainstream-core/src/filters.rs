//! Provider filter shapes.
//!
//! Every provider turns a [`StreamQuery`] plus the caller's subscriptions
//! into one of the closed set of [`ProviderFilters`]. Filters only ever
//! narrow the caller's own subscriptions: a query token naming an address
//! the caller does not subscribe to is dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::event::UserSubscriptions;
use crate::query::StreamQuery;

/// Filters understood by the provider variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderFilters {
    /// Transaction-table filter (from / to / label disjunction).
    Addresses(AddressFilters),
    /// Label-table filter (contract addresses + label values + names).
    Labels(LabelFilters),
    /// Journal tag filter.
    Tags(TagFilters),
}

// ─── AddressFilters ───────────────────────────────────────────────────────────

/// `from_address IN from OR to_address IN to OR label IN labels`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFilters {
    pub from_addresses: Vec<String>,
    pub to_addresses: Vec<String>,
    pub labels: Vec<String>,
    /// Every address the caller subscribes to under this event type.
    /// Label matches are restricted to these addresses.
    pub subscribed: Vec<String>,
}

impl AddressFilters {
    /// Build address filters for `event_type`.
    ///
    /// Returns `None` when the provider is not implicated: the query names
    /// other types, or the caller has no subscriptions of this type.
    pub fn from_query(
        event_type: &str,
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
    ) -> Option<Self> {
        if !query.wants(event_type) {
            return None;
        }
        let subscribed = subscriptions.addresses(event_type);
        if subscribed.is_empty() {
            return None;
        }

        let mut narrowed = AddressFilters {
            subscribed: subscribed.clone(),
            ..Default::default()
        };
        let mut narrowing = false;

        for raw in query.filters_for(event_type) {
            narrowing = true;
            let (direction, value) = match raw.split_once(':') {
                None => (Direction::Both, raw),
                Some(("from", v)) => (Direction::From, v),
                Some(("to", v)) => (Direction::To, v),
                Some(("label", v)) => {
                    push_unique(&mut narrowed.labels, v);
                    continue;
                }
                Some(_) => {
                    warn!(event_type, filter = raw, "ignoring unrecognised sub filter");
                    continue;
                }
            };

            let Some(address) = subscribed.iter().find(|a| a.eq_ignore_ascii_case(value)) else {
                warn!(event_type, address = value, "ignoring sub filter for unsubscribed address");
                continue;
            };

            if matches!(direction, Direction::From | Direction::Both) {
                push_unique(&mut narrowed.from_addresses, address);
            }
            if matches!(direction, Direction::To | Direction::Both) {
                push_unique(&mut narrowed.to_addresses, address);
            }
        }

        if narrowing {
            return Some(narrowed);
        }

        Some(AddressFilters {
            from_addresses: subscribed.clone(),
            to_addresses: subscribed.clone(),
            labels: Vec::new(),
            subscribed,
        })
    }

    /// Returns `true` if no disjunct can match anything.
    pub fn is_empty(&self) -> bool {
        self.from_addresses.is_empty() && self.to_addresses.is_empty() && self.labels.is_empty()
    }

    /// Every address named in either direction, without duplicates.
    pub fn all_addresses(&self) -> Vec<String> {
        let mut out = self.from_addresses.clone();
        for a in &self.to_addresses {
            push_unique(&mut out, a);
        }
        out
    }
}

enum Direction {
    From,
    To,
    Both,
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        list.push(value.to_string());
    }
}

// ─── LabelFilters ─────────────────────────────────────────────────────────────

/// Label-table filter: rows whose `address` is one of `addresses`, whose
/// `label` is one of `labels`, and (when `names` is non-empty) whose
/// `label_data.name` is one of `names`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFilters {
    pub addresses: Vec<String>,
    pub labels: Vec<String>,
    pub names: Vec<String>,
}

impl LabelFilters {
    /// Build label filters for `event_type`, restricted to `labels`.
    ///
    /// `sub:<type>:label:<x>` tokens narrow `labels` to the named values
    /// without narrowing the addresses. A named label outside `labels` is
    /// dropped.
    pub fn from_query(
        event_type: &str,
        labels: &[String],
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
    ) -> Option<Self> {
        let filters = AddressFilters::from_query(event_type, query, subscriptions)?;

        let narrows_addresses = query
            .filters_for(event_type)
            .any(|raw| !raw.starts_with("label:"));
        let addresses = if narrows_addresses {
            filters.all_addresses()
        } else {
            filters.subscribed.clone()
        };

        let labels = if filters.labels.is_empty() {
            labels.to_vec()
        } else {
            for named in &filters.labels {
                if !labels.iter().any(|l| l.eq_ignore_ascii_case(named)) {
                    warn!(event_type, label = %named, "ignoring sub filter for unserved label");
                }
            }
            labels
                .iter()
                .filter(|l| filters.labels.iter().any(|named| named.eq_ignore_ascii_case(l)))
                .cloned()
                .collect()
        };

        Some(LabelFilters {
            addresses,
            labels,
            names: event_names(query),
        })
    }
}

/// Event/call names requested through `event:{"name": …}` payloads.
fn event_names(query: &StreamQuery) -> Vec<String> {
    let Some(filters) = &query.event_filters else {
        return Vec::new();
    };
    match filters.get("name") {
        Some(Value::String(name)) => vec![name.clone()],
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(|n| n.as_str().map(str::to_string))
            .collect(),
        Some(other) => {
            warn!(value = %other, "ignoring non-string event name filter");
            Vec::new()
        }
        None => Vec::new(),
    }
}

// ─── TagFilters ───────────────────────────────────────────────────────────────

/// Journal tag query: every `required` tag and at least one `optional` tag
/// (when any are given).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilters {
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

/// Returns `true` if `address` looks like an EVM address (`0x` + 40 hex digits).
pub fn is_evm_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
