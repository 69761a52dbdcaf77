//! Relational event providers.
//!
//! - [`TransactionProvider`] serves `<chain>_blockchain` from the chain's
//!   transactions table.
//! - [`LabelProvider`] serves `<chain>_smartcontract` from the chain's
//!   labels table.
//!
//! Both are backend-agnostic and run against any [`ChainStore`].

use std::sync::Arc;

use async_trait::async_trait;

use chainstream_core::error::StreamError;
use chainstream_core::event::{Event, Subscription, UserSubscriptions};
use chainstream_core::filters::{is_evm_address, AddressFilters, LabelFilters, ProviderFilters};
use chainstream_core::provider::{EventProvider, FetchRequest, ProviderInfo};
use chainstream_core::query::StreamQuery;

use crate::chain::Blockchain;
use crate::store::{ChainStore, TableQuery};

/// Widest window a chain-table query may scan (2 hours).
pub const DEFAULT_MAX_WINDOW_SECONDS: i64 = 2 * 60 * 60;

/// Label values the smart-contract provider reads by default.
pub const DEFAULT_CONTRACT_LABELS: [&str; 2] = ["moonworm-event", "moonworm-call"];

fn validate_evm_subscription(event_type: &str, subscription: &Subscription) -> Result<(), StreamError> {
    if subscription.subscription_type_id != event_type {
        return Err(StreamError::Other(format!(
            "subscription type '{}' is not '{event_type}'",
            subscription.subscription_type_id
        )));
    }
    if !is_evm_address(&subscription.address) {
        return Err(StreamError::Other(format!(
            "'{}' is not an EVM address",
            subscription.address
        )));
    }
    Ok(())
}

fn wrong_filters(event_type: &str, filters: &ProviderFilters) -> StreamError {
    StreamError::ContractViolation(format!("{event_type} cannot run {filters:?}"))
}

// ─── TransactionProvider ──────────────────────────────────────────────────────

/// Transactions sent from or to the caller's subscribed addresses.
pub struct TransactionProvider {
    chain: Blockchain,
    event_type: String,
    store: Arc<dyn ChainStore>,
    max_window_seconds: i64,
}

impl TransactionProvider {
    pub fn new(chain: Blockchain, store: Arc<dyn ChainStore>) -> Self {
        Self {
            chain,
            event_type: chain.blockchain_event_type(),
            store,
            max_window_seconds: DEFAULT_MAX_WINDOW_SECONDS,
        }
    }

    pub fn with_max_window(mut self, seconds: i64) -> Self {
        self.max_window_seconds = seconds;
        self
    }

    pub fn chain(&self) -> Blockchain {
        self.chain
    }
}

#[async_trait]
impl EventProvider for TransactionProvider {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            description: format!(
                "Transactions sent from or to subscribed addresses on {}",
                self.chain
            ),
            default_time_interval_seconds: 5 * 60,
            estimated_events_per_time_interval: 50.0,
        }
    }

    fn max_window_seconds(&self) -> i64 {
        self.max_window_seconds
    }

    fn validate_subscription(&self, subscription: &Subscription) -> Result<(), StreamError> {
        validate_evm_subscription(&self.event_type, subscription)
    }

    fn parse_filters(
        &self,
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
    ) -> Option<ProviderFilters> {
        AddressFilters::from_query(&self.event_type, query, subscriptions).map(ProviderFilters::Addresses)
    }

    async fn fetch(&self, request: FetchRequest) -> Result<Vec<Event>, StreamError> {
        let ProviderFilters::Addresses(filters) = &request.filters else {
            return Err(wrong_filters(&self.event_type, &request.filters));
        };
        let rows = self
            .store
            .transactions(TableQuery {
                chain: self.chain,
                boundary: &request.boundary,
                filters,
                order: request.order,
                limit: request.limit,
            })
            .await?;
        Ok(rows.into_iter().map(|r| r.into_event(&self.event_type)).collect())
    }
}

// ─── LabelProvider ────────────────────────────────────────────────────────────

/// Decoded contract events and calls on the caller's subscribed contracts.
pub struct LabelProvider {
    chain: Blockchain,
    event_type: String,
    labels: Vec<String>,
    store: Arc<dyn ChainStore>,
    max_window_seconds: i64,
}

impl LabelProvider {
    pub fn new(chain: Blockchain, store: Arc<dyn ChainStore>) -> Self {
        Self {
            chain,
            event_type: chain.smartcontract_event_type(),
            labels: DEFAULT_CONTRACT_LABELS.iter().map(|l| l.to_string()).collect(),
            store,
            max_window_seconds: DEFAULT_MAX_WINDOW_SECONDS,
        }
    }

    /// Replace the label values this provider reads.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_max_window(mut self, seconds: i64) -> Self {
        self.max_window_seconds = seconds;
        self
    }
}

#[async_trait]
impl EventProvider for LabelProvider {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            description: format!("Decoded smart contract events and calls on {}", self.chain),
            default_time_interval_seconds: 5 * 60,
            estimated_events_per_time_interval: 100.0,
        }
    }

    fn max_window_seconds(&self) -> i64 {
        self.max_window_seconds
    }

    fn validate_subscription(&self, subscription: &Subscription) -> Result<(), StreamError> {
        validate_evm_subscription(&self.event_type, subscription)
    }

    fn parse_filters(
        &self,
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
    ) -> Option<ProviderFilters> {
        LabelFilters::from_query(&self.event_type, &self.labels, query, subscriptions)
            .map(ProviderFilters::Labels)
    }

    async fn fetch(&self, request: FetchRequest) -> Result<Vec<Event>, StreamError> {
        let ProviderFilters::Labels(filters) = &request.filters else {
            return Err(wrong_filters(&self.event_type, &request.filters));
        };
        let rows = self
            .store
            .labels(TableQuery {
                chain: self.chain,
                boundary: &request.boundary,
                filters,
                order: request.order,
                limit: request.limit,
            })
            .await?;
        Ok(rows.into_iter().map(|r| r.into_event(&self.event_type)).collect())
    }
}
