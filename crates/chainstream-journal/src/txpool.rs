//! `TxpoolProvider`: pending transactions seen by the mempool crawler.
//!
//! The crawler writes one journal entry per pending transaction, tagged with
//! its client tag plus `from_address:<a>` and `to_address:<a>`. Address
//! filters become optional tags, so an entry matches when either side is a
//! subscribed address.

use std::sync::Arc;

use async_trait::async_trait;

use chainstream_core::error::StreamError;
use chainstream_core::event::{Event, Subscription, UserSubscriptions};
use chainstream_core::filters::{is_evm_address, AddressFilters, ProviderFilters, TagFilters};
use chainstream_core::provider::{EventProvider, FetchRequest, ProviderInfo};
use chainstream_core::query::StreamQuery;

use crate::client::JournalSearch;
use crate::provider::{JournalProvider, JournalProviderConfig};

pub const TXPOOL_EVENT_TYPE: &str = "ethereum_txpool";
pub const TXPOOL_CLIENT_TAG: &str = "client:ethereum-txpool-crawler-0";
/// Mempool queries are limited to 5 second windows.
pub const TXPOOL_MAX_WINDOW_SECONDS: i64 = 5;

impl JournalProviderConfig {
    /// Configuration of the Ethereum mempool feed.
    pub fn txpool(journal_id: impl Into<String>, token: impl Into<String>) -> Self {
        JournalProviderConfig::new(TXPOOL_EVENT_TYPE, journal_id, token)
            .with_tags([TXPOOL_CLIENT_TAG])
            .with_description("Transactions that have been submitted into the Ethereum transaction pool but not necessarily mined yet")
            .with_max_window(TXPOOL_MAX_WINDOW_SECONDS)
    }
}

/// Mempool feed filtered by the caller's subscribed addresses.
pub struct TxpoolProvider {
    inner: JournalProvider,
}

impl TxpoolProvider {
    pub fn new(config: JournalProviderConfig, client: Arc<dyn JournalSearch>) -> Self {
        Self {
            inner: JournalProvider::new(config, client),
        }
    }
}

/// Turn address filters into the crawler's address tags.
pub fn address_tags(filters: &AddressFilters) -> Vec<String> {
    filters
        .from_addresses
        .iter()
        .map(|a| format!("from_address:{a}"))
        .chain(filters.to_addresses.iter().map(|a| format!("to_address:{a}")))
        .collect()
}

#[async_trait]
impl EventProvider for TxpoolProvider {
    fn event_type(&self) -> &str {
        self.inner.event_type()
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            default_time_interval_seconds: TXPOOL_MAX_WINDOW_SECONDS,
            estimated_events_per_time_interval: 50.0,
            ..self.inner.info()
        }
    }

    fn max_window_seconds(&self) -> i64 {
        self.inner.max_window_seconds()
    }

    fn validate_subscription(&self, subscription: &Subscription) -> Result<(), StreamError> {
        self.inner.validate_subscription(subscription)?;
        if !is_evm_address(&subscription.address) {
            return Err(StreamError::Other(format!(
                "'{}' is not an EVM address",
                subscription.address
            )));
        }
        Ok(())
    }

    fn parse_filters(
        &self,
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
    ) -> Option<ProviderFilters> {
        let addresses = AddressFilters::from_query(self.event_type(), query, subscriptions)?;
        Some(ProviderFilters::Tags(TagFilters {
            required: self.inner.config().tags.clone(),
            optional: address_tags(&addresses),
        }))
    }

    async fn fetch(&self, request: FetchRequest) -> Result<Vec<Event>, StreamError> {
        let ProviderFilters::Tags(tags) = &request.filters else {
            return Err(StreamError::ContractViolation(format!(
                "{} cannot run {:?}",
                self.event_type(),
                request.filters
            )));
        };
        // No address tags means every narrowing token was dropped.
        if tags.optional.is_empty() {
            return Ok(Vec::new());
        }
        self.inner.fetch_tagged(tags, &request).await
    }
}
