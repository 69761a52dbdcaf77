//! Provider registry — event type → provider, built once at startup.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::error::StreamError;
use crate::event::UserSubscriptions;
use crate::provider::{EventProvider, ProviderInfo};
use crate::query::StreamQuery;

/// Immutable mapping of event type to provider.
///
/// Registration order is dispatch order; the aggregator relies on it to
/// break timestamp ties deterministically.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: IndexMap<String, Arc<dyn EventProvider>>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get(&self, event_type: &str) -> Option<&Arc<dyn EventProvider>> {
        self.providers.get(event_type)
    }

    /// Registered event types in dispatch order.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Providers whose event type the query asks for (all when it names none).
    pub fn in_scope(&self, query: &StreamQuery) -> Vec<Arc<dyn EventProvider>> {
        self.providers
            .iter()
            .filter(|(event_type, _)| query.wants(event_type))
            .map(|(_, p)| Arc::clone(p))
            .collect()
    }

    /// Static metadata for every provider.
    pub fn info(&self) -> IndexMap<String, ProviderInfo> {
        self.providers
            .iter()
            .map(|(event_type, p)| (event_type.clone(), p.info()))
            .collect()
    }

    /// Drop subscriptions that no registered provider accepts.
    pub fn retain_valid(&self, subscriptions: &mut UserSubscriptions) {
        subscriptions.retain(|sub| match self.providers.get(&sub.subscription_type_id) {
            None => {
                warn!(
                    subscription_type = %sub.subscription_type_id,
                    "dropping subscription with no provider"
                );
                false
            }
            Some(provider) => match provider.validate_subscription(sub) {
                Ok(()) => true,
                Err(e) => {
                    warn!(id = %sub.id, error = %e, "dropping invalid subscription");
                    false
                }
            },
        });
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}

/// Collects providers before freezing them into a [`ProviderRegistry`].
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: IndexMap<String, Arc<dyn EventProvider>>,
}

impl ProviderRegistryBuilder {
    /// Register a provider under its own event type.
    ///
    /// Fails if another provider already serves that event type.
    pub fn register(mut self, provider: Arc<dyn EventProvider>) -> Result<Self, StreamError> {
        let event_type = provider.event_type().to_string();
        if self.providers.contains_key(&event_type) {
            return Err(StreamError::Other(format!(
                "duplicate provider for event type '{event_type}'"
            )));
        }
        self.providers.insert(event_type, provider);
        Ok(self)
    }

    pub fn build(self) -> ProviderRegistry {
        info!(
            providers = ?self.providers.keys().collect::<Vec<_>>(),
            "provider registry built"
        );
        ProviderRegistry {
            providers: self.providers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, Subscription};
    use crate::filters::ProviderFilters;
    use crate::provider::FetchRequest;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl EventProvider for Named {
        fn event_type(&self) -> &str {
            self.0
        }
        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                description: format!("{} events", self.0),
                default_time_interval_seconds: 300,
                estimated_events_per_time_interval: 10.0,
            }
        }
        fn max_window_seconds(&self) -> i64 {
            60
        }
        fn validate_subscription(&self, s: &Subscription) -> Result<(), StreamError> {
            if s.address.is_empty() {
                return Err(StreamError::Other("empty address".into()));
            }
            Ok(())
        }
        fn parse_filters(&self, _q: &StreamQuery, _s: &UserSubscriptions) -> Option<ProviderFilters> {
            None
        }
        async fn fetch(&self, _r: FetchRequest) -> Result<Vec<Event>, StreamError> {
            Ok(vec![])
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::builder()
            .register(Arc::new(Named("ethereum_blockchain")))
            .unwrap()
            .register(Arc::new(Named("ethereum_txpool")))
            .unwrap()
            .register(Arc::new(Named("polygon_blockchain")))
            .unwrap()
            .build()
    }

    #[test]
    fn duplicate_registration_fails() {
        let result = ProviderRegistry::builder()
            .register(Arc::new(Named("a")))
            .unwrap()
            .register(Arc::new(Named("a")));
        assert!(result.is_err());
    }

    #[test]
    fn in_scope_follows_query_types() {
        let reg = registry();
        assert_eq!(reg.in_scope(&StreamQuery::default()).len(), 3);

        let scoped = reg.in_scope(&StreamQuery::parse("type:polygon_blockchain type:unknown"));
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].event_type(), "polygon_blockchain");
    }

    #[test]
    fn info_keeps_registration_order() {
        let info = registry().info();
        let keys: Vec<_> = info.keys().cloned().collect();
        assert_eq!(keys, vec!["ethereum_blockchain", "ethereum_txpool", "polygon_blockchain"]);
        assert_eq!(info["ethereum_txpool"].default_time_interval_seconds, 300);
    }

    #[test]
    fn retain_valid_drops_unknown_and_rejected() {
        let mut subs: UserSubscriptions = [
            Subscription::new("ethereum_blockchain", "0x1"),
            Subscription::new("ethereum_blockchain", ""),
            Subscription::new("solana_blockchain", "abc"),
        ]
        .into_iter()
        .collect();
        registry().retain_valid(&mut subs);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs.of_type("ethereum_blockchain")[0].address, "0x1");
    }
}
