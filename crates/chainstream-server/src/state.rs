//! Shared handler state, and building it from configuration.

use std::sync::Arc;

use tracing::info;

use chainstream_core::aggregator::{EventAggregator, FanOutOptions};
use chainstream_core::event::UserSubscriptions;
use chainstream_core::provider::EventProvider;
use chainstream_core::registry::ProviderRegistry;
use chainstream_journal::{
    JournalClient, JournalProvider, JournalProviderConfig, JournalSearch, ResourceSubscriptions,
    StaticSubscriptions, SubscriptionSource, TxpoolProvider,
};
use chainstream_storage::postgres::PostgresChainStore;
use chainstream_storage::sqlite::SqliteChainStore;
use chainstream_storage::{Blockchain, ChainStore, LabelProvider, TransactionProvider};

use crate::config::{ProviderSpec, ServerConfig, StorageConfig, SubscriptionsConfig};
use crate::error::SetupError;

/// Everything a handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<EventAggregator>,
    pub subscriptions: Arc<dyn SubscriptionSource>,
    pub options: FanOutOptions,
}

impl AppState {
    pub fn new(
        aggregator: Arc<EventAggregator>,
        subscriptions: Arc<dyn SubscriptionSource>,
        options: FanOutOptions,
    ) -> Self {
        Self {
            aggregator,
            subscriptions,
            options,
        }
    }

    /// Connect backends and register every configured provider.
    pub async fn build(config: &ServerConfig) -> Result<Self, SetupError> {
        let journal: Arc<dyn JournalSearch> = Arc::new(JournalClient::new(config.journal.clone())?);
        let store = match &config.storage {
            Some(storage) => Some(open_store(storage).await?),
            None => None,
        };

        let mut builder = ProviderRegistry::builder();
        for spec in &config.providers {
            builder = builder.register(provider(spec, store.as_ref(), &journal)?)?;
        }
        let registry = Arc::new(builder.build());

        let subscriptions: Arc<dyn SubscriptionSource> = match &config.subscriptions {
            SubscriptionsConfig::Resources => {
                Arc::new(ResourceSubscriptions::new(journal).with_registry(registry.clone()))
            }
            SubscriptionsConfig::Static { subscriptions } => {
                let mut subscriptions: UserSubscriptions = subscriptions.iter().cloned().collect();
                registry.retain_valid(&mut subscriptions);
                Arc::new(StaticSubscriptions::new(subscriptions))
            }
        };

        info!(
            providers = ?registry.event_types().collect::<Vec<_>>(),
            "stream providers ready"
        );
        Ok(Self::new(
            Arc::new(EventAggregator::new(registry)),
            subscriptions,
            config.fan_out.clone(),
        ))
    }
}

async fn open_store(storage: &StorageConfig) -> Result<Arc<dyn ChainStore>, SetupError> {
    let store: Arc<dyn ChainStore> = match storage {
        StorageConfig::Sqlite { path, options } => {
            Arc::new(SqliteChainStore::open_with_options(path, options.clone()).await?)
        }
        StorageConfig::Postgres { url, options } => {
            Arc::new(PostgresChainStore::connect_with_options(url, options.clone()).await?)
        }
    };
    Ok(store)
}

fn provider(
    spec: &ProviderSpec,
    store: Option<&Arc<dyn ChainStore>>,
    journal: &Arc<dyn JournalSearch>,
) -> Result<Arc<dyn EventProvider>, SetupError> {
    let relational = |chain: Blockchain| {
        store.cloned().ok_or_else(|| {
            SetupError::Config(format!("{chain} providers need a storage backend"))
        })
    };

    let provider: Arc<dyn EventProvider> = match spec {
        ProviderSpec::Transactions {
            chain,
            max_window_seconds,
        } => {
            let mut p = TransactionProvider::new(*chain, relational(*chain)?);
            if let Some(seconds) = max_window_seconds {
                p = p.with_max_window(*seconds);
            }
            Arc::new(p)
        }
        ProviderSpec::Labels {
            chain,
            labels,
            max_window_seconds,
        } => {
            let mut p = LabelProvider::new(*chain, relational(*chain)?);
            if let Some(labels) = labels {
                p = p.with_labels(labels.clone());
            }
            if let Some(seconds) = max_window_seconds {
                p = p.with_max_window(*seconds);
            }
            Arc::new(p)
        }
        ProviderSpec::Txpool { journal_id, token } => Arc::new(TxpoolProvider::new(
            JournalProviderConfig::txpool(journal_id.clone(), token.clone()),
            journal.clone(),
        )),
        ProviderSpec::Journal(config) => Arc::new(JournalProvider::new(config.clone(), journal.clone())),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_registry_in_config_order() {
        let config = ServerConfig::from_yaml(
            r#"
storage:
  backend: sqlite
  path: "sqlite::memory:"
subscriptions:
  source: static
  subscriptions:
    - subscription_type_id: ethereum_blockchain
      address: "0x1111111111111111111111111111111111111111"
    - subscription_type_id: ethereum_blockchain
      address: not-an-address
providers:
  - kind: transactions
    chain: ethereum
  - kind: labels
    chain: ethereum
  - kind: txpool
    journal_id: mempool
    token: svc
"#,
        )
        .unwrap();

        let state = AppState::build(&config).await.unwrap();
        let types: Vec<&str> = state.aggregator.registry().event_types().collect();
        assert_eq!(types, vec!["ethereum_blockchain", "ethereum_smartcontract", "ethereum_txpool"]);

        let subs = state.subscriptions.subscriptions("anyone").await.unwrap();
        assert_eq!(subs.len(), 1);
    }

    #[tokio::test]
    async fn relational_provider_without_storage_is_rejected() {
        let config = ServerConfig::from_yaml("providers:\n  - kind: transactions\n    chain: polygon\n").unwrap();
        let err = AppState::build(&config).await.err().unwrap();
        assert!(matches!(err, SetupError::Config(ref m) if m.contains("polygon")));
    }

    #[tokio::test]
    async fn duplicate_event_types_are_rejected() {
        let config = ServerConfig::from_yaml(
            "providers:\n  - {kind: txpool, journal_id: a, token: t}\n  - {kind: txpool, journal_id: b, token: t}\n",
        )
        .unwrap();
        assert!(matches!(AppState::build(&config).await, Err(SetupError::Stream(_))));
    }
}
