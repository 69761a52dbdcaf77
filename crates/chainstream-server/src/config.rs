//! Server configuration, loaded from YAML.
//!
//! ```yaml
//! bind: 0.0.0.0:7481
//! log: { level: info, json: true }
//! fan_out: { result_timeout_ms: 10000, raise_on_error: false }
//! storage: { backend: postgres, url: postgresql://localhost/chain }
//! journal: { base_url: https://journal.internal }
//! providers:
//!   - { kind: transactions, chain: ethereum }
//!   - { kind: labels, chain: polygon }
//!   - { kind: txpool, journal_id: 4b2a…, token: svc-token }
//!   - { kind: journal, event_type: ethereum_whalewatch, journal_id: 9c1e…,
//!       token: svc-token, tags: ["crawl_type:ethereum_trending"] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use chainstream_core::aggregator::FanOutOptions;
use chainstream_core::event::Subscription;
use chainstream_journal::{JournalClientConfig, JournalProviderConfig};
use chainstream_storage::postgres::PostgresOptions;
use chainstream_storage::sqlite::SqliteOptions;
use chainstream_storage::Blockchain;

use crate::error::SetupError;
use crate::logging::LogConfig;

/// Top-level configuration of the `chainstream` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
    pub log: LogConfig,
    pub fan_out: FanOutOptions,
    /// Relational backend; required by `transactions` and `labels` providers.
    pub storage: Option<StorageConfig>,
    /// Journal / resource service.
    pub journal: JournalClientConfig,
    pub subscriptions: SubscriptionsConfig,
    /// Providers in dispatch order.
    pub providers: Vec<ProviderSpec>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7481".to_string(),
            log: LogConfig::default(),
            fan_out: FanOutOptions::default(),
            storage: None,
            journal: JournalClientConfig::default(),
            subscriptions: SubscriptionsConfig::default(),
            providers: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Read a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SetupError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, SetupError> {
        serde_yaml::from_str(text).map_err(|e| SetupError::Config(e.to_string()))
    }
}

/// Relational backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    Sqlite {
        /// File path or `sqlite:` URL.
        path: String,
        #[serde(default)]
        options: SqliteOptions,
    },
    Postgres {
        url: String,
        #[serde(default)]
        options: PostgresOptions,
    },
}

/// Where callers' subscriptions are read from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SubscriptionsConfig {
    /// `type=subscription` resources of the caller's token.
    #[default]
    Resources,
    /// The same fixed list for every caller (local development).
    Static { subscriptions: Vec<Subscription> },
}

/// One provider to register.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderSpec {
    /// `<chain>_blockchain` from the transactions table.
    Transactions {
        chain: Blockchain,
        #[serde(default)]
        max_window_seconds: Option<i64>,
    },
    /// `<chain>_smartcontract` from the labels table.
    Labels {
        chain: Blockchain,
        #[serde(default)]
        labels: Option<Vec<String>>,
        #[serde(default)]
        max_window_seconds: Option<i64>,
    },
    /// The Ethereum mempool journal.
    Txpool { journal_id: String, token: String },
    /// Any other tagged journal feed.
    Journal(JournalProviderConfig),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainstream_core::aggregator::LatestLimit;

    #[test]
    fn parses_full_config() {
        let config = ServerConfig::from_yaml(
            r#"
bind: 0.0.0.0:9000
log:
  level: debug
  json: true
fan_out:
  result_timeout_ms: 2500
  raise_on_error: true
  latest_limit: global
storage:
  backend: sqlite
  path: ./chain.db
  options:
    max_connections: 2
journal:
  base_url: http://journal:7191
providers:
  - kind: transactions
    chain: ethereum
  - kind: labels
    chain: polygon
    labels: [moonworm-event]
  - kind: txpool
    journal_id: mempool
    token: svc
  - kind: journal
    event_type: ethereum_whalewatch
    journal_id: whales
    token: svc
    tags: ["crawl_type:ethereum_trending"]
"#,
        )
        .unwrap();

        assert_eq!(config.bind, "0.0.0.0:9000");
        assert!(config.log.json);
        assert_eq!(config.fan_out.result_timeout_ms, 2500);
        assert!(config.fan_out.raise_on_error);
        assert!(config.fan_out.sort_events);
        assert_eq!(config.fan_out.latest_limit, LatestLimit::Global);
        assert!(matches!(
            config.storage,
            Some(StorageConfig::Sqlite { ref options, .. }) if options.max_connections == 2
        ));
        assert_eq!(config.journal.retry.max_retries, 2);
        assert!(matches!(config.subscriptions, SubscriptionsConfig::Resources));
        assert_eq!(config.providers.len(), 4);
        assert!(matches!(
            config.providers[0],
            ProviderSpec::Transactions { chain: Blockchain::Ethereum, max_window_seconds: None }
        ));
        let ProviderSpec::Journal(journal) = &config.providers[3] else {
            panic!("expected a journal provider");
        };
        assert_eq!(journal.max_window_seconds, 7200);
        assert_eq!(journal.tags, vec!["crawl_type:ethereum_trending"]);
    }

    #[test]
    fn empty_document_is_default() {
        let config = ServerConfig::from_yaml("{}").unwrap();
        assert_eq!(config.bind, "127.0.0.1:7481");
        assert!(config.providers.is_empty());
        assert!(config.storage.is_none());
    }

    #[test]
    fn static_subscriptions() {
        let config = ServerConfig::from_yaml(
            r#"
subscriptions:
  source: static
  subscriptions:
    - subscription_type_id: ethereum_blockchain
      address: "0x1111111111111111111111111111111111111111"
"#,
        )
        .unwrap();
        let SubscriptionsConfig::Static { subscriptions } = config.subscriptions else {
            panic!("expected static subscriptions");
        };
        assert_eq!(subscriptions[0].subscription_type_id, "ethereum_blockchain");
    }

    #[test]
    fn unknown_provider_kind_is_rejected() {
        let err = ServerConfig::from_yaml("providers:\n  - kind: bitcoin\n").unwrap_err();
        assert!(matches!(err, SetupError::Config(_)));
    }
}
