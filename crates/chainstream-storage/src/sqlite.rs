//! SQLite chain store.
//!
//! Reads `<chain>_transactions` and `<chain>_labels` through a `sqlx`
//! connection pool. Every query runs under its own timeout.
//!
//! # Usage
//! ```rust,no_run
//! use chainstream_storage::sqlite::SqliteChainStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed
//! let store = SqliteChainStore::open("./chain.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteChainStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use chainstream_core::error::StreamError;
use chainstream_core::filters::{AddressFilters, LabelFilters};

use crate::chain::Blockchain;
use crate::rows::{LabelRow, TransactionRow};
use crate::sql::{self, Dialect, Param, SqlQuery};
use crate::store::{ChainStore, TableQuery};

/// Connection options for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteOptions {
    /// Maximum number of pooled connections (default: 5)
    pub max_connections: u32,
    /// Per-query timeout in milliseconds (default: 5000)
    pub query_timeout_ms: u64,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            query_timeout_ms: 5_000,
        }
    }
}

/// SQLite-backed transactions and labels.
#[derive(Debug, Clone)]
pub struct SqliteChainStore {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl SqliteChainStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./chain.db"`) or a full
    /// SQLite URL (`"sqlite:./chain.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, StreamError> {
        Self::open_with_options(path, SqliteOptions::default()).await
    }

    pub async fn open_with_options(path: &str, opts: SqliteOptions) -> Result<Self, StreamError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(opts.max_connections)
            .connect(&url)
            .await
            .map_err(|e| StreamError::Storage(e.to_string()))?;

        let store = Self {
            pool,
            query_timeout: Duration::from_millis(opts.query_timeout_ms),
        };
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&store.pool)
            .await
            .map_err(|e| StreamError::Storage(e.to_string()))?;
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// The pool holds exactly one connection that is never recycled, since
    /// every `sqlite::memory:` connection is its own empty database.
    pub async fn in_memory() -> Result<Self, StreamError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StreamError::Storage(e.to_string()))?;

        let store = Self {
            pool,
            query_timeout: Duration::from_millis(SqliteOptions::default().query_timeout_ms),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create the tables of every supported chain.
    async fn init_schema(&self) -> Result<(), StreamError> {
        for chain in Blockchain::ALL {
            for statement in sql::schema_statements(Dialect::Sqlite, chain) {
                sqlx::query(&statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StreamError::Storage(e.to_string()))?;
            }
        }
        Ok(())
    }

    // ─── Writes ─────────────────────────────────────────────────────────────────

    pub async fn insert_transaction(&self, chain: Blockchain, row: &TransactionRow) -> Result<(), StreamError> {
        sqlx::query(&sql::insert_transaction_sql(Dialect::Sqlite, chain))
            .bind(&row.hash)
            .bind(row.block_number)
            .bind(&row.from_address)
            .bind(&row.to_address)
            .bind(&row.gas)
            .bind(&row.gas_price)
            .bind(&row.input)
            .bind(row.nonce)
            .bind(&row.value)
            .bind(row.timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| StreamError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn insert_label(&self, chain: Blockchain, row: &LabelRow) -> Result<(), StreamError> {
        let label_data =
            serde_json::to_string(&row.label_data).map_err(|e| StreamError::Storage(e.to_string()))?;
        sqlx::query(&sql::insert_label_sql(Dialect::Sqlite, chain))
            .bind(&row.label)
            .bind(&row.address)
            .bind(&row.transaction_hash)
            .bind(label_data)
            .bind(row.block_timestamp)
            .bind(row.log_index)
            .execute(&self.pool)
            .await
            .map_err(|e| StreamError::Storage(e.to_string()))?;
        Ok(())
    }

    // ─── Reads ──────────────────────────────────────────────────────────────────

    async fn fetch_rows(&self, table: &str, query: SqlQuery) -> Result<Vec<SqliteRow>, StreamError> {
        let mut q = sqlx::query(&query.sql);
        for param in &query.params {
            q = match param {
                Param::Int(v) => q.bind(*v),
                Param::Text(v) => q.bind(v.as_str()),
            };
        }

        let rows = tokio::time::timeout(self.query_timeout, q.fetch_all(&self.pool))
            .await
            .map_err(|_| StreamError::Timeout {
                provider: table.to_string(),
                ms: self.query_timeout.as_millis() as u64,
            })?
            .map_err(|e| StreamError::Storage(e.to_string()))?;

        debug!(table, rows = rows.len(), "sqlite query");
        Ok(rows)
    }
}

fn storage(e: sqlx::Error) -> StreamError {
    StreamError::Storage(e.to_string())
}

fn decode_transaction(row: &SqliteRow) -> Result<TransactionRow, StreamError> {
    Ok(TransactionRow {
        hash: row.try_get("hash").map_err(storage)?,
        block_number: row.try_get("block_number").map_err(storage)?,
        from_address: row.try_get("from_address").map_err(storage)?,
        to_address: row.try_get("to_address").map_err(storage)?,
        gas: row.try_get("gas").map_err(storage)?,
        gas_price: row.try_get("gas_price").map_err(storage)?,
        input: row.try_get("input").map_err(storage)?,
        nonce: row.try_get("nonce").map_err(storage)?,
        value: row.try_get("value").map_err(storage)?,
        timestamp: row.try_get("timestamp").map_err(storage)?,
    })
}

fn decode_label(row: &SqliteRow) -> Result<LabelRow, StreamError> {
    let label_data: String = row.try_get("label_data").map_err(storage)?;
    Ok(LabelRow {
        label: row.try_get("label").map_err(storage)?,
        address: row.try_get("address").map_err(storage)?,
        transaction_hash: row.try_get("transaction_hash").map_err(storage)?,
        label_data: serde_json::from_str(&label_data).map_err(|e| StreamError::Storage(e.to_string()))?,
        block_timestamp: row.try_get("block_timestamp").map_err(storage)?,
        log_index: row.try_get("log_index").map_err(storage)?,
    })
}

#[async_trait]
impl ChainStore for SqliteChainStore {
    async fn transactions(
        &self,
        query: TableQuery<'_, AddressFilters>,
    ) -> Result<Vec<TransactionRow>, StreamError> {
        let Some(sql) = sql::transactions_query(Dialect::Sqlite, &query) else {
            return Ok(Vec::new());
        };
        self.fetch_rows(query.chain.transactions_table(), sql)
            .await?
            .iter()
            .map(decode_transaction)
            .collect()
    }

    async fn labels(&self, query: TableQuery<'_, LabelFilters>) -> Result<Vec<LabelRow>, StreamError> {
        let Some(sql) = sql::labels_query(Dialect::Sqlite, &query) else {
            return Ok(Vec::new());
        };
        self.fetch_rows(query.chain.labels_table(), sql)
            .await?
            .iter()
            .map(decode_label)
            .collect()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chainstream_core::boundary::StreamBoundary;
    use chainstream_core::provider::Order;
    use serde_json::json;

    fn tx(hash: &str, from: &str, to: &str, timestamp: i64) -> TransactionRow {
        TransactionRow {
            hash: hash.into(),
            block_number: timestamp,
            from_address: from.into(),
            to_address: Some(to.into()),
            gas: "21000".into(),
            gas_price: "30000000000".into(),
            input: "0x".into(),
            nonce: 1,
            value: "115792089237316195423570985008687907853269984665640564039457584007913129639935".into(),
            timestamp,
        }
    }

    async fn seeded() -> SqliteChainStore {
        let store = SqliteChainStore::in_memory().await.unwrap();
        let chain = Blockchain::Ethereum;
        for (hash, from, to, ts) in [
            ("0x01", "0xAA", "0xBB", 1000),
            ("0x02", "0xCC", "0xaa", 1500),
            ("0x03", "0xCC", "0xDD", 1800),
            ("0x04", "0xAA", "0xDD", 2000),
        ] {
            store.insert_transaction(chain, &tx(hash, from, to, ts)).await.unwrap();
        }
        store
            .insert_label(
                chain,
                &LabelRow {
                    label: "moonworm-event".into(),
                    address: "0xDD".into(),
                    transaction_hash: Some("0x03".into()),
                    label_data: json!({"name": "Transfer", "type": "event"}),
                    block_timestamp: 1800,
                    log_index: Some(2),
                },
            )
            .await
            .unwrap();
        store
    }

    async fn hashes(store: &SqliteChainStore, boundary: &StreamBoundary, filters: &AddressFilters, order: Order) -> Vec<String> {
        store
            .transactions(TableQuery {
                chain: Blockchain::Ethereum,
                boundary,
                filters,
                order,
                limit: None,
            })
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.hash)
            .collect()
    }

    #[tokio::test]
    async fn window_edges_and_address_case() {
        let store = seeded().await;
        let filters = AddressFilters {
            from_addresses: vec!["0xaa".into()],
            to_addresses: vec!["0xAA".into()],
            labels: vec![],
            subscribed: vec!["0xaa".into()],
        };

        let half_open = StreamBoundary::new(1000, Some(2000)).with_edges(true, false);
        assert_eq!(hashes(&store, &half_open, &filters, Order::Descending).await, vec!["0x02", "0x01"]);

        let closed = StreamBoundary::new(1000, Some(2000));
        assert_eq!(
            hashes(&store, &closed, &filters, Order::Ascending).await,
            vec!["0x01", "0x02", "0x04"]
        );

        let open_start = StreamBoundary::new(1000, None).with_edges(false, false);
        assert_eq!(hashes(&store, &open_start, &filters, Order::Ascending).await, vec!["0x02", "0x04"]);
    }

    #[tokio::test]
    async fn label_exists_disjunct() {
        let store = seeded().await;
        let filters = AddressFilters {
            labels: vec!["moonworm-event".into()],
            subscribed: vec!["0xdd".into()],
            ..Default::default()
        };
        let all = StreamBoundary::new(0, None);
        assert_eq!(hashes(&store, &all, &filters, Order::Descending).await, vec!["0x03"]);
    }

    #[tokio::test]
    async fn empty_filters_return_nothing() {
        let store = seeded().await;
        let all = StreamBoundary::new(0, None);
        assert!(hashes(&store, &all, &AddressFilters::default(), Order::Descending)
            .await
            .is_empty());
    }

    async fn labels(store: &SqliteChainStore, filters: &LabelFilters) -> Vec<LabelRow> {
        store
            .labels(TableQuery {
                chain: Blockchain::Ethereum,
                boundary: &StreamBoundary::new(0, None),
                filters,
                order: Order::Descending,
                limit: Some(10),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn labels_roundtrip_json_and_names() {
        let store = seeded().await;
        let mut filters = LabelFilters {
            addresses: vec!["0xdd".into()],
            labels: vec!["moonworm-event".into()],
            names: vec!["Transfer".into()],
        };
        let rows = labels(&store, &filters).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label_data["type"], "event");
        assert_eq!(rows[0].log_index, Some(2));

        filters.names = vec!["Approval".into()];
        assert!(labels(&store, &filters).await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_label_data_is_a_storage_error() {
        let store = seeded().await;
        sqlx::query(
            "INSERT INTO ethereum_labels (label, address, transaction_hash, label_data, block_timestamp, log_index) \
             VALUES ('moonworm-event', '0xEE', NULL, '{not json', 1900, 0)",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let filters = LabelFilters {
            addresses: vec!["0xee".into()],
            labels: vec!["moonworm-event".into()],
            names: vec![],
        };
        let err = store
            .labels(TableQuery {
                chain: Blockchain::Ethereum,
                boundary: &StreamBoundary::new(0, None),
                filters: &filters,
                order: Order::Descending,
                limit: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Storage(_)));
    }

    #[tokio::test]
    async fn wide_values_survive_as_text() {
        let store = seeded().await;
        let filters = AddressFilters {
            from_addresses: vec!["0xcc".into()],
            ..Default::default()
        };
        let rows = store
            .transactions(TableQuery {
                chain: Blockchain::Ethereum,
                boundary: &StreamBoundary::new(0, None),
                filters: &filters,
                order: Order::Ascending,
                limit: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].value.starts_with("1157920892373161954235709850"));
    }

    #[tokio::test]
    async fn concurrent_reads_share_the_memory_database() {
        let store = seeded().await;
        let filters = AddressFilters {
            from_addresses: vec!["0xcc".into()],
            ..Default::default()
        };
        let all = StreamBoundary::new(0, None);
        let (a, b) = tokio::join!(
            hashes(&store, &all, &filters, Order::Ascending),
            hashes(&store, &all, &filters, Order::Descending)
        );
        assert_eq!(a, vec!["0x02", "0x03"]);
        assert_eq!(b, vec!["0x03", "0x02"]);
    }
}
