//! In-memory chain store.
//!
//! Holds transactions and labels per chain in RAM and evaluates the same
//! filter semantics as the SQL backends. Useful for tests and local
//! development; nothing is persisted.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use chainstream_core::error::StreamError;
use chainstream_core::filters::{AddressFilters, LabelFilters};
use chainstream_core::provider::Order;

use crate::chain::Blockchain;
use crate::rows::{LabelRow, TransactionRow};
use crate::store::{ChainStore, TableQuery};

#[derive(Debug, Default)]
struct ChainTables {
    transactions: Vec<TransactionRow>,
    labels: Vec<LabelRow>,
}

/// In-memory transactions and labels, keyed by chain.
#[derive(Debug, Default)]
pub struct InMemoryChainStore {
    chains: RwLock<HashMap<Blockchain, ChainTables>>,
}

impl InMemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_transaction(&self, chain: Blockchain, row: TransactionRow) {
        self.chains
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(chain)
            .or_default()
            .transactions
            .push(row);
    }

    pub fn insert_label(&self, chain: Blockchain, row: LabelRow) {
        self.chains
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(chain)
            .or_default()
            .labels
            .push(row);
    }

    /// Number of stored transactions for `chain`.
    pub fn transaction_count(&self, chain: Blockchain) -> usize {
        self.chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chain)
            .map_or(0, |t| t.transactions.len())
    }
}

fn contains_ci(list: &[String], value: &str) -> bool {
    list.iter().any(|v| v.eq_ignore_ascii_case(value))
}

fn finish<T>(mut rows: Vec<T>, key: impl Fn(&T) -> i64, order: Order, limit: Option<u64>) -> Vec<T> {
    match order {
        Order::Ascending => rows.sort_by_key(|r| key(r)),
        Order::Descending => rows.sort_by_key(|r| std::cmp::Reverse(key(r))),
    }
    if let Some(limit) = limit {
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    rows
}

#[async_trait]
impl ChainStore for InMemoryChainStore {
    async fn transactions(
        &self,
        query: TableQuery<'_, AddressFilters>,
    ) -> Result<Vec<TransactionRow>, StreamError> {
        let chains = self.chains.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tables) = chains.get(&query.chain) else {
            return Ok(Vec::new());
        };
        let f = query.filters;

        let labelled = |hash: &str| {
            !f.labels.is_empty()
                && tables.labels.iter().any(|l| {
                    l.transaction_hash.as_deref() == Some(hash)
                        && f.labels.contains(&l.label)
                        && contains_ci(&f.subscribed, &l.address)
                })
        };

        let rows: Vec<TransactionRow> = tables
            .transactions
            .iter()
            .filter(|t| query.boundary.contains(t.timestamp))
            .filter(|t| {
                contains_ci(&f.from_addresses, &t.from_address)
                    || t
                        .to_address
                        .as_deref()
                        .is_some_and(|to| contains_ci(&f.to_addresses, to))
                    || labelled(&t.hash)
            })
            .cloned()
            .collect();

        Ok(finish(rows, |t| t.timestamp, query.order, query.limit))
    }

    async fn labels(&self, query: TableQuery<'_, LabelFilters>) -> Result<Vec<LabelRow>, StreamError> {
        let chains = self.chains.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tables) = chains.get(&query.chain) else {
            return Ok(Vec::new());
        };
        let f = query.filters;

        let rows: Vec<LabelRow> = tables
            .labels
            .iter()
            .filter(|l| query.boundary.contains(l.block_timestamp))
            .filter(|l| contains_ci(&f.addresses, &l.address) && f.labels.contains(&l.label))
            .filter(|l| f.names.is_empty() || l.name().is_some_and(|n| f.names.iter().any(|w| w == n)))
            .cloned()
            .collect();

        Ok(finish(rows, |l| l.block_timestamp, query.order, query.limit))
    }
}
