//! The `ChainStore` trait, the query surface relational providers need.

use async_trait::async_trait;

use chainstream_core::boundary::StreamBoundary;
use chainstream_core::error::StreamError;
use chainstream_core::filters::{AddressFilters, LabelFilters};
use chainstream_core::provider::Order;

use crate::chain::Blockchain;
use crate::rows::{LabelRow, TransactionRow};

/// Window, ordering, and limit shared by every table query.
#[derive(Debug, Clone)]
pub struct TableQuery<'a, F> {
    pub chain: Blockchain,
    pub boundary: &'a StreamBoundary,
    pub filters: &'a F,
    pub order: Order,
    pub limit: Option<u64>,
}

/// Read access to the per-chain transactions and labels tables.
///
/// Implementations must be safe to call from many provider tasks at once;
/// SQL backends draw one pooled connection per call.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Transactions in the window matching
    /// `from IN F OR to IN T OR EXISTS(label IN L on a subscribed address)`.
    async fn transactions(
        &self,
        query: TableQuery<'_, AddressFilters>,
    ) -> Result<Vec<TransactionRow>, StreamError>;

    /// Labels in the window on the given addresses with the given label values.
    async fn labels(&self, query: TableQuery<'_, LabelFilters>) -> Result<Vec<LabelRow>, StreamError>;
}
