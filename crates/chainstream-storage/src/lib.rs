//! chainstream-storage — relational event providers for ChainStream.
//!
//! Providers:
//! - [`TransactionProvider`] — `<chain>_blockchain` events from `<chain>_transactions`
//! - [`LabelProvider`] — `<chain>_smartcontract` events from `<chain>_labels`
//!
//! Backends ([`ChainStore`] implementations):
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - [`sqlite`] — SQLite via `sqlx`
//! - `postgres` — PostgreSQL via `sqlx` (feature `postgres`)

pub mod chain;
pub mod memory;
pub mod provider;
pub mod rows;
pub mod store;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use chain::Blockchain;
pub use memory::InMemoryChainStore;
pub use provider::{LabelProvider, TransactionProvider};
pub use rows::{LabelRow, TransactionRow};
pub use store::{ChainStore, TableQuery};
