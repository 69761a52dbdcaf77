//! chainstream-journal — journal-backed event providers for ChainStream.
//!
//! Providers:
//! - [`JournalProvider`] — a feed stored as tagged journal entries
//! - [`TxpoolProvider`] — the mempool feed, filtered by address tags
//!
//! The same service stores each caller's subscriptions as resources;
//! [`ResourceSubscriptions`] loads them for a bearer token.

pub mod client;
pub mod error;
pub mod memory;
pub mod provider;
pub mod retry;
pub mod subscriptions;
pub mod txpool;

pub use client::{JournalClient, JournalClientConfig, JournalEntry, JournalSearch, Resource, SearchPage, SearchRequest};
pub use error::JournalError;
pub use memory::InMemoryJournal;
pub use provider::{JournalProvider, JournalProviderConfig};
pub use retry::{RetryConfig, RetryPolicy};
pub use subscriptions::{ResourceSubscriptions, StaticSubscriptions, SubscriptionSource};
pub use txpool::TxpoolProvider;
