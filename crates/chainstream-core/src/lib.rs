//! chainstream-core — the event stream aggregation layer.
//!
//! # Architecture
//!
//! ```text
//! query text ──► StreamQuery ──┐
//! StreamBoundary ──────────────┼──► EventAggregator ──► (boundary, Vec<Event>)
//! UserSubscriptions ───────────┘          │
//!                                         ├── ProviderRegistry (event type → provider)
//!                                         └── EventProvider × N (one Tokio task each)
//!                                               ├── TransactionProvider / LabelProvider
//!                                               └── JournalProvider / TxpoolProvider
//! ```

pub mod aggregator;
pub mod boundary;
pub mod error;
pub mod event;
pub mod filters;
pub mod provider;
pub mod query;
pub mod registry;

pub use aggregator::{EventAggregator, FanOutOptions, LatestLimit};
pub use boundary::StreamBoundary;
pub use error::StreamError;
pub use event::{Event, Subscription, UserSubscriptions};
pub use filters::{is_evm_address, AddressFilters, LabelFilters, ProviderFilters, TagFilters};
pub use provider::{EventProvider, FetchRequest, Order, Outcome, ProviderInfo};
pub use query::StreamQuery;
pub use registry::{ProviderRegistry, ProviderRegistryBuilder};
