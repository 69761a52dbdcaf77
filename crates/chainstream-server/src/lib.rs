//! chainstream-server — the HTTP surface of ChainStream.
//!
//! [`AppState::build`] turns a [`ServerConfig`] into an aggregator over the
//! configured providers; [`router`] serves it under `/streams/`.

pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::{ProviderSpec, ServerConfig, StorageConfig, SubscriptionsConfig};
pub use error::{ApiError, SetupError};
pub use logging::{init_tracing, LogConfig};
pub use routes::router;
pub use state::AppState;
