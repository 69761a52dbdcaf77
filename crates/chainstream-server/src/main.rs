//! chainstream: serve aggregated event streams over HTTP.
//!
//! ```bash
//! chainstream ./chainstream.yaml
//! CHAINSTREAM_CONFIG=./chainstream.yaml chainstream
//! ```
//!
//! Without a configuration file the server starts with defaults and no
//! providers.

use std::env;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use chainstream_server::{init_tracing, router, AppState, ServerConfig};

const CONFIG_ENV: &str = "CHAINSTREAM_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    let path = env::var(CONFIG_ENV).ok().or_else(|| env::args().nth(1));
    let config = match &path {
        Some(path) => ServerConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => ServerConfig::default(),
    };

    init_tracing(&config.log).context("installing tracing subscriber")?;
    if path.is_none() {
        info!("no configuration given (set {CONFIG_ENV} or pass a path), using defaults");
    }

    let state = AppState::build(&config)
        .await
        .context("building stream providers")?;
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!(bind = %config.bind, "chainstream listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;
    info!("chainstream stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
