//! `/streams/*` handlers.
//!
//! | Route               | Returns                          |
//! |---------------------|----------------------------------|
//! | `/streams/`         | `{ stream_boundary, events }`    |
//! | `/streams/latest`   | `Event[]`                        |
//! | `/streams/next`     | `Event \| null`                  |
//! | `/streams/previous` | `Event \| null`                  |
//! | `/streams/info`     | `{ event_type: ProviderInfo }`   |

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::routing::get;
use axum::{Json, Router};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use chainstream_core::boundary::StreamBoundary;
use chainstream_core::event::{Event, UserSubscriptions};
use chainstream_core::provider::ProviderInfo;
use chainstream_core::query::StreamQuery;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/streams/", get(stream_events))
        .route("/streams/latest", get(latest_events))
        .route("/streams/next", get(next_event))
        .route("/streams/previous", get(previous_event))
        .route("/streams/info", get(info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Parameters ───────────────────────────────────────────────────────────────

/// Query text plus a time window.
#[derive(Debug, Deserialize)]
pub struct BoundaryParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub include_start: bool,
    #[serde(default)]
    pub include_end: bool,
}

impl BoundaryParams {
    fn boundary(&self) -> StreamBoundary {
        StreamBoundary::new(self.start_time, self.end_time)
            .with_edges(self.include_start, self.include_end)
    }
}

#[derive(Debug, Deserialize)]
pub struct LatestParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_num_events")]
    pub num_events: u64,
}

fn default_num_events() -> u64 {
    10
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreamResponse {
    pub stream_boundary: StreamBoundary,
    pub events: Vec<Event>,
}

// ─── Handlers ─────────────────────────────────────────────────────────────────

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingToken)
}

async fn caller_subscriptions(state: &AppState, headers: &HeaderMap) -> Result<UserSubscriptions, ApiError> {
    let token = bearer_token(headers)?;
    Ok(state.subscriptions.subscriptions(token).await?)
}

async fn stream_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BoundaryParams>,
) -> Result<Json<StreamResponse>, ApiError> {
    let subscriptions = caller_subscriptions(&state, &headers).await?;
    let (stream_boundary, events) = state
        .aggregator
        .get_events(
            &params.boundary(),
            &StreamQuery::parse(&params.q),
            &subscriptions,
            &state.options,
        )
        .await?;
    Ok(Json(StreamResponse {
        stream_boundary,
        events,
    }))
}

async fn latest_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LatestParams>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let subscriptions = caller_subscriptions(&state, &headers).await?;
    let events = state
        .aggregator
        .latest_events(
            &StreamQuery::parse(&params.q),
            params.num_events,
            &subscriptions,
            &state.options,
        )
        .await?;
    Ok(Json(events))
}

async fn next_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BoundaryParams>,
) -> Result<Json<Option<Event>>, ApiError> {
    let subscriptions = caller_subscriptions(&state, &headers).await?;
    let event = state
        .aggregator
        .next_event(
            &params.boundary(),
            &StreamQuery::parse(&params.q),
            &subscriptions,
            &state.options,
        )
        .await?;
    Ok(Json(event))
}

async fn previous_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BoundaryParams>,
) -> Result<Json<Option<Event>>, ApiError> {
    let subscriptions = caller_subscriptions(&state, &headers).await?;
    let event = state
        .aggregator
        .previous_event(
            &params.boundary(),
            &StreamQuery::parse(&params.q),
            &subscriptions,
            &state.options,
        )
        .await?;
    Ok(Json(event))
}

async fn info(State(state): State<AppState>) -> Json<IndexMap<String, ProviderInfo>> {
    Json(state.aggregator.info())
}
