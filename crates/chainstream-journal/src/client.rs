//! HTTP client for the journal / resource service, backed by `reqwest`.
//!
//! Two endpoints are used:
//! - `GET {base}/journals/{journal_id}/search`: tag search over entries
//! - `GET {base}/resources`: the caller's stored resources (subscriptions)
//!
//! Every call carries the caller's bearer token and retries transient
//! failures with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use chainstream_core::provider::Order;

use crate::error::JournalError;
use crate::retry::{RetryConfig, RetryPolicy};

// ─── Wire types ───────────────────────────────────────────────────────────────

/// One journal entry as returned by search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    #[serde(default)]
    pub entry_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: String,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub next_offset: Option<u64>,
    #[serde(default)]
    pub results: Vec<JournalEntry>,
}

/// A stored resource (subscriptions are resources of type `subscription`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub resource_data: Value,
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    resources: Vec<Resource>,
}

/// One search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest<'a> {
    pub journal_id: &'a str,
    pub query: &'a str,
    pub limit: u64,
    pub offset: u64,
    pub order: Order,
}

// ─── JournalSearch ────────────────────────────────────────────────────────────

/// The journal operations providers need.
///
/// Implemented by [`JournalClient`]; tests substitute an in-memory double.
#[async_trait]
pub trait JournalSearch: Send + Sync {
    async fn search(&self, token: &str, request: SearchRequest<'_>) -> Result<SearchPage, JournalError>;

    /// Resources visible to `token`, filtered by `params` (e.g. `type=subscription`).
    async fn list_resources(
        &self,
        token: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<Resource>, JournalError>;
}

// ─── JournalClient ────────────────────────────────────────────────────────────

/// Configuration for [`JournalClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalClientConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for JournalClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7191".to_string(),
            request_timeout_ms: 10_000,
            retry: RetryConfig::default(),
        }
    }
}

/// `reqwest`-backed journal client. Stateless per call and safe to share.
#[derive(Debug, Clone)]
pub struct JournalClient {
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl JournalClient {
    pub fn new(config: JournalClientConfig) -> Result<Self, JournalError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| JournalError::Http(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            retry: RetryPolicy::new(config.retry),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn search_url(&self, journal_id: &str) -> String {
        format!("{}/journals/{journal_id}/search", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
        params: &[(&str, String)],
    ) -> Result<T, JournalError> {
        let http = &self.http;
        self.retry
            .run(url, || async move {
                let resp = http
                    .get(url)
                    .bearer_auth(token)
                    .query(params)
                    .send()
                    .await
                    .map_err(|e| JournalError::Http(e.to_string()))?;

                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(JournalError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }

                resp.json::<T>()
                    .await
                    .map_err(|e| JournalError::Decode(e.to_string()))
            })
            .await
    }
}

fn order_param(order: Order) -> &'static str {
    match order {
        Order::Ascending => "asc",
        Order::Descending => "desc",
    }
}

#[async_trait]
impl JournalSearch for JournalClient {
    async fn search(&self, token: &str, request: SearchRequest<'_>) -> Result<SearchPage, JournalError> {
        let params = [
            ("q", request.query.to_string()),
            ("limit", request.limit.to_string()),
            ("offset", request.offset.to_string()),
            ("order", order_param(request.order).to_string()),
            ("content", "true".to_string()),
        ];
        let page: SearchPage = self
            .get_json(&self.search_url(request.journal_id), token, &params)
            .await?;
        debug!(
            journal_id = request.journal_id,
            query = request.query,
            returned = page.results.len(),
            total = page.total_results,
            "journal search"
        );
        Ok(page)
    }

    async fn list_resources(
        &self,
        token: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<Resource>, JournalError> {
        let params: Vec<(&str, String)> = params.iter().map(|(k, v)| (*k, v.to_string())).collect();
        let list: ResourceList = self
            .get_json(&format!("{}/resources", self.base_url), token, &params)
            .await?;
        Ok(list.resources)
    }
}
