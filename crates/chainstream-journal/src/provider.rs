//! `JournalProvider`: an event feed stored as tagged journal entries.
//!
//! Entries are selected with a tag query: every configured tag is required
//! (`#tag`), optional tags (`?#tag`) widen the match, and the time window
//! becomes `created_at:` bounds. Results are paged through until the
//! service reports no further offset or the request limit is reached.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use chainstream_core::boundary::StreamBoundary;
use chainstream_core::error::StreamError;
use chainstream_core::event::{Event, Subscription, UserSubscriptions};
use chainstream_core::filters::{ProviderFilters, TagFilters};
use chainstream_core::provider::{EventProvider, FetchRequest, Order, ProviderInfo};
use chainstream_core::query::StreamQuery;

use crate::client::{JournalEntry, JournalSearch, SearchRequest};

/// Configuration of one journal-backed feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalProviderConfig {
    /// Event type served (e.g. `"ethereum_whalewatch"`).
    pub event_type: String,
    #[serde(default)]
    pub description: String,
    pub journal_id: String,
    /// Service token used for searches.
    pub token: String,
    /// Tags every entry of the feed carries.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_max_window")]
    pub max_window_seconds: i64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_interval")]
    pub default_time_interval_seconds: i64,
    #[serde(default = "default_estimate")]
    pub estimated_events_per_time_interval: f64,
}

fn default_max_window() -> i64 {
    2 * 60 * 60
}

fn default_page_size() -> u64 {
    100
}

fn default_interval() -> i64 {
    60 * 60
}

fn default_estimate() -> f64 {
    5.0
}

impl JournalProviderConfig {
    pub fn new(
        event_type: impl Into<String>,
        journal_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            description: String::new(),
            journal_id: journal_id.into(),
            token: token.into(),
            tags: Vec::new(),
            max_window_seconds: default_max_window(),
            page_size: default_page_size(),
            default_time_interval_seconds: default_interval(),
            estimated_events_per_time_interval: default_estimate(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_max_window(mut self, seconds: i64) -> Self {
        self.max_window_seconds = seconds;
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// Build the journal search string for `tags` inside `boundary`.
pub fn search_query(tags: &TagFilters, boundary: &StreamBoundary) -> String {
    let mut parts: Vec<String> = tags.required.iter().map(|t| format!("#{t}")).collect();
    parts.extend(tags.optional.iter().map(|t| format!("?#{t}")));

    let start_op = if boundary.include_start { ">=" } else { ">" };
    parts.push(format!("created_at:{start_op}{}", boundary.start_time));
    if let Some(end) = boundary.end_time {
        let end_op = if boundary.include_end { "<=" } else { "<" };
        parts.push(format!("created_at:{end_op}{end}"));
    }
    parts.join(" ")
}

/// Parse a journal `created_at` into unix seconds.
///
/// Accepts RFC 3339 and offset-less ISO timestamps (read as UTC).
pub fn parse_created_at(raw: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

fn entry_to_event(event_type: &str, entry: JournalEntry) -> Option<Event> {
    let Some(timestamp) = parse_created_at(&entry.created_at) else {
        warn!(event_type, created_at = %entry.created_at, "skipping entry with unparseable created_at");
        return None;
    };
    let content = serde_json::from_str::<Value>(&entry.content).unwrap_or(Value::String(entry.content));

    let mut data = Map::new();
    data.insert("title".into(), Value::String(entry.title));
    data.insert("content".into(), content);
    data.insert(
        "tags".into(),
        Value::Array(entry.tags.into_iter().map(Value::String).collect()),
    );
    data.insert("entry_url".into(), Value::String(entry.entry_url));
    Some(Event::new(event_type, timestamp, data))
}

/// Events read from one journal by tag.
pub struct JournalProvider {
    config: JournalProviderConfig,
    client: Arc<dyn JournalSearch>,
}

impl JournalProvider {
    pub fn new(config: JournalProviderConfig, client: Arc<dyn JournalSearch>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &JournalProviderConfig {
        &self.config
    }

    /// Run a tag search for `request`, paging until done.
    pub(crate) async fn fetch_tagged(
        &self,
        tags: &TagFilters,
        request: &FetchRequest,
    ) -> Result<Vec<Event>, StreamError> {
        let query = search_query(tags, &request.boundary);
        let mut events: Vec<Event> = Vec::new();
        let mut offset = 0;

        loop {
            let limit = match request.limit {
                Some(limit) => (limit - events.len() as u64).min(self.config.page_size),
                None => self.config.page_size,
            };
            let page = self
                .client
                .search(
                    &self.config.token,
                    SearchRequest {
                        journal_id: &self.config.journal_id,
                        query: &query,
                        limit,
                        offset,
                        order: request.order,
                    },
                )
                .await?;

            let fetched = page.results.len();
            events.extend(
                page.results
                    .into_iter()
                    .filter_map(|e| entry_to_event(&self.config.event_type, e))
                    .filter(|e| request.boundary.contains(e.event_timestamp)),
            );

            let reached_limit = request.limit.is_some_and(|l| events.len() as u64 >= l);
            match page.next_offset {
                Some(next) if fetched > 0 && !reached_limit && next > offset => offset = next,
                _ => break,
            }
        }

        match request.order {
            Order::Ascending => events.sort_by_key(|e| e.event_timestamp),
            Order::Descending => events.sort_by_key(|e| std::cmp::Reverse(e.event_timestamp)),
        }
        if let Some(limit) = request.limit {
            events.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        debug!(event_type = %self.config.event_type, %query, count = events.len(), "journal fetch");
        Ok(events)
    }
}

#[async_trait]
impl EventProvider for JournalProvider {
    fn event_type(&self) -> &str {
        &self.config.event_type
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            description: self.config.description.clone(),
            default_time_interval_seconds: self.config.default_time_interval_seconds,
            estimated_events_per_time_interval: self.config.estimated_events_per_time_interval,
        }
    }

    fn max_window_seconds(&self) -> i64 {
        self.config.max_window_seconds
    }

    fn validate_subscription(&self, subscription: &Subscription) -> Result<(), StreamError> {
        if subscription.subscription_type_id != self.config.event_type {
            return Err(StreamError::Other(format!(
                "subscription type '{}' is not '{}'",
                subscription.subscription_type_id, self.config.event_type
            )));
        }
        if subscription.address.trim().is_empty() {
            return Err(StreamError::Other("journal subscription without address".into()));
        }
        Ok(())
    }

    fn parse_filters(
        &self,
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
    ) -> Option<ProviderFilters> {
        if !query.wants(&self.config.event_type) || !subscriptions.has_type(&self.config.event_type) {
            return None;
        }
        Some(ProviderFilters::Tags(TagFilters {
            required: self.config.tags.clone(),
            optional: Vec::new(),
        }))
    }

    async fn fetch(&self, request: FetchRequest) -> Result<Vec<Event>, StreamError> {
        let ProviderFilters::Tags(tags) = &request.filters else {
            return Err(StreamError::ContractViolation(format!(
                "{} cannot run {:?}",
                self.config.event_type, request.filters
            )));
        };
        self.fetch_tagged(tags, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainstream_core::provider::Outcome;
    use crate::memory::InMemoryJournal;

    fn whalewatch(journal: Arc<InMemoryJournal>) -> JournalProvider {
        JournalProvider::new(
            JournalProviderConfig::new("ethereum_whalewatch", "whales", "svc-token")
                .with_tags(["crawl_type:ethereum_trending"])
                .with_page_size(2),
            journal,
        )
    }

    fn subscribed() -> UserSubscriptions {
        [Subscription::new("ethereum_whalewatch", "whalewatch")].into_iter().collect()
    }

    #[test]
    fn query_string_encodes_tags_and_edges() {
        let tags = TagFilters {
            required: vec!["client:crawler".into()],
            optional: vec!["from_address:0x1".into(), "to_address:0x1".into()],
        };
        let q = search_query(&tags, &StreamBoundary::new(1000, Some(1005)).with_edges(true, false));
        assert_eq!(
            q,
            "#client:crawler ?#from_address:0x1 ?#to_address:0x1 created_at:>=1000 created_at:<1005"
        );

        let q = search_query(&TagFilters::default(), &StreamBoundary::new(7, None).with_edges(false, false));
        assert_eq!(q, "created_at:>7");
    }

    #[test]
    fn created_at_formats() {
        assert_eq!(parse_created_at("1970-01-01T00:16:40+00:00"), Some(1000));
        assert_eq!(parse_created_at("1970-01-01T00:16:40.123456"), Some(1000));
        assert_eq!(parse_created_at("1970-01-01 00:16:40"), Some(1000));
        assert_eq!(parse_created_at("yesterday"), None);
    }

    #[tokio::test]
    async fn pages_through_results_and_parses_content() {
        let journal = Arc::new(InMemoryJournal::new());
        journal.add_entry("whales", 1000, &["crawl_type:ethereum_trending"], r#"{"amount": 5}"#);
        journal.add_entry("whales", 1100, &["crawl_type:ethereum_trending"], "plain text");
        journal.add_entry("whales", 1200, &["crawl_type:ethereum_trending"], "{}");
        journal.add_entry("whales", 1300, &["other"], "{}");

        let provider = whalewatch(journal.clone());
        let (boundary, events) = provider
            .get_events(&StreamBoundary::new(900, Some(2000)), &StreamQuery::default(), &subscribed())
            .await
            .unwrap()
            .applicable()
            .unwrap();

        let ts: Vec<i64> = events.iter().map(|e| e.event_timestamp).collect();
        assert_eq!(ts, vec![1200, 1100, 1000]);
        assert_eq!(events[2].event_data["content"]["amount"], 5);
        assert_eq!(events[1].event_data["content"], "plain text");
        assert_eq!(boundary.end_time, Some(2000));
        // two pages of two
        assert_eq!(journal.searches().len(), 2);
        assert!(journal.searches()[0].starts_with("#crawl_type:ethereum_trending created_at:>=900"));
    }

    #[tokio::test]
    async fn limit_stops_paging_early() {
        let journal = Arc::new(InMemoryJournal::new());
        for ts in [10, 20, 30, 40, 50] {
            journal.add_entry("whales", ts, &["crawl_type:ethereum_trending"], "{}");
        }
        let provider = whalewatch(journal.clone());
        let events = provider
            .latest_events(&StreamQuery::default(), 1, &subscribed())
            .await
            .unwrap()
            .applicable()
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_timestamp, 50);
        assert_eq!(journal.searches().len(), 1);
    }

    #[tokio::test]
    async fn skipped_without_subscription() {
        let provider = whalewatch(Arc::new(InMemoryJournal::new()));
        let outcome = provider
            .latest_events(&StreamQuery::default(), 5, &UserSubscriptions::new())
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::NotApplicable));
    }

    #[tokio::test]
    async fn journal_failures_surface_as_journal_errors() {
        let journal = Arc::new(InMemoryJournal::new());
        journal.fail_with(503);
        let err = whalewatch(journal)
            .latest_events(&StreamQuery::default(), 5, &subscribed())
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Journal(_)));
    }
}
