//! In-memory journal service.
//!
//! Evaluates the same tag-query syntax as the real service over entries
//! held in RAM. Useful for tests and local development.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::DateTime;

use chainstream_core::provider::Order;

use crate::client::{JournalEntry, JournalSearch, Resource, SearchPage, SearchRequest};
use crate::error::JournalError;

#[derive(Debug, Default)]
struct State {
    entries: Vec<(String, i64, JournalEntry)>,
    resources: HashMap<String, Vec<Resource>>,
    searches: Vec<String>,
    failure: Option<u16>,
}

/// Journal entries and resources held in RAM.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    state: Mutex<State>,
}

/// A parsed search string.
#[derive(Debug, Default)]
struct Criteria {
    required: Vec<String>,
    optional: Vec<String>,
    bounds: Vec<(String, i64)>,
}

impl Criteria {
    fn parse(query: &str) -> Self {
        let mut criteria = Self::default();
        for term in query.split_whitespace() {
            if let Some(tag) = term.strip_prefix("?#") {
                criteria.optional.push(tag.to_string());
            } else if let Some(tag) = term.strip_prefix('#') {
                criteria.required.push(tag.to_string());
            } else if let Some(bound) = term.strip_prefix("created_at:") {
                let split = bound.find(|c: char| c.is_ascii_digit() || c == '-').unwrap_or(bound.len());
                let (op, value) = bound.split_at(split);
                if let Ok(value) = value.parse() {
                    criteria.bounds.push((op.to_string(), value));
                }
            }
        }
        criteria
    }

    fn matches(&self, timestamp: i64, tags: &[String]) -> bool {
        let has = |t: &String| tags.contains(t);
        self.required.iter().all(has)
            && (self.optional.is_empty() || self.optional.iter().any(has))
            && self.bounds.iter().all(|(op, v)| match op.as_str() {
                ">=" => timestamp >= *v,
                ">" => timestamp > *v,
                "<=" => timestamp <= *v,
                "<" => timestamp < *v,
                _ => true,
            })
    }
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an entry to `journal_id` created at unix time `created_at`.
    pub fn add_entry(&self, journal_id: &str, created_at: i64, tags: &[&str], content: &str) {
        let entry = JournalEntry {
            entry_url: format!("journals/{journal_id}/entries/{}", self.state().entries.len()),
            title: format!("entry at {created_at}"),
            content: content.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: DateTime::from_timestamp(created_at, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default(),
        };
        self.state().entries.push((journal_id.to_string(), created_at, entry));
    }

    /// Store a resource visible to `token`.
    pub fn add_resource(&self, token: &str, resource: Resource) {
        self.state()
            .resources
            .entry(token.to_string())
            .or_default()
            .push(resource);
    }

    /// Make every following call fail with HTTP `status`.
    pub fn fail_with(&self, status: u16) {
        self.state().failure = Some(status);
    }

    /// Search strings received so far.
    pub fn searches(&self) -> Vec<String> {
        self.state().searches.clone()
    }

    fn check_failure(state: &State) -> Result<(), JournalError> {
        match state.failure {
            Some(status) => Err(JournalError::Status {
                status,
                body: "injected failure".into(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl JournalSearch for InMemoryJournal {
    async fn search(&self, _token: &str, request: SearchRequest<'_>) -> Result<SearchPage, JournalError> {
        let mut state = self.state();
        state.searches.push(request.query.to_string());
        Self::check_failure(&state)?;

        let criteria = Criteria::parse(request.query);
        let mut hits: Vec<(i64, JournalEntry)> = state
            .entries
            .iter()
            .filter(|(journal, ts, entry)| journal == request.journal_id && criteria.matches(*ts, &entry.tags))
            .map(|(_, ts, entry)| (*ts, entry.clone()))
            .collect();
        match request.order {
            Order::Ascending => hits.sort_by_key(|(ts, _)| *ts),
            Order::Descending => hits.sort_by_key(|(ts, _)| std::cmp::Reverse(*ts)),
        }

        let total = hits.len() as u64;
        let results: Vec<JournalEntry> = hits
            .into_iter()
            .skip(request.offset as usize)
            .take(request.limit as usize)
            .map(|(_, entry)| entry)
            .collect();
        let end = request.offset + results.len() as u64;
        Ok(SearchPage {
            total_results: total,
            offset: request.offset,
            next_offset: (end < total).then_some(end),
            results,
        })
    }

    async fn list_resources(
        &self,
        token: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<Resource>, JournalError> {
        let state = self.state();
        Self::check_failure(&state)?;
        let Some(resources) = state.resources.get(token) else {
            return Err(JournalError::Status {
                status: 401,
                body: "unknown token".into(),
            });
        };
        Ok(resources
            .iter()
            .filter(|r| {
                params
                    .iter()
                    .all(|(k, v)| r.resource_data.get(*k).and_then(|x| x.as_str()) == Some(*v))
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn criteria_match_tags_and_bounds() {
        let c = Criteria::parse("#a ?#b ?#c created_at:>=10 created_at:<20");
        let tags = |t: &[&str]| t.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(c.matches(10, &tags(&["a", "c"])));
        assert!(!c.matches(20, &tags(&["a", "c"])));
        assert!(!c.matches(15, &tags(&["a"])));
        assert!(!c.matches(15, &tags(&["b", "c"])));
    }

    #[tokio::test]
    async fn resources_are_scoped_to_token() {
        let journal = InMemoryJournal::new();
        journal.add_resource(
            "alice",
            Resource {
                id: "r1".into(),
                resource_data: json!({"type": "subscription", "address": "0x1"}),
            },
        );
        let found = journal.list_resources("alice", &[("type", "subscription")]).await.unwrap();
        assert_eq!(found.len(), 1);
        let err = journal.list_resources("mallory", &[]).await.unwrap_err();
        assert!(err.is_unauthorized());
    }
}
