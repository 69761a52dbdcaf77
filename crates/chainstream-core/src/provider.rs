//! The `EventProvider` trait: one pluggable source of events.
//!
//! A provider only has to know how to build its filters and how to run one
//! [`FetchRequest`] against its backing store. The four request operations
//! (`get_events`, `latest_events`, `next_event`, `previous_event`) share the
//! boundary handling below and are provided as default methods.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::boundary::StreamBoundary;
use crate::error::StreamError;
use crate::event::{Event, Subscription, UserSubscriptions};
use crate::filters::ProviderFilters;
use crate::query::StreamQuery;

/// Whether a provider took part in a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The query does not implicate this provider.
    NotApplicable,
    /// The provider ran; `T` may still be empty.
    Applicable(T),
}

impl<T> Outcome<T> {
    /// Convert into an `Option`, discarding the distinction.
    pub fn applicable(self) -> Option<T> {
        match self {
            Self::NotApplicable => None,
            Self::Applicable(v) => Some(v),
        }
    }
}

/// Result ordering by event timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Ascending,
    Descending,
}

/// One query against a provider's backing store.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub boundary: StreamBoundary,
    pub filters: ProviderFilters,
    pub order: Order,
    pub limit: Option<u64>,
}

/// Static provider metadata served by `/streams/info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub description: String,
    pub default_time_interval_seconds: i64,
    pub estimated_events_per_time_interval: f64,
}

/// A pluggable source of events keyed by its event type.
///
/// # Object Safety
/// The trait is object-safe and is stored as `Arc<dyn EventProvider>`
/// in the [`ProviderRegistry`](crate::registry::ProviderRegistry).
#[async_trait]
pub trait EventProvider: Send + Sync + 'static {
    /// The event type tag this provider serves.
    fn event_type(&self) -> &str;

    fn info(&self) -> ProviderInfo;

    /// Widest window a single `get_events` call may scan.
    fn max_window_seconds(&self) -> i64;

    /// Check that a subscription can be served by this provider.
    fn validate_subscription(&self, subscription: &Subscription) -> Result<(), StreamError>;

    /// Build this provider's filters, or `None` when the provider is not
    /// implicated by the query for this caller.
    fn parse_filters(
        &self,
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
    ) -> Option<ProviderFilters>;

    /// Run one query against the backing store.
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<Event>, StreamError>;

    /// Events inside `boundary`.
    ///
    /// Events are ordered descending by timestamp, or ascending for a
    /// reversed boundary. An open-ended boundary comes back with `end_time`
    /// set to the latest event found and `include_end = true`, so it can be
    /// replayed or used to resume.
    async fn get_events(
        &self,
        boundary: &StreamBoundary,
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
    ) -> Result<Outcome<(StreamBoundary, Vec<Event>)>, StreamError> {
        let Some(filters) = self.parse_filters(query, subscriptions) else {
            return Ok(Outcome::NotApplicable);
        };
        let (_, mut boundary) = boundary.validate(self.max_window_seconds(), true)?;

        let order = if boundary.reversed_time {
            Order::Ascending
        } else {
            Order::Descending
        };
        let events = self
            .fetch(FetchRequest {
                boundary: boundary.clone(),
                filters,
                order,
                limit: None,
            })
            .await?;

        if boundary.end_time.is_none() {
            if let Some(latest) = events.iter().map(|e| e.event_timestamp).max() {
                boundary.end_time = Some(latest);
                boundary.include_end = true;
            }
        }

        debug!(
            event_type = self.event_type(),
            count = events.len(),
            start = boundary.start_time,
            end = ?boundary.end_time,
            "get_events"
        );
        Ok(Outcome::Applicable((boundary, events)))
    }

    /// The `num_events` most recent events, newest first.
    async fn latest_events(
        &self,
        query: &StreamQuery,
        num_events: u64,
        subscriptions: &UserSubscriptions,
    ) -> Result<Outcome<Vec<Event>>, StreamError> {
        let Some(filters) = self.parse_filters(query, subscriptions) else {
            return Ok(Outcome::NotApplicable);
        };
        let events = self
            .fetch(FetchRequest {
                boundary: StreamBoundary::new(0, None),
                filters,
                order: Order::Descending,
                limit: Some(num_events),
            })
            .await?;
        Ok(Outcome::Applicable(events))
    }

    /// The earliest event after `boundary`.
    async fn next_event(
        &self,
        boundary: &StreamBoundary,
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
    ) -> Result<Outcome<Option<Event>>, StreamError> {
        let next = boundary.following()?;
        let Some(filters) = self.parse_filters(query, subscriptions) else {
            return Ok(Outcome::NotApplicable);
        };
        let events = self
            .fetch(FetchRequest {
                boundary: next,
                filters,
                order: Order::Ascending,
                limit: Some(1),
            })
            .await?;
        Ok(Outcome::Applicable(events.into_iter().next()))
    }

    /// The latest event before `boundary`.
    async fn previous_event(
        &self,
        boundary: &StreamBoundary,
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
    ) -> Result<Outcome<Option<Event>>, StreamError> {
        let previous = boundary.preceding()?;
        let Some(filters) = self.parse_filters(query, subscriptions) else {
            return Ok(Outcome::NotApplicable);
        };
        let events = self
            .fetch(FetchRequest {
                boundary: previous,
                filters,
                order: Order::Descending,
                limit: Some(1),
            })
            .await?;
        Ok(Outcome::Applicable(events.into_iter().next()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::AddressFilters;
    use serde_json::Map;
    use std::sync::Mutex;

    /// Serves fixed timestamps and records every request it receives.
    struct Fixed {
        timestamps: Vec<i64>,
        requests: Mutex<Vec<FetchRequest>>,
    }

    impl Fixed {
        fn new(timestamps: Vec<i64>) -> Self {
            Self {
                timestamps,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EventProvider for Fixed {
        fn event_type(&self) -> &str {
            "fixed"
        }
        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                description: "fixed".into(),
                default_time_interval_seconds: 60,
                estimated_events_per_time_interval: 1.0,
            }
        }
        fn max_window_seconds(&self) -> i64 {
            i64::MAX
        }
        fn validate_subscription(&self, _s: &Subscription) -> Result<(), StreamError> {
            Ok(())
        }
        fn parse_filters(
            &self,
            query: &StreamQuery,
            subscriptions: &UserSubscriptions,
        ) -> Option<ProviderFilters> {
            AddressFilters::from_query(self.event_type(), query, subscriptions)
                .map(ProviderFilters::Addresses)
        }
        async fn fetch(&self, request: FetchRequest) -> Result<Vec<Event>, StreamError> {
            let mut out: Vec<Event> = self
                .timestamps
                .iter()
                .filter(|t| request.boundary.contains(**t))
                .map(|t| Event::new("fixed", *t, Map::new()))
                .collect();
            match request.order {
                Order::Ascending => out.sort_by_key(|e| e.event_timestamp),
                Order::Descending => out.sort_by_key(|e| std::cmp::Reverse(e.event_timestamp)),
            }
            if let Some(limit) = request.limit {
                out.truncate(limit as usize);
            }
            self.requests.lock().unwrap().push(request);
            Ok(out)
        }
    }

    fn subscribed() -> UserSubscriptions {
        [Subscription::new("fixed", "0x1")].into_iter().collect()
    }

    #[tokio::test]
    async fn get_events_fills_open_end() {
        let p = Fixed::new(vec![100, 300, 200]);
        let (boundary, events) = p
            .get_events(&StreamBoundary::new(100, None), &StreamQuery::default(), &subscribed())
            .await
            .unwrap()
            .applicable()
            .unwrap();
        let ts: Vec<_> = events.iter().map(|e| e.event_timestamp).collect();
        assert_eq!(ts, vec![300, 200, 100]);
        assert_eq!(boundary.end_time, Some(300));
        assert!(boundary.include_end);
    }

    #[tokio::test]
    async fn get_events_ascending_for_reversed_boundary() {
        let p = Fixed::new(vec![100, 300, 200]);
        let (boundary, events) = p
            .get_events(
                &StreamBoundary::new(400, Some(0)),
                &StreamQuery::default(),
                &subscribed(),
            )
            .await
            .unwrap()
            .applicable()
            .unwrap();
        assert!(boundary.reversed_time);
        let ts: Vec<_> = events.iter().map(|e| e.event_timestamp).collect();
        assert_eq!(ts, vec![100, 200, 300]);
    }

    #[tokio::test]
    async fn not_applicable_without_subscriptions() {
        let p = Fixed::new(vec![100]);
        let out = p
            .get_events(
                &StreamBoundary::new(0, Some(10)),
                &StreamQuery::default(),
                &UserSubscriptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(out, Outcome::NotApplicable);
        assert!(p.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn next_event_is_earliest_after_end() {
        let p = Fixed::new(vec![1500, 2000, 2500, 3000]);
        let boundary = StreamBoundary::new(1000, Some(2000)).with_edges(true, false);
        let ev = p
            .next_event(&boundary, &StreamQuery::default(), &subscribed())
            .await
            .unwrap()
            .applicable()
            .unwrap()
            .unwrap();
        assert_eq!(ev.event_timestamp, 2000);

        let boundary = boundary.with_edges(true, true);
        let ev = p
            .next_event(&boundary, &StreamQuery::default(), &subscribed())
            .await
            .unwrap()
            .applicable()
            .unwrap()
            .unwrap();
        assert_eq!(ev.event_timestamp, 2500);
    }

    #[tokio::test]
    async fn previous_event_is_latest_before_start() {
        let p = Fixed::new(vec![500, 900, 1000, 1500]);
        let boundary = StreamBoundary::new(1000, Some(2000)).with_edges(true, true);
        let ev = p
            .previous_event(&boundary, &StreamQuery::default(), &subscribed())
            .await
            .unwrap()
            .applicable()
            .unwrap()
            .unwrap();
        assert_eq!(ev.event_timestamp, 900);
    }

    #[tokio::test]
    async fn latest_events_limits_and_orders() {
        let p = Fixed::new(vec![1, 5, 3, 4, 2]);
        let events = p
            .latest_events(&StreamQuery::default(), 2, &subscribed())
            .await
            .unwrap()
            .applicable()
            .unwrap();
        let ts: Vec<_> = events.iter().map(|e| e.event_timestamp).collect();
        assert_eq!(ts, vec![5, 4]);
    }

    #[tokio::test]
    async fn contract_violations_fail_loudly() {
        let p = Fixed::new(vec![]);
        let err = p
            .next_event(&StreamBoundary::new(0, None), &StreamQuery::default(), &subscribed())
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::ContractViolation(_)));

        let err = p
            .previous_event(&StreamBoundary::new(0, Some(5)), &StreamQuery::default(), &subscribed())
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::ContractViolation(_)));
    }
}
