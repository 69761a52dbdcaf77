//! Fan-out/fan-in over every in-scope provider.
//!
//! Each aggregate call spawns one Tokio task per in-scope provider (bounded
//! by `max_workers`), waits for all of them against a single shared
//! deadline, and merges what came back. Tasks never outlive the call: when
//! the call returns, early or not, the `JoinSet` is dropped and abandoned
//! tasks are aborted so their backing connections are released.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::boundary::StreamBoundary;
use crate::error::StreamError;
use crate::event::{Event, UserSubscriptions};
use crate::provider::{EventProvider, Outcome, ProviderInfo};
use crate::query::StreamQuery;
use crate::registry::ProviderRegistry;

// ─── Options ──────────────────────────────────────────────────────────────────

/// How `latest_events` caps the merged result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatestLimit {
    /// Each provider returns up to `num_events`; the merge is not truncated.
    #[default]
    PerProvider,
    /// The merged, sorted result is truncated to `num_events`.
    Global,
}

/// Per-call fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanOutOptions {
    /// Shared deadline for all provider tasks of one call (milliseconds).
    pub result_timeout_ms: u64,
    /// Maximum concurrently running provider tasks. `None` = one per provider.
    pub max_workers: Option<usize>,
    /// Fail the whole call when any provider fails or times out.
    pub raise_on_error: bool,
    /// Sort merged `get_events`/`latest_events` output by timestamp.
    pub sort_events: bool,
    pub latest_limit: LatestLimit,
}

impl Default for FanOutOptions {
    fn default() -> Self {
        Self {
            result_timeout_ms: 10_000,
            max_workers: None,
            raise_on_error: false,
            sort_events: true,
            latest_limit: LatestLimit::PerProvider,
        }
    }
}

impl FanOutOptions {
    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }

    pub fn with_result_timeout_ms(mut self, ms: u64) -> Self {
        self.result_timeout_ms = ms;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    pub fn strict(mut self) -> Self {
        self.raise_on_error = true;
        self
    }

    pub fn with_sort(mut self, sort_events: bool) -> Self {
        self.sort_events = sort_events;
        self
    }

    pub fn with_latest_limit(mut self, limit: LatestLimit) -> Self {
        self.latest_limit = limit;
        self
    }
}

// ─── Aggregator ───────────────────────────────────────────────────────────────

struct CallArgs {
    boundary: StreamBoundary,
    query: StreamQuery,
    subscriptions: UserSubscriptions,
}

/// Single entry point for the four stream operations.
#[derive(Debug, Clone)]
pub struct EventAggregator {
    registry: Arc<ProviderRegistry>,
}

impl EventAggregator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Static metadata of every registered provider.
    pub fn info(&self) -> indexmap::IndexMap<String, ProviderInfo> {
        self.registry.info()
    }

    /// Events inside `boundary` from every in-scope provider.
    ///
    /// The returned boundary has the caller's (normalised) shape; when the
    /// caller left `end_time` open it is set to the latest end any provider
    /// reported.
    pub async fn get_events(
        &self,
        boundary: &StreamBoundary,
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
        options: &FanOutOptions,
    ) -> Result<(StreamBoundary, Vec<Event>), StreamError> {
        let args = Arc::new(CallArgs {
            boundary: boundary.clone(),
            query: query.clone(),
            subscriptions: subscriptions.clone(),
        });
        let results = self
            .fan_out(query, options, "get_events", move |provider| {
                let args = Arc::clone(&args);
                async move {
                    provider
                        .get_events(&args.boundary, &args.query, &args.subscriptions)
                        .await
                }
            })
            .await?;

        let (_, mut merged) = boundary.validate(i64::MAX, false)?;
        let mut events = Vec::new();
        for (_, (provider_boundary, provider_events)) in results {
            if boundary.end_time.is_none() {
                if let Some(end) = provider_boundary.end_time {
                    if merged.end_time.map_or(true, |current| end > current) {
                        merged.end_time = Some(end);
                        merged.include_end = provider_boundary.include_end;
                    }
                }
            }
            events.extend(provider_events);
        }

        if options.sort_events {
            if merged.reversed_time {
                events.sort_by_key(|e| e.event_timestamp);
            } else {
                events.sort_by_key(|e| std::cmp::Reverse(e.event_timestamp));
            }
        }
        Ok((merged, events))
    }

    /// The most recent events from every in-scope provider.
    pub async fn latest_events(
        &self,
        query: &StreamQuery,
        num_events: u64,
        subscriptions: &UserSubscriptions,
        options: &FanOutOptions,
    ) -> Result<Vec<Event>, StreamError> {
        let args = Arc::new(CallArgs {
            boundary: StreamBoundary::default(),
            query: query.clone(),
            subscriptions: subscriptions.clone(),
        });
        let results = self
            .fan_out(query, options, "latest_events", move |provider| {
                let args = Arc::clone(&args);
                async move {
                    provider
                        .latest_events(&args.query, num_events, &args.subscriptions)
                        .await
                }
            })
            .await?;

        let mut events: Vec<Event> = results.into_iter().flat_map(|(_, e)| e).collect();
        if options.sort_events {
            events.sort_by_key(|e| std::cmp::Reverse(e.event_timestamp));
        }
        if options.latest_limit == LatestLimit::Global {
            events.truncate(usize::try_from(num_events).unwrap_or(usize::MAX));
        }
        Ok(events)
    }

    /// The earliest event after `boundary` across all in-scope providers.
    pub async fn next_event(
        &self,
        boundary: &StreamBoundary,
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
        options: &FanOutOptions,
    ) -> Result<Option<Event>, StreamError> {
        boundary.following()?;
        let candidates = self
            .single_event(boundary, query, subscriptions, options, Direction::Next)
            .await?;

        let mut best: Option<Event> = None;
        for event in candidates {
            if best
                .as_ref()
                .map_or(true, |b| event.event_timestamp < b.event_timestamp)
            {
                best = Some(event);
            }
        }
        Ok(best)
    }

    /// The latest event before `boundary` across all in-scope providers.
    pub async fn previous_event(
        &self,
        boundary: &StreamBoundary,
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
        options: &FanOutOptions,
    ) -> Result<Option<Event>, StreamError> {
        boundary.preceding()?;
        let candidates = self
            .single_event(boundary, query, subscriptions, options, Direction::Previous)
            .await?;

        let mut best: Option<Event> = None;
        for event in candidates {
            if best
                .as_ref()
                .map_or(true, |b| event.event_timestamp > b.event_timestamp)
            {
                best = Some(event);
            }
        }
        Ok(best)
    }

    /// Candidate events in dispatch order.
    async fn single_event(
        &self,
        boundary: &StreamBoundary,
        query: &StreamQuery,
        subscriptions: &UserSubscriptions,
        options: &FanOutOptions,
        direction: Direction,
    ) -> Result<Vec<Event>, StreamError> {
        let args = Arc::new(CallArgs {
            boundary: boundary.clone(),
            query: query.clone(),
            subscriptions: subscriptions.clone(),
        });
        let op = match direction {
            Direction::Next => "next_event",
            Direction::Previous => "previous_event",
        };
        let results = self
            .fan_out(query, options, op, move |provider| {
                let args = Arc::clone(&args);
                async move {
                    match direction {
                        Direction::Next => {
                            provider
                                .next_event(&args.boundary, &args.query, &args.subscriptions)
                                .await
                        }
                        Direction::Previous => {
                            provider
                                .previous_event(&args.boundary, &args.query, &args.subscriptions)
                                .await
                        }
                    }
                }
            })
            .await?;
        Ok(results.into_iter().filter_map(|(_, e)| e).collect())
    }

    /// Run `call` on every in-scope provider concurrently.
    ///
    /// Returns the applicable results in dispatch order, tagged with the
    /// provider's event type.
    async fn fan_out<T, F, Fut>(
        &self,
        query: &StreamQuery,
        options: &FanOutOptions,
        op: &'static str,
        call: F,
    ) -> Result<Vec<(String, T)>, StreamError>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn EventProvider>) -> Fut,
        Fut: Future<Output = Result<Outcome<T>, StreamError>> + Send + 'static,
    {
        let providers = self.registry.in_scope(query);
        if providers.is_empty() {
            debug!(op, "no providers in scope");
            return Ok(Vec::new());
        }

        let names: Vec<String> = providers.iter().map(|p| p.event_type().to_string()).collect();
        let workers = options.max_workers.unwrap_or(providers.len()).max(1);
        let permits = Arc::new(Semaphore::new(workers));
        let deadline = Instant::now() + options.result_timeout();

        let mut tasks = JoinSet::new();
        for (idx, provider) in providers.into_iter().enumerate() {
            let permits = Arc::clone(&permits);
            let fut = call(provider);
            tasks.spawn(async move {
                // The semaphore is never closed, so acquiring only waits.
                let _permit = permits.acquire_owned().await;
                (idx, fut.await)
            });
        }

        let mut slots: Vec<Option<T>> = names.iter().map(|_| None).collect();
        let mut pending = vec![true; names.len()];
        let mut timed_out = false;

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(None) => break,
                Ok(Some(Ok((idx, result)))) => {
                    pending[idx] = false;
                    match result {
                        Ok(Outcome::Applicable(value)) => slots[idx] = Some(value),
                        Ok(Outcome::NotApplicable) => {
                            debug!(op, provider = %names[idx], "provider not applicable");
                        }
                        Err(e) => provider_failed(op, &names[idx], e, options)?,
                    }
                }
                // A panicked task is reported below as still pending.
                Ok(Some(Err(e))) => warn!(op, error = %e, "provider task did not complete"),
                Err(_) => {
                    timed_out = true;
                    tasks.abort_all();
                    break;
                }
            }
        }

        for (idx, still_pending) in pending.iter().enumerate() {
            if *still_pending {
                let cause = if timed_out {
                    StreamError::Timeout {
                        provider: names[idx].clone(),
                        ms: options.result_timeout_ms,
                    }
                } else {
                    StreamError::Other("task panicked".into())
                };
                provider_failed(op, &names[idx], cause, options)?;
            }
        }

        Ok(names
            .into_iter()
            .zip(slots)
            .filter_map(|(name, slot)| slot.map(|v| (name, v)))
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Next,
    Previous,
}

/// Either drop a failed provider's contribution or fail the call.
///
/// In strict mode a caller error (a window wider than the provider allows)
/// is returned as is; anything else becomes [`StreamError::ReceivingEvents`].
fn provider_failed(
    op: &str,
    provider: &str,
    cause: StreamError,
    options: &FanOutOptions,
) -> Result<(), StreamError> {
    if options.raise_on_error {
        if cause.is_user_error() {
            return Err(cause);
        }
        return Err(StreamError::ReceivingEvents {
            provider: provider.to_string(),
            reason: cause.to_string(),
        });
    }
    warn!(op, provider, error = %cause, "dropping events from failed provider");
    Ok(())
}
