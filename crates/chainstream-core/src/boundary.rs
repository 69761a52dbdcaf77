//! Stream boundaries — the time window a provider call considers.
//!
//! A boundary is `[start_time, end_time]` in unix seconds with independently
//! inclusive or exclusive edges. An absent `end_time` means "up to now".
//! Callers may hand in an inverted window (`start_time > end_time`) to ask
//! for a look-back; [`StreamBoundary::validate`] normalises it and records
//! the inversion in `reversed_time`.

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// A time window with inclusive/exclusive edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamBoundary {
    /// Window start, seconds since epoch. `0` means the beginning of time.
    #[serde(default)]
    pub start_time: i64,
    /// Window end, seconds since epoch. `None` means "now".
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub include_start: bool,
    #[serde(default)]
    pub include_end: bool,
    /// Set when validation swapped an inverted caller-supplied window.
    #[serde(default)]
    pub reversed_time: bool,
}

impl Default for StreamBoundary {
    fn default() -> Self {
        Self {
            start_time: 0,
            end_time: None,
            include_start: false,
            include_end: false,
            reversed_time: false,
        }
    }
}

impl StreamBoundary {
    /// Create a boundary with both edges inclusive.
    pub fn new(start_time: i64, end_time: Option<i64>) -> Self {
        Self {
            start_time,
            end_time,
            include_start: true,
            include_end: true,
            reversed_time: false,
        }
    }

    /// Set edge inclusivity.
    pub fn with_edges(mut self, include_start: bool, include_end: bool) -> Self {
        self.include_start = include_start;
        self.include_end = include_end;
        self
    }

    /// Validate against `max_window_seconds` using the current wall clock.
    ///
    /// Returns `Ok((false, boundary))` for a too-wide window, or
    /// [`StreamError::InvalidStreamBoundary`] when `raise_on_invalid` is set.
    pub fn validate(
        &self,
        max_window_seconds: i64,
        raise_on_invalid: bool,
    ) -> Result<(bool, StreamBoundary), StreamError> {
        self.validate_at(
            chrono::Utc::now().timestamp(),
            max_window_seconds,
            raise_on_invalid,
        )
    }

    /// Validate against `max_window_seconds`, treating `now` as the current time.
    ///
    /// The cap applies to the forward width `end - start_time` of the window
    /// as given. An inverted window has a negative width and is never capped,
    /// so a look-back request may span any amount of history. A width that
    /// overflows `i64` counts as too wide.
    pub fn validate_at(
        &self,
        now: i64,
        max_window_seconds: i64,
        raise_on_invalid: bool,
    ) -> Result<(bool, StreamBoundary), StreamError> {
        let end = self.end_time.unwrap_or(now);

        let too_wide = match end.checked_sub(self.start_time) {
            Some(width) => width > max_window_seconds,
            None => self.start_time < end,
        };
        if too_wide {
            if raise_on_invalid {
                return Err(StreamError::InvalidStreamBoundary {
                    start_time: self.start_time,
                    end_time: self.end_time,
                    max_window_seconds,
                });
            }
            return Ok((false, self.clone()));
        }

        let mut boundary = self.clone();
        if self.start_time > end {
            boundary.start_time = end;
            boundary.end_time = Some(self.start_time);
            boundary.include_start = self.include_end;
            boundary.include_end = self.include_start;
            boundary.reversed_time = true;
        }
        Ok((true, boundary))
    }

    /// Returns `true` if `timestamp` falls inside this window.
    pub fn contains(&self, timestamp: i64) -> bool {
        let after_start = if self.include_start {
            timestamp >= self.start_time
        } else {
            timestamp > self.start_time
        };
        let before_end = match self.end_time {
            None => true,
            Some(end) if self.include_end => timestamp <= end,
            Some(end) => timestamp < end,
        };
        after_start && before_end
    }

    /// The open-ended window that starts exactly where this one ends.
    ///
    /// The new start edge is the complement of the old end edge so that an
    /// event sitting on the shared edge is reported by exactly one window.
    pub fn following(&self) -> Result<StreamBoundary, StreamError> {
        let end = self.end_time.ok_or_else(|| {
            StreamError::ContractViolation("next_event requires boundary.end_time".into())
        })?;
        Ok(StreamBoundary {
            start_time: end,
            end_time: None,
            include_start: !self.include_end,
            include_end: false,
            reversed_time: false,
        })
    }

    /// The window from the beginning of time up to where this one starts.
    pub fn preceding(&self) -> Result<StreamBoundary, StreamError> {
        if self.start_time == 0 {
            return Err(StreamError::ContractViolation(
                "previous_event requires a non-zero boundary.start_time".into(),
            ));
        }
        Ok(StreamBoundary {
            start_time: 0,
            end_time: Some(self.start_time),
            include_start: true,
            include_end: !self.include_start,
            reversed_time: false,
        })
    }
}
