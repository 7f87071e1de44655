use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of the operation statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_operations: u64,
    pub total_errors: u64,
    /// Most recent successful operation durations, oldest first
    pub recent_timings: Vec<Duration>,
    /// Mean of `recent_timings`
    pub average_latency: Option<Duration>,
    pub last_operation_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct OperationStats {
    total_operations: u64,
    total_errors: u64,
    recent_timings: VecDeque<Duration>,
    last_operation_at: Option<DateTime<Utc>>,
}

/// Counts tracked operations and keeps a bounded window of their durations.
#[derive(Debug)]
pub(crate) struct StatsRecorder {
    inner: Mutex<OperationStats>,
    window: usize,
}

impl StatsRecorder {
    pub(crate) fn new(window: usize) -> Self {
        Self {
            inner: Mutex::new(OperationStats::default()),
            window: window.max(1),
        }
    }

    pub(crate) fn record_success(&self, elapsed: Duration) {
        let mut stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        stats.total_operations += 1;
        if stats.recent_timings.len() == self.window {
            stats.recent_timings.pop_front();
        }
        stats.recent_timings.push_back(elapsed);
        stats.last_operation_at = Some(Utc::now());
    }

    pub(crate) fn record_failure(&self) {
        let mut stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        stats.total_errors += 1;
        stats.last_operation_at = Some(Utc::now());
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        let stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let recent_timings: Vec<Duration> = stats.recent_timings.iter().copied().collect();
        let average_latency = if recent_timings.is_empty() {
            None
        } else {
            let total: Duration = recent_timings.iter().sum();
            Some(total / recent_timings.len() as u32)
        };
        StatsSnapshot {
            total_operations: stats.total_operations,
            total_errors: stats.total_errors,
            recent_timings,
            average_latency,
            last_operation_at: stats.last_operation_at,
        }
    }

    pub(crate) fn reset(&self) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = OperationStats::default();
    }
}
