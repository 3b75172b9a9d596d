//! Engine metrics
//!
//! Counters for event handling and query recomputation. Everything is a
//! relaxed atomic, so recording is cheap and a snapshot may be slightly
//! inconsistent across fields.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Events dispatched
    pub events: AtomicU64,

    /// Events rejected with an error
    pub rejected: AtomicU64,

    /// Query recomputations
    pub recomputes: AtomicU64,

    /// Recomputations that ran the overlay and sort stages
    pub full_paths: AtomicU64,

    /// Recomputations whose ordered keys did not change
    pub unchanged: AtomicU64,

    /// Time spent reprocessing (nanoseconds)
    pub total_reprocess_time_ns: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one query recomputation
    pub fn record_recompute(&self, full_path: bool, unchanged: bool) {
        self.recomputes.fetch_add(1, Ordering::Relaxed);
        if full_path {
            self.full_paths.fetch_add(1, Ordering::Relaxed);
        }
        if unchanged {
            self.unchanged.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_reprocess(&self, duration: Duration) {
        self.total_reprocess_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.events.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
        self.recomputes.store(0, Ordering::Relaxed);
        self.full_paths.store(0, Ordering::Relaxed);
        self.unchanged.store(0, Ordering::Relaxed);
        self.total_reprocess_time_ns.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            recomputes: self.recomputes.load(Ordering::Relaxed),
            full_paths: self.full_paths.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            total_time_ns: self.total_reprocess_time_ns.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`EngineMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events: u64,
    pub rejected: u64,
    pub recomputes: u64,
    pub full_paths: u64,
    pub unchanged: u64,
    pub total_time_ns: u64,
}

impl MetricsSnapshot {
    /// Share of recomputes that skipped overlay and sort
    pub fn fast_path_rate(&self) -> f64 {
        if self.recomputes == 0 {
            0.0
        } else {
            (self.recomputes - self.full_paths) as f64 / self.recomputes as f64
        }
    }

    /// Share of recomputes that produced the same ordering
    pub fn unchanged_rate(&self) -> f64 {
        if self.recomputes == 0 {
            0.0
        } else {
            self.unchanged as f64 / self.recomputes as f64
        }
    }

    /// Average reprocessing time per event
    pub fn avg_reprocess_time(&self) -> Duration {
        if self.events == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_time_ns / self.events)
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Events: {} | Rejected: {}", self.events, self.rejected)?;
        writeln!(
            f,
            "  Recomputes: {} | Fast Path: {:.1}% | Unchanged: {:.1}%",
            self.recomputes,
            self.fast_path_rate() * 100.0,
            self.unchanged_rate() * 100.0
        )?;
        writeln!(
            f,
            "  Avg Time: {:.3}ms | Total Time: {:.3}ms",
            self.avg_reprocess_time().as_secs_f64() * 1000.0,
            Duration::from_nanos(self.total_time_ns).as_secs_f64() * 1000.0
        )?;
        Ok(())
    }
}
