//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! Interval counters are reset by `report()` via atomic swap; lifetime
//! totals are never reset.
//!
//! NOTE: All atomics use Relaxed ordering intentionally: these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Counters for the containment engine
pub struct Metrics {
    // Lifetime totals
    samples_total: AtomicU64,
    transitions_total: AtomicU64,

    // Interval counters (reset on report)
    samples_received: AtomicU64,
    samples_evaluated: AtomicU64,
    samples_dropped: AtomicU64,
    transitions: AtomicU64,
    zone_changes: AtomicU64,
    source_errors: AtomicU64,
    latency_sum_us: AtomicU64,
    latency_max_us: AtomicU64,

    /// Start of the current reporting interval
    interval_start: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            samples_total: AtomicU64::new(0),
            transitions_total: AtomicU64::new(0),
            samples_received: AtomicU64::new(0),
            samples_evaluated: AtomicU64::new(0),
            samples_dropped: AtomicU64::new(0),
            transitions: AtomicU64::new(0),
            zone_changes: AtomicU64::new(0),
            source_errors: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            interval_start: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_sample_received(&self) {
        self.samples_total.fetch_add(1, Ordering::Relaxed);
        self.samples_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a sample that went through the containment test
    #[inline]
    pub fn record_sample_evaluated(&self, latency_us: u64) {
        self.samples_evaluated.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_sample_dropped(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transition(&self) {
        self.transitions_total.fetch_add(1, Ordering::Relaxed);
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_zone_change(&self) {
        self.zone_changes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_source_error(&self) {
        self.source_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn samples_total(&self) -> u64 {
        self.samples_total.load(Ordering::Relaxed)
    }

    pub fn transitions_total(&self) -> u64 {
        self.transitions_total.load(Ordering::Relaxed)
    }

    /// Snapshot and reset interval counters
    pub fn report(&self) -> MetricsSummary {
        let elapsed_secs = {
            let mut start = self.interval_start.lock();
            let elapsed = start.elapsed().as_secs_f64();
            *start = Instant::now();
            elapsed
        };

        let samples_received = self.samples_received.swap(0, Ordering::Relaxed);
        let samples_evaluated = self.samples_evaluated.swap(0, Ordering::Relaxed);
        let latency_sum_us = self.latency_sum_us.swap(0, Ordering::Relaxed);

        MetricsSummary {
            samples_total: self.samples_total(),
            transitions_total: self.transitions_total(),
            samples_received,
            samples_evaluated,
            samples_dropped: self.samples_dropped.swap(0, Ordering::Relaxed),
            transitions: self.transitions.swap(0, Ordering::Relaxed),
            zone_changes: self.zone_changes.swap(0, Ordering::Relaxed),
            source_errors: self.source_errors.swap(0, Ordering::Relaxed),
            samples_per_sec: if elapsed_secs > 0.0 {
                samples_received as f64 / elapsed_secs
            } else {
                0.0
            },
            avg_latency_us: latency_sum_us.checked_div(samples_evaluated).unwrap_or(0),
            max_latency_us: self.latency_max_us.swap(0, Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub samples_total: u64,
    pub transitions_total: u64,
    pub samples_received: u64,
    pub samples_evaluated: u64,
    pub samples_dropped: u64,
    pub transitions: u64,
    pub zone_changes: u64,
    pub source_errors: u64,
    pub samples_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            samples_total = %self.samples_total,
            samples = %self.samples_received,
            evaluated = %self.samples_evaluated,
            dropped = %self.samples_dropped,
            transitions = %self.transitions,
            zone_changes = %self.zone_changes,
            source_errors = %self.source_errors,
            samples_per_sec = %format!("{:.1}", self.samples_per_sec),
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            "metrics"
        );
    }
}
