//! Prometheus metrics for the scheduling engine.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

/// Global metrics instance.
static METRICS: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Get or initialize the global metrics instance.
pub fn get_metrics() -> Arc<Metrics> {
    METRICS.get_or_init(|| Arc::new(Metrics::new())).clone()
}

/// Histogram buckets for availability computation latency (in seconds).
fn latency_buckets() -> Vec<f64> {
    vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
}

/// All metrics for the scheduling engine.
pub struct Metrics {
    /// Prometheus registry for all metrics.
    pub registry: Registry,

    // =========================================================================
    // Counters
    // =========================================================================
    /// Total availability computations performed.
    pub availability_computations_total: IntCounter,
    /// Total bookings created.
    pub bookings_created_total: IntCounter,
    /// Total bookings cancelled.
    pub bookings_cancelled_total: IntCounter,
    /// Total booking attempts rejected with a conflict.
    pub booking_conflicts_total: IntCounter,
    /// Total cache hits.
    pub cache_hits_total: IntCounter,
    /// Total cache misses.
    pub cache_misses_total: IntCounter,
    /// Total cache entries evicted for size.
    pub cache_evictions_total: IntCounter,
    /// Total requests sent to the external calendar provider.
    pub remote_requests_total: IntCounter,
    /// Total failed provider requests.
    pub remote_request_errors_total: IntCounter,
    /// Total credential refresh operations started.
    pub credential_refreshes_total: IntCounter,
    /// Total credential refreshes that exhausted their retries.
    pub credential_refresh_failures_total: IntCounter,

    // =========================================================================
    // Gauges
    // =========================================================================
    /// Uptime in seconds.
    pub uptime_seconds: IntGauge,

    // =========================================================================
    // Histograms (durations in seconds)
    // =========================================================================
    /// Availability computation duration.
    pub availability_duration_seconds: Histogram,

    start_time: RwLock<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with all metrics registered.
    pub fn new() -> Self {
        let registry = Registry::new();

        let availability_computations_total = IntCounter::new(
            "rota_availability_computations_total",
            "Total availability computations performed",
        )
        .expect("failed to create counter");

        let bookings_created_total =
            IntCounter::new("rota_bookings_created_total", "Total bookings created")
                .expect("failed to create counter");

        let bookings_cancelled_total =
            IntCounter::new("rota_bookings_cancelled_total", "Total bookings cancelled")
                .expect("failed to create counter");

        let booking_conflicts_total = IntCounter::new(
            "rota_booking_conflicts_total",
            "Total booking attempts rejected with a conflict",
        )
        .expect("failed to create counter");

        let cache_hits_total = IntCounter::new("rota_cache_hits_total", "Total cache hits")
            .expect("failed to create counter");

        let cache_misses_total = IntCounter::new("rota_cache_misses_total", "Total cache misses")
            .expect("failed to create counter");

        let cache_evictions_total = IntCounter::new(
            "rota_cache_evictions_total",
            "Total cache entries evicted for size",
        )
        .expect("failed to create counter");

        let remote_requests_total = IntCounter::new(
            "rota_remote_requests_total",
            "Total requests sent to the external calendar provider",
        )
        .expect("failed to create counter");

        let remote_request_errors_total = IntCounter::new(
            "rota_remote_request_errors_total",
            "Total failed provider requests",
        )
        .expect("failed to create counter");

        let credential_refreshes_total = IntCounter::new(
            "rota_credential_refreshes_total",
            "Total credential refresh operations started",
        )
        .expect("failed to create counter");

        let credential_refresh_failures_total = IntCounter::new(
            "rota_credential_refresh_failures_total",
            "Total credential refreshes that exhausted their retries",
        )
        .expect("failed to create counter");

        let uptime_seconds = IntGauge::new("rota_uptime_seconds", "Uptime in seconds")
            .expect("failed to create gauge");

        let availability_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "rota_availability_duration_seconds",
                "Availability computation duration in seconds",
            )
            .buckets(latency_buckets()),
        )
        .expect("failed to create histogram");

        for collector in [
            Box::new(availability_computations_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(bookings_created_total.clone()),
            Box::new(bookings_cancelled_total.clone()),
            Box::new(booking_conflicts_total.clone()),
            Box::new(cache_hits_total.clone()),
            Box::new(cache_misses_total.clone()),
            Box::new(cache_evictions_total.clone()),
            Box::new(remote_requests_total.clone()),
            Box::new(remote_request_errors_total.clone()),
            Box::new(credential_refreshes_total.clone()),
            Box::new(credential_refresh_failures_total.clone()),
            Box::new(uptime_seconds.clone()),
            Box::new(availability_duration_seconds.clone()),
        ] {
            registry
                .register(collector)
                .expect("failed to register metric");
        }

        Self {
            registry,
            availability_computations_total,
            bookings_created_total,
            bookings_cancelled_total,
            booking_conflicts_total,
            cache_hits_total,
            cache_misses_total,
            cache_evictions_total,
            remote_requests_total,
            remote_request_errors_total,
            credential_refreshes_total,
            credential_refresh_failures_total,
            uptime_seconds,
            availability_duration_seconds,
            start_time: RwLock::new(Instant::now()),
        }
    }

    /// Update and return the uptime gauge.
    pub fn update_uptime(&self) -> i64 {
        let uptime = self.start_time.read().elapsed().as_secs() as i64;
        self.uptime_seconds.set(uptime);
        uptime
    }

    /// A serializable snapshot of the counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            availability_computations: self.availability_computations_total.get(),
            bookings_created: self.bookings_created_total.get(),
            bookings_cancelled: self.bookings_cancelled_total.get(),
            booking_conflicts: self.booking_conflicts_total.get(),
            cache_hits: self.cache_hits_total.get(),
            cache_misses: self.cache_misses_total.get(),
            remote_requests: self.remote_requests_total.get(),
            remote_request_errors: self.remote_request_errors_total.get(),
            credential_refreshes: self.credential_refreshes_total.get(),
            uptime_seconds: self.update_uptime(),
        }
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn export(&self) -> String {
        use prometheus::Encoder;
        self.update_uptime();
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub availability_computations: u64,
    pub bookings_created: u64,
    pub bookings_cancelled: u64,
    pub booking_conflicts: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub remote_requests: u64,
    pub remote_request_errors: u64,
    pub credential_refreshes: u64,
    pub uptime_seconds: i64,
}
