//! Prometheus metrics registry for the Educar timetable service.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it to the
//! API state and the HTTP metrics middleware.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Schedule entries successfully created.
    pub entries_created_total: Counter,
    /// Schedule entries successfully updated.
    pub entries_updated_total: Counter,
    /// Delete requests that completed (including deletes of unknown ids).
    pub entries_deleted_total: Counter,
    /// Writes and checks rejected because of an overlapping slot.
    pub conflicts_total: Counter,
    /// Requests rejected before reaching the store.
    pub validation_failures_total: Counter,
    /// HTTP request count, labelled by method, path, and status code.
    pub http_requests_total: CounterVec,
    /// HTTP request latency histogram in seconds.
    pub http_request_duration: Histogram,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let entries_created_total = Counter::with_opts(Opts::new(
            "educar_schedule_entries_created_total",
            "Schedule entries created",
        ))?;

        let entries_updated_total = Counter::with_opts(Opts::new(
            "educar_schedule_entries_updated_total",
            "Schedule entries updated",
        ))?;

        let entries_deleted_total = Counter::with_opts(Opts::new(
            "educar_schedule_entries_deleted_total",
            "Schedule entry deletions",
        ))?;

        let conflicts_total = Counter::with_opts(Opts::new(
            "educar_schedule_conflicts_total",
            "Schedule writes or checks rejected for overlapping an existing entry",
        ))?;

        let validation_failures_total = Counter::with_opts(Opts::new(
            "educar_schedule_validation_failures_total",
            "Schedule requests rejected by validation",
        ))?;

        let http_requests_total = CounterVec::new(
            Opts::new(
                "educar_http_requests_total",
                "HTTP requests by method, path, and status",
            ),
            &["method", "path", "status"],
        )?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "educar_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        registry.register(Box::new(entries_created_total.clone()))?;
        registry.register(Box::new(entries_updated_total.clone()))?;
        registry.register(Box::new(entries_deleted_total.clone()))?;
        registry.register(Box::new(conflicts_total.clone()))?;
        registry.register(Box::new(validation_failures_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            entries_created_total,
            entries_updated_total,
            entries_deleted_total,
            conflicts_total,
            validation_failures_total,
            http_requests_total,
            http_request_duration,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
