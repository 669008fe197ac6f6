//! Prometheus instruments for proxied requests.
//!
//! Three instruments are registered once per registry:
//! - `proxy_total_requests` (counter)
//! - `proxy_request_duration_seconds` (histogram, default buckets)
//! - `proxy_response_status_total{status}` (counter vector)
//!
//! Names and help strings are scraped by existing dashboards and must not change.

use std::time::Duration;

use axum::http::StatusCode;
use prometheus::{
    core::Collector, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
    DEFAULT_BUCKETS,
};
use promtunnel_core::error::{Result, TunnelError};

pub const TOTAL_REQUESTS: &str = "proxy_total_requests";
pub const REQUEST_DURATION: &str = "proxy_request_duration_seconds";
pub const RESPONSE_STATUS: &str = "proxy_response_status_total";

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

fn registration(name: &str, e: prometheus::Error) -> TunnelError {
    TunnelError::Registration(format!("{name}: {e}"))
}

/// Request instruments plus the registry they are exposed through.
///
/// Cloning is cheap: every instrument and the registry are reference counted,
/// so clones observe into the same series.
#[derive(Clone)]
pub struct ProxyMetrics {
    registry: Registry,
    total_requests: IntCounter,
    request_duration: Histogram,
    response_status: IntCounterVec,
}

impl ProxyMetrics {
    /// Create the instruments on a fresh registry.
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create the instruments and register them with `registry`.
    ///
    /// Fails if any of the three names is already registered there; callers
    /// are expected to treat that as a startup error rather than retry.
    /// A failed call leaves `registry` as it found it.
    pub fn with_registry(registry: Registry) -> Result<Self> {
        tracing::info!("initializing Prometheus metrics");

        let total_requests = IntCounter::with_opts(Opts::new(
            TOTAL_REQUESTS,
            "Total number of requests received",
        ))
        .map_err(|e| registration(TOTAL_REQUESTS, e))?;

        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                REQUEST_DURATION,
                "Histogram of response latency (seconds) of requests.",
            )
            .buckets(DEFAULT_BUCKETS.to_vec()),
        )
        .map_err(|e| registration(REQUEST_DURATION, e))?;

        let response_status = IntCounterVec::new(
            Opts::new(
                RESPONSE_STATUS,
                "Total number of responses sent, partitioned by status code",
            ),
            &["status"],
        )
        .map_err(|e| registration(RESPONSE_STATUS, e))?;

        let metrics = Self {
            registry,
            total_requests,
            request_duration,
            response_status,
        };
        metrics.register_all()?;
        Ok(metrics)
    }

    fn collectors(&self) -> [(&'static str, Box<dyn Collector>); 3] {
        [
            (TOTAL_REQUESTS, Box::new(self.total_requests.clone()) as Box<dyn Collector>),
            (REQUEST_DURATION, Box::new(self.request_duration.clone()) as Box<dyn Collector>),
            (RESPONSE_STATUS, Box::new(self.response_status.clone()) as Box<dyn Collector>),
        ]
    }

    /// Register all three or none: on failure the ones already added are removed again.
    fn register_all(&self) -> Result<()> {
        for (i, (name, collector)) in self.collectors().into_iter().enumerate() {
            if let Err(e) = self.registry.register(collector) {
                for (_, added) in self.collectors().into_iter().take(i) {
                    let _ = self.registry.unregister(added);
                }
                return Err(registration(name, e));
            }
        }
        Ok(())
    }

    /// Record one completed request.
    pub fn observe(&self, status: StatusCode, elapsed: Duration) {
        self.request_duration.observe(elapsed.as_secs_f64());
        self.total_requests.inc();
        self.response_status
            .with_label_values(&[status.as_str()])
            .inc();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.get()
    }

    /// Count recorded for one status code.
    ///
    /// Reading a status that was never observed materializes a zero series.
    pub fn status_count(&self, status: StatusCode) -> u64 {
        self.response_status
            .with_label_values(&[status.as_str()])
            .get()
    }

    pub fn duration_sample_count(&self) -> u64 {
        self.request_duration.get_sample_count()
    }

    pub fn duration_sample_sum(&self) -> f64 {
        self.request_duration.get_sample_sum()
    }

    /// Render the registry in the text exposition format.
    pub fn render(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|e| TunnelError::Internal(format!("encode metrics failed: {e}")))?;
        Ok(buf)
    }
}
