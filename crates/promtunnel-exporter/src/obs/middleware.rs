//! Recording middleware.
//!
//! Wraps a handler, times it, and records the status of the response it
//! produced. The response itself is forwarded untouched. A handler that never
//! sets a status yields 200, which is what gets recorded.
//!
//! Metrics are written only after the wrapped handler has returned. If the
//! handler panics the observation is skipped.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    Router,
};

use super::metrics::ProxyMetrics;

/// `axum::middleware::from_fn_with_state` compatible recorder.
pub async fn record_metrics(
    State(metrics): State<ProxyMetrics>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();
    metrics.observe(status, elapsed);

    tracing::debug!(
        status = status.as_u16(),
        duration_ms = elapsed.as_millis() as u64,
        "request recorded"
    );

    response
}

/// Apply [`record_metrics`] to every route of `router`.
///
/// Installed as a route layer, so requests that match no route (the router's
/// fallback) are not counted. Add routes before calling this; axum rejects a
/// route layer on an empty router.
pub fn instrument<S>(router: Router<S>, metrics: ProxyMetrics) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(metrics, record_metrics))
}
