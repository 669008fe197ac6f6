//! Request metrics for the tunnel.
//!
//! `metrics` owns the three Prometheus instruments and their registry;
//! `middleware` is the decorator that feeds them from request handlers.
//! The `/metrics` handler renders the registry on every scrape.

pub mod metrics;
pub mod middleware;

pub use metrics::ProxyMetrics;
pub use middleware::{instrument, record_metrics};
