//! Shared application state for the exposition server.
//!
//! Holds the metrics registry built once at startup, the readiness flag
//! flipped by `main`, and the build info served on `/version`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use promtunnel_core::error::Result;

use crate::obs::ProxyMetrics;

/// Build metadata reported by `/version`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_commit: &'static str,
    pub build_date: &'static str,
}

impl BuildInfo {
    /// Values baked in at compile time; `GIT_COMMIT` and `BUILD_DATE` are optional.
    pub fn from_env() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            git_commit: option_env!("GIT_COMMIT").unwrap_or("unknown"),
            build_date: option_env!("BUILD_DATE").unwrap_or("unknown"),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    metrics: ProxyMetrics,
}

struct AppStateInner {
    build: BuildInfo,
    ready: AtomicBool,
}

impl AppState {
    /// Build state with a freshly registered set of metrics.
    /// Returns Result so main can decide how to fail.
    pub fn new() -> Result<Self> {
        Ok(Self::with_metrics(ProxyMetrics::new()?))
    }

    /// Build state around metrics the caller already registered.
    pub fn with_metrics(metrics: ProxyMetrics) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                build: BuildInfo::from_env(),
                ready: AtomicBool::new(false),
            }),
            metrics,
        }
    }

    pub fn metrics(&self) -> &ProxyMetrics {
        &self.metrics
    }

    pub fn build_info(&self) -> &BuildInfo {
        &self.inner.build
    }

    pub fn mark_ready(&self) {
        self.inner.ready.store(true, Ordering::Relaxed);
    }

    pub fn mark_not_ready(&self) {
        self.inner.ready.store(false, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Relaxed)
    }
}
