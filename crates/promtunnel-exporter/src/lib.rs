//! promtunnel metrics exporter library entry.
//!
//! Owns the request instruments, the middleware that records them, and the
//! small exposition server that serves `/metrics` next to the liveness,
//! readiness, and version probes. Consumed by the binary (`main.rs`), by
//! the tunnel handlers it instruments, and by integration tests.

pub mod app_state;
pub mod config;
pub mod obs;
pub mod ops;
pub mod router;
pub mod server;
