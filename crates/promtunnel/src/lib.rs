//! Top-level facade crate for promtunnel.
//!
//! Re-exports the error types and the metrics exporter so users can depend on a single crate.

pub mod core {
    pub use promtunnel_core::*;
}

pub mod exporter {
    pub use promtunnel_exporter::*;
}
