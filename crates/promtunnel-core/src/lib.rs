//! promtunnel core: the error surface shared by the exporter and the facade.
//!
//! This crate carries no runtime or HTTP dependencies so the error type can be
//! reused by anything that embeds the exporter.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `TunnelError`/`Result`; only the binary
//! decides what is fatal.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;

/// Shared result type.
pub use error::{ErrorKind, Result, TunnelError};
