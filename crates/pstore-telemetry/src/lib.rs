// Path: crates/pstore-telemetry/src/lib.rs

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! Observability for pstore: `tracing` initialisation ([`init_tracing`]) and
//! a small Prometheus registry ([`metrics`]), mirroring the teacher's
//! `ioi-telemetry` crate but scoped to pstore's own counters.

pub mod init;
pub mod metrics;

pub use init::init_tracing;
