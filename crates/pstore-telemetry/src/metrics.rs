// Path: crates/pstore-telemetry/src/metrics.rs

//! Prometheus metrics for pstore (ambient stack, §1 of SPEC_FULL.md): counts
//! of committed transactions, allocated bytes, HAMT heap-promotions, and
//! WebSocket/HTTP traffic. Exposed as Prometheus text via
//! [`gather_metrics_text`], served from `GET /cmd/metrics`.

use once_cell::sync::OnceCell;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder,
};

static TRANSACTIONS_COMMITTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static BYTES_ALLOCATED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static HAMT_HEAP_PROMOTIONS_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static WS_FRAMES_SENT_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static WS_FRAMES_RECEIVED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static HTTP_REQUESTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

/// Records one committed transaction.
pub fn inc_transactions_committed() {
    if let Some(m) = TRANSACTIONS_COMMITTED_TOTAL.get() {
        m.inc();
    }
}

/// Records `bytes` allocated within a transaction's arena.
pub fn inc_bytes_allocated(bytes: u64) {
    if let Some(m) = BYTES_ALLOCATED_TOTAL.get() {
        m.inc_by(bytes);
    }
}

/// Records one HAMT node promoted from store to heap during a mutation.
pub fn inc_hamt_heap_promotion() {
    if let Some(m) = HAMT_HEAP_PROMOTIONS_TOTAL.get() {
        m.inc();
    }
}

pub fn inc_ws_frames_sent() {
    if let Some(m) = WS_FRAMES_SENT_TOTAL.get() {
        m.inc();
    }
}

pub fn inc_ws_frames_received() {
    if let Some(m) = WS_FRAMES_RECEIVED_TOTAL.get() {
        m.inc();
    }
}

pub fn inc_http_requests(status_code: u16) {
    if let Some(m) = HTTP_REQUESTS_TOTAL.get() {
        m.with_label_values(&[&status_code.to_string()]).inc();
    }
}

/// Registers all collectors. Must be called at most once per process; safe
/// to call from `main` before either binary's event loop starts.
pub fn install() -> Result<(), prometheus::Error> {
    let _ = TRANSACTIONS_COMMITTED_TOTAL.set(register_int_counter!(
        "pstore_transactions_committed_total",
        "Total number of transactions committed to the store."
    )?);
    let _ = BYTES_ALLOCATED_TOTAL.set(register_int_counter!(
        "pstore_bytes_allocated_total",
        "Total bytes allocated within transaction arenas."
    )?);
    let _ = HAMT_HEAP_PROMOTIONS_TOTAL.set(register_int_counter!(
        "pstore_hamt_heap_promotions_total",
        "Total HAMT nodes promoted from the store to the heap during mutation."
    )?);
    let _ = WS_FRAMES_SENT_TOTAL.set(register_int_counter!(
        "pstore_ws_frames_sent_total",
        "Total WebSocket frames sent by the status server."
    )?);
    let _ = WS_FRAMES_RECEIVED_TOTAL.set(register_int_counter!(
        "pstore_ws_frames_received_total",
        "Total WebSocket frames received by the status server."
    )?);
    let _ = HTTP_REQUESTS_TOTAL.set(register_int_counter_vec!(
        "pstore_http_requests_total",
        "Total HTTP requests handled, by response status code.",
        &["status"]
    )?);
    Ok(())
}

/// Renders the current state of all collectors in Prometheus text format.
#[must_use]
pub fn gather_metrics_text() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        tracing::error!(error = %e, "failed to encode prometheus metrics");
    }
    String::from_utf8(buf).unwrap_or_default()
}
