//! sockline transport and session metrics.
//!
//! Byte and message counters for the message socket, plus session lifecycle
//! counts. Exposed through metriken for whatever exporter the host installs.

use crate::counter::Counter;
use metriken::metric;

// ── Transport ────────────────────────────────────────────────────

#[metric(
    name = "sockline/transport/bytes_received",
    description = "Total bytes received from the message socket"
)]
pub static BYTES_RECEIVED: Counter = Counter::new();

#[metric(
    name = "sockline/transport/bytes_sent",
    description = "Total bytes handed to the message socket"
)]
pub static BYTES_SENT: Counter = Counter::new();

#[metric(
    name = "sockline/transport/sends_dropped",
    description = "Outbound messages dropped because the socket was not open"
)]
pub static SENDS_DROPPED: Counter = Counter::new();

#[metric(
    name = "sockline/transport/recv_resizes",
    description = "Receive queue reallocations"
)]
pub static RECV_RESIZES: Counter = Counter::new();

// ── Sessions ─────────────────────────────────────────────────────

#[metric(
    name = "sockline/session/opened",
    description = "TLS sessions opened over a message socket"
)]
pub static SESSIONS_OPENED: Counter = Counter::new();

#[metric(
    name = "sockline/session/faulted",
    description = "TLS sessions that ended with an error"
)]
pub static SESSIONS_FAULTED: Counter = Counter::new();
