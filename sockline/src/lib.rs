//! sockline — TLS client sessions tunneled over message-oriented sockets.
//!
//! A message socket (typically a WebSocket to a relay) carries raw TLS
//! records. sockline buffers those records, drives a rustls client over
//! them, and hands decrypted application data to a single consumer as a
//! [`futures::Stream`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use sockline::{ChannelSocket, Config, RustlsEngine, TlsBridge, TrustAnchorSet};
//!
//! # async fn run(anchors: TrustAnchorSet) -> Result<(), sockline::Error> {
//! let config = Config::default();
//! let (socket, _peer) = ChannelSocket::pair();
//! let engine = RustlsEngine::new(&anchors, "example.com", config.plaintext_chunk_size)?;
//! let request = &b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"[..];
//! let (mut plaintext, driver, _handle) =
//!     TlsBridge::new(socket, engine, &config, request).open("wss://relay/example.com:443")?;
//!
//! let read = async {
//!     while let Some(chunk) = plaintext.next().await {
//!         println!("{} bytes", chunk?.len());
//!     }
//!     Ok::<_, sockline::Error>(())
//! };
//! let (result, ()) = futures::join!(read, driver);
//! result
//! # }
//! ```
//!
//! # Threading
//!
//! A session is `!Send`. The stream, driver and handle share state through
//! `Rc<RefCell<..>>` and must be polled from the same task.

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod counter;
pub(crate) mod metrics;
pub(crate) mod notify;

// ── Public modules ──────────────────────────────────────────────────────
pub mod bridge;
pub mod buffer;
pub mod config;
pub mod error;
pub mod socket;
pub mod tls;
pub mod transport;
pub mod trust;

// ── Re-exports: Session ─────────────────────────────────────────────────

/// Something a response consumer can close.
pub use bridge::Closeable;
/// Future that pumps socket events into a session.
pub use bridge::Driver;
/// Decrypted application data in arrival order.
pub use bridge::PlaintextStream;
/// Consumer-side session control.
pub use bridge::SessionHandle;
/// Externally observable session phase.
pub use bridge::SessionPhase;
/// A TLS client session waiting to be opened.
pub use bridge::TlsBridge;

// ── Re-exports: Transport ───────────────────────────────────────────────

/// Growable receive queue with a read cursor.
pub use buffer::RecvQueue;
/// Fixed-capacity send queue.
pub use buffer::SendQueue;
/// In-memory message socket.
pub use socket::{ChannelPeer, ChannelSocket};
/// Message socket trait and its state/event types.
pub use socket::{MessageSocket, ReadyState, SocketEvent};
/// Receive/send buffering over a message socket.
pub use transport::TransportQueue;

// ── Re-exports: TLS ─────────────────────────────────────────────────────

/// rustls-backed TLS engine.
pub use tls::RustlsEngine;
/// Engine seam and its callbacks.
pub use tls::{TlsEngine, TlsEvents};
/// Negotiated protocol version, cipher suite and ALPN protocol.
pub use tls::TlsInfo;
/// Parsed trust anchors and their client configuration.
pub use trust::TrustAnchorSet;

// ── Re-exports: Shared types ────────────────────────────────────────────

/// Session configuration.
pub use config::Config;
/// Transport and session errors.
pub use error::{Error, Result};
