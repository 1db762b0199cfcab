use std::io;

use thiserror::Error;

/// Errors returned by the sockline transport and TLS bridge.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the message socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The receive buffer would have to grow past its hard cap.
    #[error("receive buffer exceeded {max} bytes, a message needing {required} bytes could not fit")]
    BufferExceeded { required: usize, max: usize },
    /// The TLS engine reported a handshake or record-level failure.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
    /// The message socket reported an error event.
    #[error("socket error: {0}")]
    Socket(String),
    /// The server name is not a valid DNS name or IP address.
    #[error("invalid server name: {0}")]
    InvalidServerName(String),
    /// A trust anchor could not be parsed or added to the root store.
    #[error("trust anchor: {0}")]
    TrustAnchor(String),
    /// A second reader polled the plaintext stream while another was parked.
    #[error("plaintext stream already has a pending reader")]
    ConcurrentRead,
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
