/// Initial receive buffer capacity (4 MiB).
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Hard cap on receive buffer growth (40 MiB).
pub const MAX_RECV_BUFFER_SIZE: usize = 40 * 1024 * 1024;

/// Send buffer capacity (10 KiB). Larger writes go out as several messages.
pub const DEFAULT_SEND_BUFFER_SIZE: usize = 10 * 1024;

/// Configuration for one tunneled TLS session.
#[derive(Clone, Debug)]
pub struct Config {
    /// Initial capacity of the receive buffer.
    pub recv_buffer_size: usize,
    /// Maximum capacity the receive buffer may grow to. Exceeding it fails
    /// the session with [`Error::BufferExceeded`](crate::Error::BufferExceeded).
    pub recv_buffer_max: usize,
    /// Fixed capacity of the send buffer. Each flush sends at most this many
    /// bytes as one socket message.
    pub send_buffer_size: usize,
    /// Scratch size used when draining decrypted plaintext from the engine.
    /// Each inbound-ready signal carries at most this many bytes.
    pub plaintext_chunk_size: usize,
    /// Sub-protocols requested when opening the message socket.
    pub subprotocols: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            recv_buffer_max: MAX_RECV_BUFFER_SIZE,
            send_buffer_size: DEFAULT_SEND_BUFFER_SIZE,
            plaintext_chunk_size: 16 * 1024,
            subprotocols: Vec::new(),
        }
    }
}
