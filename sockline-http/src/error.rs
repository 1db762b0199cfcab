/// Errors produced by the HTTP fetch path.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The tunneled TLS session or its transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] sockline::Error),

    /// Invalid URL or request target.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The status line has a non-numeric status code.
    #[error("malformed status line: {0:?}")]
    MalformedStatus(String),

    /// A header line has no colon.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// A chunk size line is not a hexadecimal number.
    #[error("invalid chunk size: {0:?}")]
    InvalidChunkSize(String),

    /// A chunk size line was the last line of the response.
    #[error("chunk length without payload")]
    ChunkWithoutPayload,

    /// A body line arrived without `Transfer-Encoding: chunked`.
    #[error("unsupported transfer encoding: {}", .0.as_deref().unwrap_or("none"))]
    UnsupportedEncoding(Option<String>),

    /// The response ended before it was complete.
    #[error("response truncated")]
    Truncated,

    /// A line grew past the limit without a terminator.
    #[error("response line longer than {max} bytes")]
    LineTooLong { max: usize },

    /// No line arrived within the read timeout.
    #[error("timeout")]
    Timeout,

    /// The trust anchors could not be loaded.
    #[error("trust store: {0}")]
    TrustStore(String),

    /// Response body parsing error.
    #[error("parse error")]
    Parse,
}
