//! Fetch orchestration: one tunneled TLS session per request.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{Either, select};
use sockline::{MessageSocket, RustlsEngine, TlsBridge, TrustAnchorSet};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::anchors::TrustBundle;
use crate::decode::read_response;
use crate::error::HttpError;
use crate::lines::Lines;
use crate::request::Request;
use crate::response::Response;

/// Default `Content-Type` sent with every request.
pub const DEFAULT_CONTENT_TYPE: &str = "application/javascript";

/// Default bound on the wait for each response line.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Message socket endpoint every session is opened against.
    pub endpoint: String,
    /// Buffer sizes and socket sub-protocols for each session.
    pub transport: sockline::Config,
    /// `Content-Type` header value.
    pub content_type: String,
    /// Bound on the wait for each response line, handshake included.
    /// `None` waits forever.
    pub read_timeout: Option<Duration>,
}

impl FetchConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport: sockline::Config::default(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
        }
    }
}

/// Produces a fresh, unopened message socket for each fetch.
pub trait Connector {
    type Socket: MessageSocket;

    fn connect(&self) -> Self::Socket;
}

impl<F, S> Connector for F
where
    F: Fn() -> S,
    S: MessageSocket,
{
    type Socket = S;

    fn connect(&self) -> S {
        self()
    }
}

/// HTTPS client that tunnels each request through a message socket.
///
/// Trust anchors are loaded on the first fetch and shared by every clone
/// afterwards. A failed load is not cached: the next fetch tries again.
///
/// # Example
///
/// ```rust,ignore
/// let fetcher = Fetcher::new(
///     || WebSocket::new(),
///     TrustBundle::Embedded(vec![include_str!("../certs/root.pem")]),
///     FetchConfig::new("wss://relay.example.net/tunnel"),
/// );
/// let resp = fetcher.fetch(&Request::get("https://example.com/")?).await?;
/// ```
#[derive(Clone)]
pub struct Fetcher<C> {
    connector: C,
    bundle: Arc<TrustBundle>,
    config: Arc<FetchConfig>,
    anchors: Arc<OnceCell<TrustAnchorSet>>,
}

impl<C: Connector> Fetcher<C> {
    pub fn new(connector: C, bundle: TrustBundle, config: FetchConfig) -> Self {
        Self {
            connector,
            bundle: Arc::new(bundle),
            config: Arc::new(config),
            anchors: Arc::new(OnceCell::new()),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// The trust anchors, loading them on first use.
    pub async fn trust_anchors(&self) -> Result<&TrustAnchorSet, HttpError> {
        self.anchors
            .get_or_try_init(|| async {
                let loaded = self.bundle.load().await;
                if let Err(e) = &loaded {
                    warn!(error = %e, "trust anchor load failed");
                }
                loaded
            })
            .await
    }

    /// Send `request` over a new tunneled TLS session and decode the
    /// response.
    ///
    /// `Ok(None)` means the peer sent no status line.
    pub async fn fetch(&self, request: &Request) -> Result<Option<Response>, HttpError> {
        let anchors = self.trust_anchors().await?;
        let server_name = request.server_name()?;
        let transport = &self.config.transport;

        let engine = RustlsEngine::new(anchors, &server_name, transport.plaintext_chunk_size)?;
        let payload = request.encode(&self.config.content_type);
        let bridge = TlsBridge::new(self.connector.connect(), engine, transport, payload);
        let (plaintext, driver, handle) = bridge.open(&self.config.endpoint)?;
        info!(method = request.method(), url = %request.url(), "fetch started");

        let mut lines = Lines::new(plaintext, transport.recv_buffer_max);
        let decode = pin!(read_response(&mut lines, &handle, self.config.read_timeout));
        let result = match select(decode, driver).await {
            Either::Left((result, _driver)) => result,
            Either::Right(((), decode)) => {
                debug!(phase = ?handle.phase(), "socket finished before the response");
                decode.await
            }
        };
        handle.close();

        match &result {
            Ok(Some(resp)) => info!(status = resp.status(), "fetch complete"),
            Ok(None) => info!("fetch complete without a response"),
            Err(e) => warn!(error = %e, "fetch failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sockline::ChannelSocket;

    #[test]
    fn config_defaults() {
        let config = FetchConfig::new("ws://relay.test/");
        assert_eq!(config.endpoint, "ws://relay.test/");
        assert_eq!(config.content_type, "application/javascript");
        assert_eq!(config.read_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.transport.send_buffer_size, 10 * 1024);
    }

    #[tokio::test]
    async fn failed_trust_load_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(
            || ChannelSocket::pair().0,
            TrustBundle::Directory(dir.path().to_path_buf()),
            FetchConfig::new("ws://relay.test/"),
        );
        let clone = fetcher.clone();

        assert!(matches!(
            fetcher.trust_anchors().await,
            Err(HttpError::TrustStore(_))
        ));

        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        std::fs::write(dir.path().join("root.pem"), cert.cert.pem()).unwrap();

        assert_eq!(clone.trust_anchors().await.unwrap().len(), 1);
        // Shared with the original fetcher; the directory is not read again.
        std::fs::remove_file(dir.path().join("root.pem")).unwrap();
        assert_eq!(fetcher.trust_anchors().await.unwrap().len(), 1);
    }
}
