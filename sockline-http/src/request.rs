//! Request description and HTTP/1.1 serialization.

use bytes::{BufMut, Bytes, BytesMut};
use url::{Host, Url};

use crate::error::HttpError;

/// An HTTP request to send through the tunnel.
///
/// # Example
///
/// ```rust
/// use sockline_http::Request;
///
/// let req = Request::post("https://example.com/api?x=1")?
///     .header("Accept", "text/plain")
///     .body("ping");
/// assert_eq!(req.target(), "/api?x=1");
/// # Ok::<(), sockline_http::HttpError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    url: Url,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Request {
    /// Build a request. The URL must be absolute and name a host.
    pub fn new(method: &str, url: &str) -> Result<Self, HttpError> {
        let url = Url::parse(url).map_err(|e| HttpError::InvalidUrl(format!("{url}: {e}")))?;
        if url.host().is_none() {
            return Err(HttpError::InvalidUrl(format!("{url}: missing host")));
        }
        Ok(Self {
            method: method.to_string(),
            url,
            headers: Vec::new(),
            body: Bytes::new(),
        })
    }

    /// Build a GET request.
    pub fn get(url: &str) -> Result<Self, HttpError> {
        Self::new("GET", url)
    }

    /// Build a POST request.
    pub fn post(url: &str) -> Result<Self, HttpError> {
        Self::new("POST", url)
    }

    /// Add a header to the request.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Path and query, as written on the request line.
    pub fn target(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// `Host` header value: the host, plus the port when one is explicit.
    pub fn host_header(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Name the TLS session verifies the server certificate against.
    pub fn server_name(&self) -> Result<String, HttpError> {
        match self.url.host() {
            Some(Host::Domain(domain)) => Ok(domain.to_string()),
            Some(Host::Ipv4(ip)) => Ok(ip.to_string()),
            Some(Host::Ipv6(ip)) => Ok(ip.to_string()),
            None => Err(HttpError::InvalidUrl(format!("{}: missing host", self.url))),
        }
    }

    /// Serialize the request.
    ///
    /// Caller headers come first, then `Host`, `Content-Type` and
    /// `Content-Length` (body length in bytes). The head is followed by an
    /// empty line, the body, and one more empty line.
    pub fn encode(&self, content_type: &str) -> Bytes {
        let mut out = BytesMut::with_capacity(256 + self.body.len());
        out.put_slice(self.method.as_bytes());
        out.put_u8(b' ');
        out.put_slice(self.target().as_bytes());
        out.put_slice(b" HTTP/1.1\r\n");

        for (name, value) in &self.headers {
            put_header(&mut out, name, value);
        }
        put_header(&mut out, "Host", &self.host_header());
        put_header(&mut out, "Content-Type", content_type);
        put_header(&mut out, "Content-Length", &self.body.len().to_string());

        out.put_slice(b"\r\n");
        out.put_slice(&self.body);
        out.put_slice(b"\r\n\r\n");
        out.freeze()
    }
}

fn put_header(out: &mut BytesMut, name: &str, value: &str) {
    out.put_slice(name.as_bytes());
    out.put_slice(b": ");
    out.put_slice(value.as_bytes());
    out.put_slice(b"\r\n");
}
