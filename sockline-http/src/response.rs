use bytes::Bytes;

use crate::error::HttpError;

/// A decoded HTTP/1.1 response.
#[derive(Debug, Clone)]
pub struct Response {
    version: String,
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Response {
    pub(crate) fn new(
        version: String,
        status: u16,
        status_text: String,
        headers: Vec<(String, String)>,
        body: Bytes,
    ) -> Self {
        Self {
            version,
            status,
            status_text,
            headers,
            body,
        }
    }

    /// HTTP status code (e.g. 200, 404).
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase from the status line. Only its first word is kept.
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Protocol token from the status line, e.g. `HTTP/1.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Response headers as (name, value) pairs, one per distinct name.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Get the header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Consume the response and return the body bytes.
    pub fn bytes(self) -> Bytes {
        self.body
    }

    /// Consume the response and return the body as UTF-8 text.
    pub fn text(self) -> Result<String, HttpError> {
        String::from_utf8(self.body.to_vec()).map_err(|_| HttpError::Parse)
    }

    /// Reference to the body bytes without consuming.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}
