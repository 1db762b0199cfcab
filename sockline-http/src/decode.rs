//! HTTP/1.1 response decoding over a line stream.
//!
//! The decoder reads a status line, `name: value` headers up to the first
//! empty line, and then a chunked body: a hexadecimal size line followed by
//! a payload line, repeated until a zero size. The zero-size line closes the
//! session through [`Closeable`] and completes the response.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use sockline::Closeable;
use tracing::{debug, trace};

use crate::error::HttpError;
use crate::response::Response;

/// Read one response from `lines`.
///
/// Returns `Ok(None)` when the first line is missing or empty, or has fewer
/// than two space-separated tokens. Each line pull is bounded by `timeout`
/// when set.
pub async fn read_response<L, C>(
    lines: &mut L,
    closer: &C,
    timeout: Option<Duration>,
) -> Result<Option<Response>, HttpError>
where
    L: Stream<Item = Result<Bytes, HttpError>> + Unpin,
    C: Closeable + ?Sized,
{
    let Some(first) = next_line(lines, timeout).await? else {
        return Ok(None);
    };
    let status_line =
        as_text(&first).ok_or_else(|| HttpError::MalformedStatus(lossy(&first)))?;
    let Some((version, status, status_text)) = parse_status_line(status_line)? else {
        debug!(status_line, "no status line, no response");
        return Ok(None);
    };

    let mut headers = Headers::default();
    loop {
        let line = next_line(lines, timeout).await?.ok_or(HttpError::Truncated)?;
        if line.is_empty() {
            break;
        }
        let text = as_text(&line).ok_or_else(|| HttpError::MalformedHeader(lossy(&line)))?;
        let (name, value) = text
            .split_once(':')
            .ok_or_else(|| HttpError::MalformedHeader(text.to_string()))?;
        headers.set(name.trim(), value.trim());
    }

    let encoding = headers.get("transfer-encoding").map(str::to_string);
    let chunked = encoding
        .as_deref()
        .is_some_and(|e| e.eq_ignore_ascii_case("chunked"));

    let mut body = BytesMut::new();
    loop {
        let Some(line) = next_line(lines, timeout).await? else {
            if chunked {
                return Err(HttpError::Truncated);
            }
            break;
        };
        if line.is_empty() {
            continue;
        }
        if !chunked {
            return Err(HttpError::UnsupportedEncoding(encoding));
        }

        let size = parse_chunk_size(&line)?;
        trace!(size, "chunk");
        if size == 0 {
            closer.close();
            break;
        }
        let payload = next_line(lines, timeout)
            .await?
            .ok_or(HttpError::ChunkWithoutPayload)?;
        body.extend_from_slice(&payload);
    }

    debug!(status, body_len = body.len(), "response decoded");
    Ok(Some(Response::new(
        version.to_string(),
        status,
        status_text.to_string(),
        headers.into_vec(),
        body.freeze(),
    )))
}

async fn next_line<L>(lines: &mut L, timeout: Option<Duration>) -> Result<Option<Bytes>, HttpError>
where
    L: Stream<Item = Result<Bytes, HttpError>> + Unpin,
{
    let item = match timeout {
        Some(limit) => tokio::time::timeout(limit, lines.next())
            .await
            .map_err(|_| HttpError::Timeout)?,
        None => lines.next().await,
    };
    item.transpose()
}

/// Split a status line into protocol, code and reason. Tokens after the
/// third are dropped.
fn parse_status_line(line: &str) -> Result<Option<(&str, u16, &str)>, HttpError> {
    let mut tokens = line.split(' ');
    let (Some(version), Some(code)) = (tokens.next(), tokens.next()) else {
        return Ok(None);
    };
    if version.is_empty() {
        return Ok(None);
    }
    let status = code
        .trim()
        .parse::<u16>()
        .map_err(|_| HttpError::MalformedStatus(line.to_string()))?;
    Ok(Some((version, status, tokens.next().unwrap_or(""))))
}

/// Parse a hexadecimal chunk size, ignoring extensions after `;`.
fn parse_chunk_size(line: &[u8]) -> Result<usize, HttpError> {
    let text = as_text(line).ok_or_else(|| HttpError::InvalidChunkSize(lossy(line)))?;
    let digits = text.split(';').next().unwrap_or("").trim();
    usize::from_str_radix(digits, 16).map_err(|_| HttpError::InvalidChunkSize(text.to_string()))
}

fn as_text(line: &[u8]) -> Option<&str> {
    std::str::from_utf8(line).ok()
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

/// Header map: one entry per case-insensitive name, last write wins.
#[derive(Default)]
struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    fn set(&mut self, name: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => *entry = (name.to_string(), value.to_string()),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn into_vec(self) -> Vec<(String, String)> {
        self.entries
    }
}
