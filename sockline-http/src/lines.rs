//! CRLF line reassembly over a chunk stream.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes, BytesMut};
use futures::Stream;
use pin_project_lite::pin_project;
use tracing::warn;

use crate::error::HttpError;

pin_project! {
    /// Splits a stream of byte chunks into CRLF-terminated lines.
    ///
    /// Lines are reassembled across chunk boundaries, including a CR/LF
    /// pair split between two chunks. The terminator is not part of the
    /// yielded line. When the input ends, an unterminated tail is yielded
    /// as a final line. Input errors pass through.
    ///
    /// A line longer than `max_line` bytes fails the stream with
    /// [`HttpError::LineTooLong`]; nothing is yielded after that.
    pub struct Lines<S> {
        #[pin]
        inner: S,
        carry: BytesMut,
        // Bytes of `carry` already searched for a terminator.
        scanned: usize,
        max_line: usize,
        done: bool,
    }
}

impl<S> Lines<S> {
    pub fn new(inner: S, max_line: usize) -> Self {
        Self {
            inner,
            carry: BytesMut::new(),
            scanned: 0,
            max_line,
            done: false,
        }
    }
}

impl<S, E> Stream for Lines<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<HttpError>,
{
    type Item = Result<Bytes, HttpError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(line) = take_line(this.carry, this.scanned) {
                return Poll::Ready(Some(Ok(line)));
            }
            if *this.done {
                if this.carry.is_empty() {
                    return Poll::Ready(None);
                }
                *this.scanned = 0;
                return Poll::Ready(Some(Ok(this.carry.split().freeze())));
            }
            // A trailing CR may still turn out to be part of the terminator.
            let pending = this.carry.len() - usize::from(this.carry.ends_with(b"\r"));
            if pending > *this.max_line {
                warn!(buffered = this.carry.len(), max = *this.max_line, "line too long");
                this.carry.clear();
                *this.scanned = 0;
                *this.done = true;
                return Poll::Ready(Some(Err(HttpError::LineTooLong {
                    max: *this.max_line,
                })));
            }
            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => this.carry.extend_from_slice(&chunk),
                Some(Err(e)) => return Poll::Ready(Some(Err(e.into()))),
                None => *this.done = true,
            }
        }
    }
}

/// Split the first complete line off `carry`.
fn take_line(carry: &mut BytesMut, scanned: &mut usize) -> Option<Bytes> {
    // A CR at the end of the previous scan may pair with a new LF.
    let from = scanned.saturating_sub(1);
    match carry[from..].windows(2).position(|w| w == b"\r\n") {
        Some(offset) => {
            let line = carry.split_to(from + offset).freeze();
            carry.advance(2);
            *scanned = 0;
            Some(line)
        }
        None => {
            *scanned = carry.len();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::executor::block_on;
    use futures::stream;

    fn chunks_of(chunks: &[&'static str]) -> impl Stream<Item = Result<Bytes, HttpError>> {
        stream::iter(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    fn lines_of(chunks: &[&'static str]) -> Vec<String> {
        block_on(Lines::new(chunks_of(chunks), 1024).collect::<Vec<_>>())
            .into_iter()
            .map(|l| String::from_utf8(l.unwrap().to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn splits_single_chunk() {
        assert_eq!(
            lines_of(&["HTTP/1.1 200 OK\r\nA: b\r\n\r\n"]),
            vec!["HTTP/1.1 200 OK", "A: b", ""]
        );
    }

    #[test]
    fn merges_across_chunks() {
        assert_eq!(
            lines_of(&["HTTP/1.1 2", "00 OK\r", "\nWi", "ki\r\n"]),
            vec!["HTTP/1.1 200 OK", "Wiki"]
        );
    }

    #[test]
    fn emits_unterminated_tail() {
        assert_eq!(lines_of(&["a\r\nb", "c"]), vec!["a", "bc"]);
        assert!(lines_of(&[]).is_empty());
    }

    #[test]
    fn passes_errors_through() {
        let input = stream::iter(vec![
            Ok(Bytes::from_static(b"x\r\n")),
            Err(sockline::Error::ConcurrentRead),
        ]);
        let items = block_on(Lines::new(input, 1024).collect::<Vec<_>>());
        assert!(matches!(
            items.as_slice(),
            [
                Ok(line),
                Err(HttpError::Transport(sockline::Error::ConcurrentRead)),
            ] if line == "x"
        ));
    }

    #[test]
    fn overlong_line_fails_the_stream() {
        // No terminator ever arrives.
        let lines = Lines::new(chunks_of(&["ok\r\n", "aaaa", "aaaa", "aaaa", "aaaa"]), 8);
        let items = block_on(lines.collect::<Vec<_>>());
        assert!(matches!(
            items.as_slice(),
            [Ok(line), Err(HttpError::LineTooLong { max: 8 })] if line == "ok"
        ));

        // A line of exactly the limit is fine.
        let lines = Lines::new(chunks_of(&["abcd", "efgh\r\nz"]), 8);
        let items: Vec<_> = block_on(lines.collect::<Vec<_>>())
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(items, vec![Bytes::from_static(b"abcdefgh"), Bytes::from_static(b"z")]);
    }
}
