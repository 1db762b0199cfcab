//! Message socket abstraction.
//!
//! A message socket delivers discrete binary messages rather than a byte
//! stream (a WebSocket is the typical case). The bridge only needs to open
//! it, send messages, close it, and observe its events.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use futures::channel::mpsc;
use futures::stream::StreamExt;

/// Connection state of a message socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// `open` not called yet.
    Idle,
    /// `open` called, `Open` event not delivered yet.
    Connecting,
    Open,
    Closed,
}

/// Events reported by a message socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The socket finished connecting and accepts sends.
    Open,
    /// A binary message arrived.
    Message(Bytes),
    /// The peer or the local side closed the socket.
    Close,
    /// The socket failed. No further events follow except `Close`.
    Error(String),
}

/// A message-oriented socket.
pub trait MessageSocket {
    /// Begin connecting to `endpoint`. Completion is reported by an
    /// [`SocketEvent::Open`] event.
    fn open(&mut self, endpoint: &str, protocols: &[String]) -> io::Result<()>;

    /// Current connection state.
    fn ready_state(&self) -> ReadyState;

    /// Send one binary message.
    fn send(&mut self, message: &[u8]) -> io::Result<()>;

    /// Close the socket. Pending and future messages are discarded.
    fn close(&mut self);

    /// Poll for the next event. `Ready(None)` once the socket is finished.
    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<SocketEvent>>;
}

// ── In-memory socket ─────────────────────────────────────────────

/// In-memory message socket, one half of a [`ChannelSocket::pair`].
///
/// Messages sent here arrive at the [`ChannelPeer`] and vice versa. The
/// `Open` event is delivered on the first poll after [`open`](MessageSocket::open).
/// Dropping the peer closes the socket.
pub struct ChannelSocket {
    state: ReadyState,
    endpoint: Option<String>,
    open_pending: bool,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    inbound: mpsc::UnboundedReceiver<Bytes>,
}

/// The far end of a [`ChannelSocket`].
pub struct ChannelPeer {
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: mpsc::UnboundedReceiver<Bytes>,
}

impl ChannelSocket {
    /// Create a connected socket/peer pair.
    pub fn pair() -> (ChannelSocket, ChannelPeer) {
        let (to_peer, from_socket) = mpsc::unbounded();
        let (to_socket, from_peer) = mpsc::unbounded();
        let socket = ChannelSocket {
            state: ReadyState::Idle,
            endpoint: None,
            open_pending: false,
            outbound: Some(to_peer),
            inbound: from_peer,
        };
        let peer = ChannelPeer {
            outbound: to_socket,
            inbound: from_socket,
        };
        (socket, peer)
    }

    /// Endpoint passed to `open`, if any.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

impl MessageSocket for ChannelSocket {
    fn open(&mut self, endpoint: &str, _protocols: &[String]) -> io::Result<()> {
        if self.state != ReadyState::Idle {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "channel socket already opened",
            ));
        }
        self.endpoint = Some(endpoint.to_string());
        self.state = ReadyState::Connecting;
        self.open_pending = true;
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        self.state
    }

    fn send(&mut self, message: &[u8]) -> io::Result<()> {
        let tx = match (&self.state, &self.outbound) {
            (ReadyState::Open, Some(tx)) => tx,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "channel socket not open",
                ));
            }
        };
        tx.unbounded_send(Bytes::copy_from_slice(message))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel peer dropped"))
    }

    fn close(&mut self) {
        self.state = ReadyState::Closed;
        self.open_pending = false;
        self.outbound = None;
        self.inbound.close();
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<SocketEvent>> {
        match self.state {
            ReadyState::Closed => return Poll::Ready(None),
            ReadyState::Idle => return Poll::Pending,
            ReadyState::Connecting | ReadyState::Open => {}
        }

        if self.open_pending {
            self.open_pending = false;
            self.state = ReadyState::Open;
            return Poll::Ready(Some(SocketEvent::Open));
        }

        match self.inbound.poll_next_unpin(cx) {
            Poll::Ready(Some(msg)) => Poll::Ready(Some(SocketEvent::Message(msg))),
            Poll::Ready(None) => {
                self.state = ReadyState::Closed;
                self.outbound = None;
                Poll::Ready(Some(SocketEvent::Close))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl ChannelPeer {
    /// Send a message to the socket side.
    pub fn send(&self, message: impl Into<Bytes>) -> io::Result<()> {
        self.outbound
            .unbounded_send(message.into())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel socket closed"))
    }

    /// Receive the next message sent by the socket side. `None` once the
    /// socket has been closed or dropped.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inbound.next().await
    }
}

impl Stream for ChannelPeer {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.inbound.poll_next_unpin(cx)
    }
}
