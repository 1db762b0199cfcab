//! Byte buffering between a message socket and the TLS engine.

use tracing::{debug, info, warn};

use crate::buffer::{RecvQueue, SendQueue};
use crate::config::Config;
use crate::error::Result;
use crate::metrics;
use crate::socket::{MessageSocket, ReadyState};

/// Receive and send queues layered over a [`MessageSocket`].
///
/// Owned by exactly one session.
pub struct TransportQueue<S> {
    socket: S,
    recv: RecvQueue,
    send: SendQueue,
    closed: bool,
}

impl<S: MessageSocket> TransportQueue<S> {
    pub fn new(socket: S, config: &Config) -> Self {
        Self {
            socket,
            recv: RecvQueue::new(config.recv_buffer_size, config.recv_buffer_max),
            send: SendQueue::new(config.send_buffer_size),
            closed: false,
        }
    }

    /// Open the socket. Buffers start out empty.
    pub fn open(&mut self, endpoint: &str, protocols: &[String]) -> Result<()> {
        self.recv.reset();
        self.send.clear();
        self.closed = false;
        info!(endpoint, "opening message socket");
        self.socket.open(endpoint, protocols)?;
        Ok(())
    }

    /// Queue `data` and flush immediately, one socket message per
    /// send-buffer capacity.
    ///
    /// When the socket is not open the data is dropped: there is no
    /// retry and no error, only a warning and the `sends_dropped` metric.
    pub fn enqueue_send(&mut self, data: &[u8]) -> Result<()> {
        let mut rest = data;
        while !rest.is_empty() {
            let taken = self.send.push(rest);
            rest = &rest[taken..];
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.send.is_empty() {
            return Ok(());
        }
        let len = self.send.pending().len();
        let sent = if self.socket.ready_state() == ReadyState::Open {
            Some(self.socket.send(self.send.pending()))
        } else {
            warn!(
                bytes = len,
                state = ?self.socket.ready_state(),
                "socket not open, dropping outbound message"
            );
            metrics::SENDS_DROPPED.increment();
            None
        };
        // A failed message is discarded too; it must not prefix the next one.
        self.send.clear();
        if let Some(sent) = sent {
            sent?;
            metrics::BYTES_SENT.add(len as u64);
        }
        Ok(())
    }

    /// Append an inbound message to the receive queue. Returns `false` when
    /// the message was ignored (empty, or the queue is closed).
    pub fn on_socket_message(&mut self, message: &[u8]) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        if message.is_empty() {
            debug!("ignoring empty message");
            return Ok(false);
        }
        self.recv.append(message)?;
        metrics::BYTES_RECEIVED.add(message.len() as u64);
        Ok(true)
    }

    /// Compact after a message was handled.
    pub fn after_message(&mut self) -> Result<()> {
        self.recv.settle()
    }

    pub fn recv(&self) -> &RecvQueue {
        &self.recv
    }

    pub fn recv_mut(&mut self) -> &mut RecvQueue {
        &mut self.recv
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the socket. Later inbound messages are ignored.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if matches!(
            self.socket.ready_state(),
            ReadyState::Open | ReadyState::Connecting
        ) {
            info!("closing message socket");
        }
        self.socket.close();
    }
}
