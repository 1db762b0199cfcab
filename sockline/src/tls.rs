//! TLS engine seam.
//!
//! The bridge drives a TLS client through two entry points, `handshake` and
//! `process`, and learns about progress only through [`TlsEvents`]
//! callbacks. [`RustlsEngine`] implements the seam with a rustls
//! `ClientConnection`.

use std::io::{self, Read as _, Write as _};

use rustls::ClientConnection;
use rustls::pki_types::ServerName;

use crate::error::{Error, Result};
use crate::trust::TrustAnchorSet;

/// Lifecycle notifications emitted by a [`TlsEngine`].
pub trait TlsEvents {
    /// Handshake finished, application data may be written.
    fn connected(&mut self);
    /// Ciphertext ready to go to the peer.
    fn outbound_ready(&mut self, ciphertext: &[u8]);
    /// Decrypted application data arrived.
    fn inbound_ready(&mut self, plaintext: &[u8]);
    /// The session closed cleanly.
    fn closed(&mut self);
    /// The session failed. No further events follow.
    fn faulted(&mut self, error: Error);
}

/// A TLS client state machine driven by the bridge.
pub trait TlsEngine {
    /// Start the handshake (emits the ClientHello).
    fn handshake(&mut self, events: &mut dyn TlsEvents);
    /// Feed ciphertext received from the peer.
    fn process(&mut self, ciphertext: &[u8], events: &mut dyn TlsEvents);
    /// Encrypt application data and emit it.
    fn prepare(&mut self, plaintext: &[u8], events: &mut dyn TlsEvents);
    /// Send close_notify and emit the resulting ciphertext.
    fn close(&mut self, events: &mut dyn TlsEvents);
    /// Negotiated session parameters, once the handshake has completed.
    fn info(&self) -> Option<TlsInfo> {
        None
    }
}

/// Parameters negotiated during the handshake.
#[derive(Debug, Clone)]
pub struct TlsInfo {
    pub protocol_version: Option<rustls::ProtocolVersion>,
    pub cipher_suite: Option<rustls::SupportedCipherSuite>,
    pub alpn_protocol: Option<Vec<u8>>,
}

/// [`TlsEngine`] backed by a rustls client connection.
pub struct RustlsEngine {
    conn: ClientConnection,
    handshake_complete: bool,
    closed: bool,
    /// Plaintext drain buffer.
    scratch: Vec<u8>,
    /// Ciphertext drain buffer.
    write_buf: Vec<u8>,
}

impl RustlsEngine {
    /// Create a client session for `server_name` trusting `anchors`.
    pub fn new(anchors: &TrustAnchorSet, server_name: &str, chunk_size: usize) -> Result<Self> {
        let name = ServerName::try_from(server_name.to_owned())
            .map_err(|_| Error::InvalidServerName(server_name.to_string()))?;
        let conn = ClientConnection::new(anchors.client_config(), name)?;
        Ok(Self {
            conn,
            handshake_complete: false,
            closed: false,
            scratch: vec![0u8; chunk_size.max(1)],
            write_buf: Vec::new(),
        })
    }

    /// Drain pending TLS output into `outbound_ready`.
    fn flush(&mut self, events: &mut dyn TlsEvents) {
        while self.conn.wants_write() {
            self.write_buf.clear();
            match self.conn.write_tls(&mut self.write_buf) {
                Ok(0) => break,
                Ok(_) => events.outbound_ready(&self.write_buf),
                Err(e) => {
                    self.fail(Error::Io(e), events);
                    return;
                }
            }
        }
    }

    /// Drain decrypted plaintext into `inbound_ready`.
    fn drain_plaintext(&mut self, events: &mut dyn TlsEvents) {
        loop {
            let read = self.conn.reader().read(&mut self.scratch);
            match read {
                Ok(0) => break,
                Ok(n) => events.inbound_ready(&self.scratch[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.fail(Error::Io(e), events);
                    break;
                }
            }
        }
    }

    fn fail(&mut self, error: Error, events: &mut dyn TlsEvents) {
        if !self.closed {
            self.closed = true;
            events.faulted(error);
        }
    }
}

impl TlsEngine for RustlsEngine {
    fn handshake(&mut self, events: &mut dyn TlsEvents) {
        self.flush(events);
    }

    fn process(&mut self, ciphertext: &[u8], events: &mut dyn TlsEvents) {
        if self.closed {
            return;
        }

        let mut cursor = io::Cursor::new(ciphertext);
        let mut peer_closed = false;
        while (cursor.position() as usize) < ciphertext.len() {
            match self.conn.read_tls(&mut cursor) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    self.fail(Error::Io(e), events);
                    return;
                }
            }

            let state = match self.conn.process_new_packets() {
                Ok(state) => state,
                Err(e) => {
                    // Get the alert out before reporting.
                    self.flush(events);
                    self.fail(Error::Tls(e), events);
                    return;
                }
            };

            if state.plaintext_bytes_to_read() > 0 {
                self.drain_plaintext(events);
            }
            peer_closed |= state.peer_has_closed();
        }

        self.flush(events);
        if self.closed {
            return;
        }

        if !self.handshake_complete && !self.conn.is_handshaking() {
            self.handshake_complete = true;
            events.connected();
        }

        if peer_closed {
            self.closed = true;
            events.closed();
        }
    }

    fn prepare(&mut self, plaintext: &[u8], events: &mut dyn TlsEvents) {
        if self.closed {
            return;
        }
        let written = self.conn.writer().write_all(plaintext);
        if let Err(e) = written {
            self.fail(Error::Io(e), events);
            return;
        }
        self.flush(events);
    }

    fn close(&mut self, events: &mut dyn TlsEvents) {
        if self.closed {
            return;
        }
        self.conn.send_close_notify();
        self.flush(events);
        self.closed = true;
    }

    fn info(&self) -> Option<TlsInfo> {
        if !self.handshake_complete {
            return None;
        }
        Some(TlsInfo {
            protocol_version: self.conn.protocol_version(),
            cipher_suite: self.conn.negotiated_cipher_suite(),
            alpn_protocol: self.conn.alpn_protocol().map(|p| p.to_vec()),
        })
    }
}
