//! TLS session bridged onto a message socket.
//!
//! [`TlsBridge::open`] splits a session into three handles that share one
//! `Rc<RefCell<..>>` and are meant to be polled from a single task:
//!
//! - [`Driver`] pumps socket events into the TLS engine. Engine output goes
//!   straight to the transport queue; decrypted plaintext is queued.
//! - [`PlaintextStream`] yields queued plaintext in arrival order and parks
//!   in a single-slot [`Notifier`] when nothing is queued.
//! - [`SessionHandle`] closes the session from the consumer side.
//!
//! Phases move only in response to engine or socket notifications:
//! `Handshaking → Established → (Closing | Faulted) → Closed`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics;
use crate::notify::{Notifier, ReaderId};
use crate::socket::{MessageSocket, SocketEvent};
use crate::tls::{TlsEngine, TlsEvents, TlsInfo};
use crate::transport::TransportQueue;

/// Externally observable TLS session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Handshaking,
    Established,
    /// Closed locally, waiting for the socket to finish.
    Closing,
    Faulted,
    Closed,
}

impl SessionPhase {
    /// Whether more plaintext may still arrive.
    pub fn is_active(self) -> bool {
        matches!(self, SessionPhase::Handshaking | SessionPhase::Established)
    }
}

/// Something the response consumer can close once it has read enough.
pub trait Closeable {
    fn close(&self);
}

struct BridgeState {
    phase: SessionPhase,
    plaintext: VecDeque<Bytes>,
    notifier: Notifier,
    fault: Option<Error>,
    connected: bool,
    next_reader: u64,
}

impl BridgeState {
    fn fault(&mut self, err: Error) {
        if matches!(self.phase, SessionPhase::Faulted | SessionPhase::Closed) {
            return;
        }
        error!(error = %err, phase = ?self.phase, "TLS session faulted");
        metrics::SESSIONS_FAULTED.increment();
        self.phase = SessionPhase::Faulted;
        self.fault = Some(err);
        self.notifier.notify();
    }

    fn finish(&mut self) {
        if matches!(self.phase, SessionPhase::Faulted | SessionPhase::Closed) {
            return;
        }
        debug!(phase = ?self.phase, "TLS session closed");
        self.phase = SessionPhase::Closed;
        self.notifier.notify();
    }
}

/// Engine callbacks with access to the transport for outbound ciphertext.
struct Signals<'a, S> {
    transport: &'a mut TransportQueue<S>,
    state: &'a mut BridgeState,
}

impl<S: MessageSocket> TlsEvents for Signals<'_, S> {
    fn connected(&mut self) {
        if self.state.phase == SessionPhase::Handshaking {
            self.state.phase = SessionPhase::Established;
            self.state.connected = true;
        }
    }

    fn outbound_ready(&mut self, ciphertext: &[u8]) {
        if ciphertext.is_empty() {
            return;
        }
        if let Err(e) = self.transport.enqueue_send(ciphertext) {
            self.state.fault(e);
        }
    }

    fn inbound_ready(&mut self, plaintext: &[u8]) {
        if plaintext.is_empty() {
            return;
        }
        self.state
            .plaintext
            .push_back(Bytes::copy_from_slice(plaintext));
        self.state.notifier.notify();
    }

    fn closed(&mut self) {
        self.state.finish();
    }

    fn faulted(&mut self, error: Error) {
        self.state.fault(error);
    }
}

struct Session<S, E> {
    transport: TransportQueue<S>,
    engine: E,
    state: BridgeState,
    /// Written as the first application data once the handshake completes.
    request: Option<Bytes>,
    scratch: Vec<u8>,
    protocols: Vec<String>,
}

impl<S: MessageSocket, E: TlsEngine> Session<S, E> {
    /// Run an engine call with the bridge's callbacks, then write the
    /// pending request if that call completed the handshake.
    fn drive(&mut self, call: impl FnOnce(&mut E, &mut dyn TlsEvents)) {
        let mut signals = Signals {
            transport: &mut self.transport,
            state: &mut self.state,
        };
        call(&mut self.engine, &mut signals);

        if signals.state.connected {
            signals.state.connected = false;
            match self.engine.info() {
                Some(tls) => info!(
                    version = ?tls.protocol_version,
                    cipher_suite = ?tls.cipher_suite.map(|s| s.suite()),
                    "TLS handshake complete"
                ),
                None => info!("TLS handshake complete"),
            }
            if let Some(request) = self.request.take() {
                self.engine.prepare(&request, &mut signals);
            }
        }

        if self.state.phase == SessionPhase::Faulted {
            self.transport.close();
        }
    }

    fn on_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Open => {
                debug!("message socket open, starting TLS handshake");
                self.drive(|engine, events| engine.handshake(events));
            }
            SocketEvent::Message(message) => self.on_message(&message),
            SocketEvent::Close => {
                debug!("message socket closed");
                self.state.finish();
                self.transport.close();
            }
            SocketEvent::Error(reason) => {
                self.state.fault(Error::Socket(reason));
                self.transport.close();
            }
        }
    }

    fn on_message(&mut self, message: &[u8]) {
        match self.transport.on_socket_message(message) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                self.state.fault(e);
                self.transport.close();
                return;
            }
        }

        let mut ciphertext = std::mem::take(&mut self.scratch);
        ciphertext.clear();
        ciphertext.extend_from_slice(self.transport.recv_mut().shift_all());
        self.drive(|engine, events| engine.process(&ciphertext, events));
        self.scratch = ciphertext;

        if let Err(e) = self.transport.after_message() {
            self.state.fault(e);
            self.transport.close();
        }
    }

    fn close(&mut self) {
        if !self.state.phase.is_active() {
            self.transport.close();
            return;
        }
        self.state.phase = SessionPhase::Closing;
        self.drive(|engine, events| engine.close(events));
        self.transport.close();
        self.state.notifier.notify();
    }
}

/// A TLS client session waiting to be opened over a message socket.
pub struct TlsBridge<S, E> {
    session: Rc<RefCell<Session<S, E>>>,
}

impl<S: MessageSocket, E: TlsEngine> TlsBridge<S, E> {
    /// Create a bridge. `request` is written as soon as the handshake
    /// completes.
    pub fn new(socket: S, engine: E, config: &Config, request: impl Into<Bytes>) -> Self {
        let session = Session {
            transport: TransportQueue::new(socket, config),
            engine,
            state: BridgeState {
                phase: SessionPhase::Handshaking,
                plaintext: VecDeque::new(),
                notifier: Notifier::new(),
                fault: None,
                connected: false,
                next_reader: 1,
            },
            request: Some(request.into()),
            scratch: Vec::new(),
            protocols: config.subprotocols.clone(),
        };
        Self {
            session: Rc::new(RefCell::new(session)),
        }
    }

    /// Open the socket to `endpoint` and hand out the session's handles.
    /// The handshake starts when the socket reports `Open`.
    pub fn open(
        self,
        endpoint: &str,
    ) -> Result<(PlaintextStream<S, E>, Driver<S, E>, SessionHandle<S, E>)> {
        {
            let mut session = self.session.borrow_mut();
            let Session {
                transport,
                protocols,
                ..
            } = &mut *session;
            transport.open(endpoint, protocols)?;
            metrics::SESSIONS_OPENED.increment();
        }

        let stream = PlaintextStream::new(self.session.clone());
        let driver = Driver {
            session: self.session.clone(),
        };
        let handle = SessionHandle {
            session: self.session,
        };
        Ok((stream, driver, handle))
    }
}

// ── Driver ───────────────────────────────────────────────────────

/// Future that feeds socket events into the session. Completes once the
/// socket is finished or the transport was closed.
pub struct Driver<S, E> {
    session: Rc<RefCell<Session<S, E>>>,
}

impl<S: MessageSocket, E: TlsEngine> Future for Driver<S, E> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut session = self.session.borrow_mut();
        loop {
            if session.transport.is_closed() {
                session.state.finish();
                return Poll::Ready(());
            }
            let event = match session.transport.socket_mut().poll_event(cx) {
                Poll::Ready(Some(event)) => event,
                Poll::Ready(None) => {
                    session.state.finish();
                    session.transport.close();
                    return Poll::Ready(());
                }
                Poll::Pending => return Poll::Pending,
            };
            session.on_event(event);
        }
    }
}

// ── Plaintext stream ─────────────────────────────────────────────

/// Decrypted application data, one chunk per inbound-ready signal, in
/// arrival order.
///
/// Single pass: clones share the same queue, so each chunk is seen by
/// exactly one of them. Only one clone may be parked at a time; a second
/// parked reader receives [`Error::ConcurrentRead`]. A session fault is
/// yielded as the final `Err` item.
pub struct PlaintextStream<S, E> {
    session: Rc<RefCell<Session<S, E>>>,
    id: ReaderId,
}

impl<S, E> PlaintextStream<S, E> {
    fn new(session: Rc<RefCell<Session<S, E>>>) -> Self {
        let id = {
            let mut s = session.borrow_mut();
            let id = ReaderId(s.state.next_reader);
            s.state.next_reader += 1;
            id
        };
        Self { session, id }
    }
}

impl<S, E> Clone for PlaintextStream<S, E> {
    fn clone(&self) -> Self {
        Self::new(self.session.clone())
    }
}

impl<S, E> Stream for PlaintextStream<S, E> {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut session = self.session.borrow_mut();
        let state = &mut session.state;

        if let Some(chunk) = state.plaintext.pop_front() {
            state.notifier.cancel(self.id);
            return Poll::Ready(Some(Ok(chunk)));
        }
        if let Some(err) = state.fault.take() {
            state.notifier.cancel(self.id);
            return Poll::Ready(Some(Err(err)));
        }
        if !state.phase.is_active() {
            state.notifier.cancel(self.id);
            return Poll::Ready(None);
        }

        match state.notifier.register(self.id, cx.waker()) {
            Ok(()) => Poll::Pending,
            Err(e) => Poll::Ready(Some(Err(e))),
        }
    }
}

impl<S, E> Drop for PlaintextStream<S, E> {
    fn drop(&mut self) {
        if let Ok(mut session) = self.session.try_borrow_mut() {
            session.state.notifier.cancel(self.id);
        }
    }
}

// ── Handle ───────────────────────────────────────────────────────

/// Consumer-side control of a session.
pub struct SessionHandle<S, E> {
    session: Rc<RefCell<Session<S, E>>>,
}

impl<S: MessageSocket, E: TlsEngine> SessionHandle<S, E> {
    pub fn phase(&self) -> SessionPhase {
        self.session.borrow().state.phase
    }

    /// Negotiated TLS parameters. `None` until the handshake completes.
    pub fn tls_info(&self) -> Option<TlsInfo> {
        self.session.borrow().engine.info()
    }

    /// Send close_notify and close the socket.
    pub fn close(&self) {
        self.session.borrow_mut().close();
    }
}

impl<S: MessageSocket, E: TlsEngine> Closeable for SessionHandle<S, E> {
    fn close(&self) {
        SessionHandle::close(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::{ChannelPeer, ChannelSocket};
    use futures::StreamExt;
    use futures::executor::block_on;
    use futures::task::{ArcWake, noop_waker, waker};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine that treats each inbound message as a script step.
    struct ScriptedEngine {
        prepared: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    impl TlsEngine for ScriptedEngine {
        fn handshake(&mut self, events: &mut dyn TlsEvents) {
            events.outbound_ready(b"client-hello");
        }

        fn process(&mut self, ciphertext: &[u8], events: &mut dyn TlsEvents) {
            match ciphertext {
                b"server-hello" => events.connected(),
                b"bye" => events.closed(),
                b"bad-record" => events.faulted(Error::Socket("bad record mac".into())),
                data => events.inbound_ready(data),
            }
        }

        fn prepare(&mut self, plaintext: &[u8], events: &mut dyn TlsEvents) {
            self.prepared.borrow_mut().push(plaintext.to_vec());
            events.outbound_ready(plaintext);
        }

        fn close(&mut self, events: &mut dyn TlsEvents) {
            events.outbound_ready(b"close-notify");
        }
    }

    type Parts = (
        PlaintextStream<ChannelSocket, ScriptedEngine>,
        Driver<ChannelSocket, ScriptedEngine>,
        SessionHandle<ChannelSocket, ScriptedEngine>,
        ChannelPeer,
        Rc<RefCell<Vec<Vec<u8>>>>,
    );

    fn open_session(config: &Config) -> Parts {
        let (socket, peer) = ChannelSocket::pair();
        let prepared = Rc::new(RefCell::new(Vec::new()));
        let engine = ScriptedEngine {
            prepared: prepared.clone(),
        };
        let bridge = TlsBridge::new(socket, engine, config, &b"GET / HTTP/1.1\r\n\r\n"[..]);
        let (stream, driver, handle) = bridge.open("ws://relay.test/tls").unwrap();
        (stream, driver, handle, peer, prepared)
    }

    /// Poll the driver until it parks or finishes.
    fn pump<S: MessageSocket, E: TlsEngine>(driver: &mut Driver<S, E>) -> bool {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        Pin::new(driver).poll(&mut cx).is_ready()
    }

    fn poll_stream<S, E>(stream: &mut PlaintextStream<S, E>) -> Poll<Option<Result<Bytes>>> {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        Pin::new(stream).poll_next(&mut cx)
    }

    #[derive(Default)]
    struct WakeCount(AtomicUsize);

    impl ArcWake for WakeCount {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Establish a session and park `stream` on a counting waker.
    fn park_established(
        stream: &mut PlaintextStream<ChannelSocket, ScriptedEngine>,
        driver: &mut Driver<ChannelSocket, ScriptedEngine>,
        peer: &ChannelPeer,
    ) -> Arc<WakeCount> {
        pump(driver);
        peer.send(&b"server-hello"[..]).unwrap();
        pump(driver);

        let count = Arc::new(WakeCount::default());
        let waker = waker(count.clone());
        let mut cx = Context::from_waker(&waker);
        assert!(Pin::new(stream).poll_next(&mut cx).is_pending());
        count
    }

    #[test]
    fn handshake_then_request() {
        let (_stream, mut driver, handle, mut peer, prepared) = open_session(&Config::default());

        assert!(!pump(&mut driver));
        assert_eq!(handle.phase(), SessionPhase::Handshaking);
        assert_eq!(block_on(peer.recv()).as_deref(), Some(&b"client-hello"[..]));

        peer.send(&b"server-hello"[..]).unwrap();
        assert!(!pump(&mut driver));
        assert_eq!(handle.phase(), SessionPhase::Established);
        assert_eq!(prepared.borrow().as_slice(), &[b"GET / HTTP/1.1\r\n\r\n".to_vec()]);
        assert_eq!(
            block_on(peer.recv()).as_deref(),
            Some(&b"GET / HTTP/1.1\r\n\r\n"[..])
        );
    }

    #[test]
    fn plaintext_arrives_in_order() {
        let (mut stream, mut driver, _handle, peer, _) = open_session(&Config::default());
        pump(&mut driver);
        peer.send(&b"server-hello"[..]).unwrap();
        peer.send(&b"first"[..]).unwrap();
        peer.send(&b"second"[..]).unwrap();
        peer.send(&b"third"[..]).unwrap();
        pump(&mut driver);

        for expected in [&b"first"[..], b"second", b"third"] {
            match poll_stream(&mut stream) {
                Poll::Ready(Some(Ok(chunk))) => assert_eq!(&chunk[..], expected),
                other => panic!("unexpected poll result: {other:?}"),
            }
        }
        assert!(poll_stream(&mut stream).is_pending());
    }

    #[test]
    fn stream_ends_after_close() {
        let (stream, mut driver, handle, peer, _) = open_session(&Config::default());
        pump(&mut driver);
        peer.send(&b"server-hello"[..]).unwrap();
        peer.send(&b"payload"[..]).unwrap();
        peer.send(&b"bye"[..]).unwrap();
        pump(&mut driver);
        assert_eq!(handle.phase(), SessionPhase::Closed);

        let chunks: Vec<_> = block_on(stream.collect::<Vec<_>>());
        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0].as_ref().unwrap()[..], b"payload");
    }

    #[test]
    fn parked_reader_is_woken_once_on_close() {
        let (mut stream, mut driver, handle, peer, _) = open_session(&Config::default());
        let wakes = park_established(&mut stream, &mut driver, &peer);
        assert_eq!(wakes.0.load(Ordering::SeqCst), 0);

        peer.send(&b"bye"[..]).unwrap();
        pump(&mut driver);
        assert_eq!(handle.phase(), SessionPhase::Closed);
        assert_eq!(wakes.0.load(Ordering::SeqCst), 1);

        // The socket finishing afterwards does not wake it again.
        drop(peer);
        assert!(pump(&mut driver));
        assert_eq!(wakes.0.load(Ordering::SeqCst), 1);
        assert!(matches!(poll_stream(&mut stream), Poll::Ready(None)));
    }

    #[test]
    fn parked_reader_is_woken_once_on_fault() {
        let (mut stream, mut driver, handle, peer, _) = open_session(&Config::default());
        let wakes = park_established(&mut stream, &mut driver, &peer);

        peer.send(&b"bad-record"[..]).unwrap();
        assert!(pump(&mut driver));
        assert_eq!(handle.phase(), SessionPhase::Faulted);
        assert_eq!(wakes.0.load(Ordering::SeqCst), 1);

        assert!(matches!(
            poll_stream(&mut stream),
            Poll::Ready(Some(Err(Error::Socket(_))))
        ));
        assert!(matches!(poll_stream(&mut stream), Poll::Ready(None)));
        assert_eq!(wakes.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_parked_reader_is_an_error() {
        let (mut first, mut driver, _handle, _peer, _) = open_session(&Config::default());
        let mut second = first.clone();
        pump(&mut driver);

        assert!(poll_stream(&mut first).is_pending());
        match poll_stream(&mut second) {
            Poll::Ready(Some(Err(Error::ConcurrentRead))) => {}
            other => panic!("expected ConcurrentRead, got {other:?}"),
        }
        // The original reader is still parked and may poll again.
        assert!(poll_stream(&mut first).is_pending());
    }

    #[test]
    fn fault_is_yielded_once() {
        let (stream, mut driver, handle, peer, _) = open_session(&Config::default());
        pump(&mut driver);
        peer.send(&b"server-hello"[..]).unwrap();
        peer.send(&b"bad-record"[..]).unwrap();
        assert!(pump(&mut driver));
        assert_eq!(handle.phase(), SessionPhase::Faulted);

        let items: Vec<_> = block_on(stream.collect::<Vec<_>>());
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::Socket(_))));
    }

    #[test]
    fn receive_overflow_faults_session() {
        let config = Config {
            recv_buffer_size: 8,
            recv_buffer_max: 16,
            ..Config::default()
        };
        let (stream, mut driver, handle, peer, _) = open_session(&config);
        pump(&mut driver);
        peer.send(vec![b'x'; 32]).unwrap();
        assert!(pump(&mut driver));
        assert_eq!(handle.phase(), SessionPhase::Faulted);

        let items: Vec<_> = block_on(stream.collect::<Vec<_>>());
        assert!(matches!(
            items.as_slice(),
            [Err(Error::BufferExceeded { max: 16, .. })]
        ));
    }

    #[test]
    fn consumer_close_sends_close_notify() {
        let (mut stream, mut driver, handle, mut peer, _) = open_session(&Config::default());
        pump(&mut driver);
        assert_eq!(block_on(peer.recv()).as_deref(), Some(&b"client-hello"[..]));
        peer.send(&b"server-hello"[..]).unwrap();
        pump(&mut driver);
        assert!(block_on(peer.recv()).is_some());

        handle.close();
        assert_eq!(handle.phase(), SessionPhase::Closing);
        assert_eq!(block_on(peer.recv()).as_deref(), Some(&b"close-notify"[..]));
        assert_eq!(block_on(peer.recv()), None);

        assert!(pump(&mut driver));
        assert_eq!(handle.phase(), SessionPhase::Closed);
        assert!(matches!(poll_stream(&mut stream), Poll::Ready(None)));
    }
}
