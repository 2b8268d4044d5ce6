//! Shared test harness: a channel-backed transport fake and a scriptable
//! session store, so manager behavior can be driven without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use tm_core::config::{ServerConfig, SocketConfig};
use tm_core::error::{TmError, TmResult};
use tm_core::lifecycle::AppLifecycle;
use tm_core::session::{Credential, CredentialRefresher, SessionProvider};
use tm_socket::manager::ConnectionManager;
use tm_socket::transport::{Connection, Transport, TransportEvent};
use tm_socket::{ConnectionStatus, EventDispatcher};

const POLL: Duration = Duration::from_millis(10);
const MAX_POLLS: usize = 50_000;

/// Poll until the condition holds, panicking after the budget runs out.
/// Virtual-time friendly: each poll sleeps on the tokio clock.
pub async fn wait_until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..MAX_POLLS {
        if condition() {
            return;
        }
        tokio::time::sleep(POLL).await;
    }
    panic!("timed out waiting for: {what}");
}

pub async fn wait_status(manager: &ConnectionManager, expected: ConnectionStatus) {
    for _ in 0..MAX_POLLS {
        if manager.status().await == expected {
            return;
        }
        tokio::time::sleep(POLL).await;
    }
    panic!("timed out waiting for status {expected}");
}

pub async fn wait_attempts(manager: &ConnectionManager, expected: u32) {
    for _ in 0..MAX_POLLS {
        if manager.reconnect_attempts().await == expected {
            return;
        }
        tokio::time::sleep(POLL).await;
    }
    panic!("timed out waiting for {expected} reconnect attempt(s)");
}

pub async fn wait_exhausted(manager: &ConnectionManager) {
    for _ in 0..MAX_POLLS {
        if manager.retries_exhausted().await {
            return;
        }
        tokio::time::sleep(POLL).await;
    }
    panic!("timed out waiting for retries to be exhausted");
}

// -- Mock transport --

struct SocketState {
    frames: Mutex<VecDeque<String>>,
    client_closed: AtomicBool,
    inbound_tx: mpsc::UnboundedSender<TransportEvent>,
}

/// One accepted connection on the fake transport. Cloneable; the test
/// side reads outbound frames and injects inbound ones.
#[derive(Clone)]
pub struct MockSocket {
    state: Arc<SocketState>,
}

impl MockSocket {
    /// Next outbound frame, parsed as JSON.
    pub async fn expect_frame(&self) -> Value {
        for _ in 0..MAX_POLLS {
            if let Some(frame) = self.state.frames.lock().unwrap().pop_front() {
                return serde_json::from_str(&frame).expect("outbound frame was not JSON");
            }
            tokio::time::sleep(POLL).await;
        }
        panic!("timed out waiting for an outbound frame");
    }

    /// Whether any outbound frame is pending.
    pub fn has_frame(&self) -> bool {
        !self.state.frames.lock().unwrap().is_empty()
    }

    /// Inject an inbound text frame.
    pub fn send_frame(&self, text: &str) {
        let _ = self
            .state
            .inbound_tx
            .send(TransportEvent::Frame(text.to_string()));
    }

    /// Inject an inbound envelope for a domain event.
    pub fn send_event(&self, message_type: &str, payload: Value) {
        self.send_frame(
            &serde_json::json!({
                "type": message_type,
                "v": "1",
                "correlationId": "srv-1",
                "payload": payload,
            })
            .to_string(),
        );
    }

    /// Acknowledge authentication.
    pub fn send_success(&self) {
        self.send_frame(
            r#"{"type":"connection_success","v":"1","correlationId":"c1","kind":"OK"}"#,
        );
    }

    /// Reject authentication with a failure code.
    pub fn send_failure(&self, code: &str, message: &str) {
        self.send_frame(
            &serde_json::json!({
                "type": "connection_failed",
                "v": "1",
                "correlationId": "c1",
                "kind": "ERROR",
                "error": { "code": code, "message": message },
            })
            .to_string(),
        );
    }

    /// Simulate the server closing the socket.
    pub fn close(&self, reason: &str) {
        let _ = self.state.inbound_tx.send(TransportEvent::Closed {
            reason: reason.to_string(),
        });
    }

    /// Wait for the client side to close (manager dropped its handle).
    pub async fn wait_client_close(&self) {
        let state = Arc::clone(&self.state);
        wait_until("client to close the socket", move || {
            state.client_closed.load(Ordering::SeqCst)
        })
        .await;
    }
}

struct MockInner {
    sockets: Mutex<VecDeque<MockSocket>>,
    connect_count: AtomicUsize,
    fail_next: AtomicUsize,
}

/// Transport fake handing out channel-backed sockets.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockInner {
                sockets: Mutex::new(VecDeque::new()),
                connect_count: AtomicUsize::new(0),
                fail_next: AtomicUsize::new(0),
            }),
        }
    }

    /// Make the next `n` connect calls fail with a transport error.
    pub fn fail_connects(&self, n: usize) {
        self.inner.fail_next.store(n, Ordering::SeqCst);
    }

    /// Total connect calls observed (including failed ones).
    pub fn connect_count(&self) -> usize {
        self.inner.connect_count.load(Ordering::SeqCst)
    }

    /// Wait for and take the next accepted socket.
    pub async fn next_socket(&self) -> MockSocket {
        for _ in 0..MAX_POLLS {
            if let Some(socket) = self.inner.sockets.lock().unwrap().pop_front() {
                return socket;
            }
            tokio::time::sleep(POLL).await;
        }
        panic!("timed out waiting for a connection attempt");
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _url: &str) -> TmResult<Connection> {
        self.inner.connect_count.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TmError::Socket("mock connect refused".into()));
        }

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<TransportEvent>();

        let state = Arc::new(SocketState {
            frames: Mutex::new(VecDeque::new()),
            client_closed: AtomicBool::new(false),
            inbound_tx,
        });
        let socket = MockSocket {
            state: Arc::clone(&state),
        };

        // Pump: collect outbound frames; mirror the real transport by
        // reporting a close event once the manager drops its sender.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                state.frames.lock().unwrap().push_back(frame);
            }
            state.client_closed.store(true, Ordering::SeqCst);
            let _ = state.inbound_tx.send(TransportEvent::Closed {
                reason: "closed by client".to_string(),
            });
        });

        self.inner.sockets.lock().unwrap().push_back(socket);

        Ok(Connection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

// -- Scriptable session --

/// Session store with scripted refresh outcomes and a call counter.
#[derive(Default)]
pub struct TestSession {
    credential: Mutex<Option<Credential>>,
    refresh_outcomes: Mutex<VecDeque<Option<Credential>>>,
    refresh_calls: AtomicUsize,
}

impl TestSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&self, token: &str) {
        *self.credential.lock().unwrap() = Some(credential(token));
    }

    pub fn logout(&self) {
        *self.credential.lock().unwrap() = None;
    }

    /// Script the outcome of the next refresh: Some installs the new
    /// credential and reports success, None reports failure.
    pub fn push_refresh(&self, outcome: Option<Credential>) {
        self.refresh_outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

impl SessionProvider for TestSession {
    fn get(&self) -> Option<Credential> {
        self.credential.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialRefresher for TestSession {
    async fn refresh(&self) -> TmResult<bool> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        match self.refresh_outcomes.lock().unwrap().pop_front().flatten() {
            Some(fresh) => {
                *self.credential.lock().unwrap() = Some(fresh);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub fn credential(token: &str) -> Credential {
    Credential {
        session_token: token.into(),
        refresh_token: format!("{token}-refresh"),
        user_id: 1,
    }
}

// -- Harness --

pub struct Harness {
    pub manager: ConnectionManager,
    pub transport: MockTransport,
    pub session: Arc<TestSession>,
    pub lifecycle: Arc<AppLifecycle>,
    pub dispatcher: EventDispatcher,
}

pub fn harness() -> Harness {
    harness_with(SocketConfig::default())
}

pub fn harness_with(policy: SocketConfig) -> Harness {
    let transport = MockTransport::new();
    let session = Arc::new(TestSession::new());
    let lifecycle = Arc::new(AppLifecycle::new());
    let dispatcher = EventDispatcher::new();
    let server = ServerConfig {
        ws_url: "wss://test.invalid/ws".into(),
        client_version: "0.0-test".into(),
    };
    let manager = ConnectionManager::new(
        server,
        policy,
        Arc::new(transport.clone()),
        Arc::clone(&session) as Arc<dyn SessionProvider>,
        Arc::clone(&session) as Arc<dyn CredentialRefresher>,
        Arc::clone(&lifecycle),
        dispatcher.clone(),
    );
    Harness {
        manager,
        transport,
        session,
        lifecycle,
        dispatcher,
    }
}
