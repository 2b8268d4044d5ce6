//! WebSocket connection manager.
//!
//! Owns the full socket lifecycle: connect, authenticate, heartbeat,
//! reconnect with capped exponential backoff, credential refresh on
//! invalid-session rejections, and disconnect. Composes the message
//! validator, outbound queue, and event dispatcher.
//!
//! All mutable state lives behind a single `tokio::sync::Mutex`, so state
//! transitions are serialized: a heartbeat tick racing a reconnect timer
//! cannot open a second socket, and a second invalid-session rejection
//! cannot start a second refresh. Each connection attempt is stamped with
//! a generation counter; callbacks from a superseded socket or timer see
//! a stale generation and do nothing.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use tm_core::config::{ServerConfig, SocketConfig};
use tm_core::constants::message_types;
use tm_core::error::TmResult;
use tm_core::lifecycle::{AppLifecycle, AppLifecycleState};
use tm_core::session::{CredentialRefresher, SessionProvider};

use crate::dispatcher::{EventDispatcher, Subscription};
use crate::envelope::{
    authorization_envelope, ping_envelope, ConnectionFailedPayload, ConnectionStatus, FailureCode,
    MessageEnvelope, ResponseEnvelope,
};
use crate::queue::MessageQueue;
use crate::transport::{Connection, Transport, TransportEvent};
use crate::validator::MessageValidator;

/// Mutable manager state, guarded by one lock.
struct ManagerState {
    status: ConnectionStatus,
    /// Write end of the live socket; dropping it closes the socket.
    /// At most one exists at a time.
    socket: Option<mpsc::UnboundedSender<String>>,
    /// Stamps the current connection attempt. Bumped on every new attempt
    /// and on teardown so stale callbacks become no-ops.
    generation: u64,
    queue: MessageQueue,
    /// Consecutive failed automatic attempts.
    attempts: u32,
    /// Whether a backoff timer is pending.
    scheduled: bool,
    /// Terminal flag: automatic attempts stopped until `manual_retry`.
    retries_exhausted: bool,
    /// Credential refresh in flight; at most one at a time.
    refreshing: bool,
    /// Last liveness acknowledgment (bare "pong" or any structured
    /// response). Exists only while connected.
    last_liveness: Option<Instant>,
    heartbeat: Option<tokio::task::JoinHandle<()>>,
    reconnect_timer: Option<tokio::task::JoinHandle<()>>,
}

struct Inner {
    server: ServerConfig,
    policy: SocketConfig,
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionProvider>,
    refresher: Arc<dyn CredentialRefresher>,
    lifecycle: Arc<AppLifecycle>,
    dispatcher: EventDispatcher,
    validator: MessageValidator,
    state: Mutex<ManagerState>,
    status_tx: watch::Sender<ConnectionStatus>,
}

/// Managed persistent connection to the realtime server.
///
/// Created once per authenticated session and torn down on logout via
/// `disconnect`. Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager and start watching app lifecycle transitions.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        server: ServerConfig,
        policy: SocketConfig,
        transport: Arc<dyn Transport>,
        session: Arc<dyn SessionProvider>,
        refresher: Arc<dyn CredentialRefresher>,
        lifecycle: Arc<AppLifecycle>,
        dispatcher: EventDispatcher,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let manager = Self {
            inner: Arc::new(Inner {
                server,
                policy,
                transport,
                session,
                refresher,
                lifecycle,
                dispatcher,
                validator: MessageValidator::new(),
                state: Mutex::new(ManagerState {
                    status: ConnectionStatus::Disconnected,
                    socket: None,
                    generation: 0,
                    queue: MessageQueue::new(),
                    attempts: 0,
                    scheduled: false,
                    retries_exhausted: false,
                    refreshing: false,
                    last_liveness: None,
                    heartbeat: None,
                    reconnect_timer: None,
                }),
                status_tx,
            }),
        };

        let watcher = manager.clone();
        tokio::spawn(async move { watcher.lifecycle_loop().await });

        manager
    }

    // -- Observability --

    /// Current connection status.
    pub async fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().await.status
    }

    /// Subscribe to status changes.
    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Whether automatic reconnection has given up. Cleared only by
    /// `manual_retry`.
    pub async fn retries_exhausted(&self) -> bool {
        self.inner.state.lock().await.retries_exhausted
    }

    /// Consecutive failed automatic attempts so far.
    pub async fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().await.attempts
    }

    /// Messages waiting for a live connection.
    pub async fn queue_len(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    /// The event dispatcher fanning out inbound server events.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    /// Register a callback for an inbound event type.
    pub fn subscribe<F>(&self, message_type: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe(message_type, callback)
    }

    /// Remove a registration. Idempotent.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.inner.dispatcher.unsubscribe(subscription)
    }

    // -- Lifecycle operations --

    /// Open the connection if it is not already open or opening.
    ///
    /// A no-op when already connecting, when a socket exists, or when no
    /// session is available.
    pub async fn connect(&self) {
        let credential = match self.inner.session.get() {
            Some(c) => c,
            None => {
                debug!("connect requested with no session, skipping");
                return;
            }
        };

        let generation = {
            let mut state = self.inner.state.lock().await;
            if state.status == ConnectionStatus::Connecting {
                debug!("already connecting, skipping connect");
                return;
            }
            if state.socket.is_some() {
                debug!("socket already open, skipping connect");
                return;
            }
            state.generation += 1;
            self.set_status_locked(&mut state, ConnectionStatus::Connecting);
            state.generation
        };

        let manager = self.clone();
        let session_token = credential.session_token;
        tokio::spawn(async move { manager.run_connection(generation, session_token).await });
    }

    /// Close the socket, cancel timers, clear the queue, and reset
    /// reconnect state. Used on logout and explicit teardown.
    pub async fn disconnect(&self) {
        let mut state = self.inner.state.lock().await;
        if let Some(handle) = state.heartbeat.take() {
            handle.abort();
        }
        if let Some(handle) = state.reconnect_timer.take() {
            handle.abort();
        }
        state.scheduled = false;
        state.attempts = 0;
        state.retries_exhausted = false;
        state.refreshing = false;
        state.socket = None;
        state.last_liveness = None;
        state.queue.clear();
        state.generation += 1;
        self.set_status_locked(&mut state, ConnectionStatus::Disconnected);
        info!("socket disconnected");
    }

    /// Validate a payload, build its envelope, and send it.
    ///
    /// Validation failures are local construction errors: the message
    /// never touches the transport or the queue and is not retried.
    pub async fn send(&self, message_type: &str, payload: Value) -> TmResult<()> {
        let envelope = self.inner.validator.build_envelope(message_type, payload)?;
        self.send_envelope(envelope).await;
        Ok(())
    }

    /// Send a pre-built envelope: transmit immediately when connected and
    /// writable, otherwise enqueue and trigger a connect.
    pub async fn send_envelope(&self, envelope: MessageEnvelope) {
        {
            let mut state = self.inner.state.lock().await;
            if state.status == ConnectionStatus::Connected {
                if let Some(socket) = &state.socket {
                    if socket.send(envelope.to_frame()).is_ok() {
                        return;
                    }
                    warn!("socket not writable, queueing message");
                }
            }
            state.queue.enqueue(envelope);
            if state.status == ConnectionStatus::Connecting {
                return;
            }
        }
        self.connect().await;
    }

    /// User-initiated retry after exhaustion: clears the terminal flag,
    /// resets the attempt counter, cancels any pending scheduled retry,
    /// and connects immediately.
    pub async fn manual_retry(&self) {
        {
            let mut state = self.inner.state.lock().await;
            state.retries_exhausted = false;
            state.attempts = 0;
            state.scheduled = false;
            if let Some(handle) = state.reconnect_timer.take() {
                handle.abort();
            }
        }
        info!("manual retry requested");
        self.connect().await;
    }

    /// The k-th backoff delay: `min(base * 2^attempt, cap)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.inner.policy.backoff_base();
        let cap = self.inner.policy.backoff_cap();
        let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
        exponential.min(cap)
    }

    // -- Connection task --

    async fn run_connection(self, generation: u64, session_token: String) {
        let connection = match self
            .inner
            .transport
            .connect(&self.inner.server.ws_url)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!("connection attempt failed: {e}");
                self.on_connect_error(generation).await;
                return;
            }
        };
        let Connection {
            outbound,
            mut inbound,
        } = connection;

        {
            let mut state = self.inner.state.lock().await;
            if state.generation != generation {
                debug!("connection attempt superseded, dropping socket");
                return;
            }
            state.socket = Some(outbound.clone());
        }

        let auth = authorization_envelope(&session_token, &self.inner.server.client_version);
        if outbound.send(auth.to_frame()).is_err() {
            self.on_socket_closed(generation, "write failed during authorization")
                .await;
            return;
        }
        debug!("socket open, authorization sent");

        loop {
            match inbound.recv().await {
                Some(TransportEvent::Frame(text)) => {
                    self.handle_frame(generation, &text).await;
                    if self.inner.state.lock().await.generation != generation {
                        return;
                    }
                }
                Some(TransportEvent::Closed { reason }) => {
                    self.on_socket_closed(generation, &reason).await;
                    return;
                }
                None => {
                    self.on_socket_closed(generation, "transport channel dropped")
                        .await;
                    return;
                }
            }
        }
    }

    // -- Inbound handling --

    async fn handle_frame(&self, generation: u64, text: &str) {
        // Bare non-JSON liveness acknowledgment.
        if text.trim() == message_types::PONG {
            let mut state = self.inner.state.lock().await;
            if state.generation == generation {
                state.last_liveness = Some(Instant::now());
            }
            return;
        }

        let response: ResponseEnvelope = match serde_json::from_str(text) {
            Ok(r) => r,
            Err(e) => {
                warn!("ignoring unparseable frame: {e}");
                return;
            }
        };

        // Any structured response counts as a liveness acknowledgment.
        {
            let mut state = self.inner.state.lock().await;
            if state.generation != generation {
                return;
            }
            state.last_liveness = Some(Instant::now());
        }

        match response.message_type.as_str() {
            message_types::CONNECTION_SUCCESS => self.on_connection_success(generation).await,
            message_types::CONNECTION_FAILED => {
                self.on_connection_failed(generation, &response).await
            }
            other => {
                if response.is_error() {
                    let detail = response
                        .error
                        .as_ref()
                        .map(|e| format!("{}: {}", e.code, e.message))
                        .unwrap_or_else(|| "no error body".to_string());
                    error!("server error response for '{other}': {detail}");
                    return;
                }
                let payload = response.payload.unwrap_or(Value::Null);
                if let Err(reason) = self.inner.validator.validate_inbound(other, &payload) {
                    warn!("dropping inbound '{other}' with invalid payload: {reason}");
                    return;
                }
                self.inner.dispatcher.dispatch(other, &payload);
            }
        }
    }

    async fn on_connection_success(&self, generation: u64) {
        let mut state = self.inner.state.lock().await;
        if state.generation != generation || state.socket.is_none() {
            return;
        }

        if let Some(handle) = state.reconnect_timer.take() {
            handle.abort();
        }
        state.scheduled = false;
        state.attempts = 0;
        state.retries_exhausted = false;
        state.last_liveness = Some(Instant::now());
        self.set_status_locked(&mut state, ConnectionStatus::Connected);
        info!("socket authenticated");

        // Flush under the lock: no concurrent send can slot a new message
        // ahead of the queued ones.
        let socket = state.socket.as_ref().cloned();
        if let Some(socket) = socket {
            state.queue.flush(|envelope| {
                let _ = socket.send(envelope.to_frame());
            });
        }

        self.start_heartbeat_locked(&mut state, generation);
    }

    async fn on_connection_failed(&self, generation: u64, response: &ResponseEnvelope) {
        let (code, message) = match extract_failure(response) {
            Some(pair) => pair,
            None => {
                warn!("connection_failed without a readable error body");
                return;
            }
        };
        let failure = FailureCode::parse(&code);

        if failure.is_credential_failure() {
            let should_refresh = {
                let mut state = self.inner.state.lock().await;
                if state.generation != generation {
                    return;
                }
                if state.refreshing {
                    debug!("refresh already in flight, ignoring {code}");
                    false
                } else {
                    info!("credential rejected ({code}), refreshing session");
                    state.refreshing = true;
                    // Close the current socket; its close event is stale
                    // by the generation bump and will not double-schedule.
                    if let Some(handle) = state.heartbeat.take() {
                        handle.abort();
                    }
                    state.socket = None;
                    state.last_liveness = None;
                    state.generation += 1;
                    self.set_status_locked(&mut state, ConnectionStatus::Disconnected);
                    true
                }
            };
            if should_refresh {
                let manager = self.clone();
                tokio::spawn(async move { manager.run_refresh().await });
            }
            return;
        }

        match failure {
            FailureCode::InvalidMessageType | FailureCode::InvalidAuthData => {
                // Client-side defect, not a transient condition. Logged,
                // never auto-retried.
                error!("connection failed with client defect {code}: {message}");
            }
            _ => {
                error!("connection failed: {code}: {message}");
            }
        }
    }

    // Boxed return type breaks the async-fn type cycle
    // (connect -> run_connection -> run_refresh -> connect).
    fn run_refresh(
        self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'static>> {
        Box::pin(async move {
            let refreshed = self.inner.refresher.refresh().await;

            let mut state = self.inner.state.lock().await;
            state.refreshing = false;
            match refreshed {
                Ok(true) => {
                    info!("session refreshed, reconnecting immediately");
                    drop(state);
                    // Immediate retry: does not debit the backoff budget.
                    self.connect().await;
                }
                Ok(false) => {
                    warn!("session refresh failed, falling back to backoff");
                    self.schedule_reconnect_locked(&mut state);
                }
                Err(e) => {
                    warn!("session refresh errored ({e}), falling back to backoff");
                    self.schedule_reconnect_locked(&mut state);
                }
            }
        })
    }

    // -- Failure and close handling --

    async fn on_connect_error(&self, generation: u64) {
        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            return;
        }
        self.set_status_locked(&mut state, ConnectionStatus::Disconnected);
        if !self.should_auto_reconnect(&state) {
            return;
        }
        self.schedule_reconnect_locked(&mut state);
    }

    async fn on_socket_closed(&self, generation: u64, reason: &str) {
        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            debug!("stale socket closed ({reason}), ignoring");
            return;
        }
        // Heartbeat stops first, then the status transition, then any
        // reconnect scheduling.
        if let Some(handle) = state.heartbeat.take() {
            handle.abort();
        }
        state.socket = None;
        state.last_liveness = None;
        self.set_status_locked(&mut state, ConnectionStatus::Disconnected);
        warn!("socket closed: {reason}");

        if state.refreshing {
            debug!("refresh in flight, deferring reconnect to its outcome");
            return;
        }
        if !self.should_auto_reconnect(&state) {
            return;
        }
        self.schedule_reconnect_locked(&mut state);
    }

    fn should_auto_reconnect(&self, _state: &ManagerState) -> bool {
        if self.inner.session.get().is_none() {
            debug!("no session, not reconnecting");
            return false;
        }
        if !self.inner.lifecycle.is_foreground() {
            debug!("app backgrounded, not scheduling reconnect");
            return false;
        }
        true
    }

    fn schedule_reconnect_locked(&self, state: &mut ManagerState) {
        if state.scheduled {
            debug!("reconnect already scheduled, skipping");
            return;
        }
        if state.status == ConnectionStatus::Connected {
            return;
        }
        if self.inner.session.get().is_none() {
            state.attempts = 0;
            return;
        }
        if state.attempts >= self.inner.policy.max_reconnect_attempts {
            warn!(
                "max reconnection attempts ({}) exhausted",
                self.inner.policy.max_reconnect_attempts
            );
            state.retries_exhausted = true;
            return;
        }

        let delay = self.backoff_delay(state.attempts);
        state.attempts += 1;
        state.scheduled = true;
        info!(
            "scheduling reconnect attempt #{} in {:.1}s",
            state.attempts,
            delay.as_secs_f64()
        );

        let manager = self.clone();
        state.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = manager.inner.state.lock().await;
                state.scheduled = false;
                state.reconnect_timer = None;
            }
            manager.connect().await;
        }));
    }

    // -- Heartbeat --

    fn start_heartbeat_locked(&self, state: &mut ManagerState, generation: u64) {
        if let Some(handle) = state.heartbeat.take() {
            handle.abort();
        }
        let interval = self.inner.policy.heartbeat_interval();
        let manager = self.clone();
        state.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip the immediate first tick.
            ticker.tick().await;
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !manager.heartbeat_tick(generation).await {
                    return;
                }
            }
        }));
    }

    /// One heartbeat interval elapsed. Returns false when the loop should
    /// stop.
    async fn heartbeat_tick(&self, generation: u64) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.generation != generation || state.status != ConnectionStatus::Connected {
            return false;
        }

        let timeout = self.inner.policy.liveness_timeout();
        let stale = state
            .last_liveness
            .map_or(false, |at| at.elapsed() > timeout);
        if stale {
            warn!(
                "no liveness ack in {:.0}s, force-closing socket",
                timeout.as_secs_f64()
            );
            // Dropping the handle closes the socket; the transport's close
            // event drives the normal backoff path.
            state.socket = None;
            return false;
        }

        match &state.socket {
            Some(socket) => {
                if socket.send(ping_envelope().to_frame()).is_err() {
                    warn!("ping write failed, closing socket");
                    state.socket = None;
                    return false;
                }
                true
            }
            None => false,
        }
    }

    // -- Lifecycle watcher --

    async fn lifecycle_loop(self) {
        let mut rx = self.inner.lifecycle.subscribe();
        while rx.changed().await.is_ok() {
            let lifecycle_state = *rx.borrow();
            if lifecycle_state != AppLifecycleState::Foreground {
                continue;
            }
            if self.inner.session.get().is_none() {
                continue;
            }
            debug!("app foregrounded, ensuring connection");
            // connect() already skips when open or connecting.
            self.connect().await;
        }
    }

    fn set_status_locked(&self, state: &mut ManagerState, status: ConnectionStatus) {
        if state.status != status {
            info!("socket status: {} -> {}", state.status, status);
            state.status = status;
            let _ = self.inner.status_tx.send(status);
        }
    }
}

/// Pull `{code, message}` out of a `connection_failed` response, from the
/// error body or the payload.
fn extract_failure(response: &ResponseEnvelope) -> Option<(String, String)> {
    if let Some(err) = &response.error {
        return Some((err.code.clone(), err.message.clone()));
    }
    let payload = response.payload.as_ref()?;
    let parsed: ConnectionFailedPayload = serde_json::from_value(payload.clone()).ok()?;
    Some((parsed.code, parsed.message))
}
