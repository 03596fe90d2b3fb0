//! Subscription transport: one connection, many subscriptions.

use super::config::TransportConfig;
use super::connection::{CloseEvent, Connection, ConnectionId, Connector};
use super::handle::SubscriptionHandle;
use super::types::{
    CompleteCallback, DataCallback, ErrorCallback, SubscribeOptions, SubscriptionEvent,
    SubscriptionState,
};
use crate::error::{ClientError, Result};
use crate::protocol::{
    decode, encode, Message, SubscribePayload, CLOSE_INIT_TIMEOUT, CLOSE_NORMAL,
    GRAPHQL_TRANSPORT_WS_PROTOCOL,
};
use crate::reactive::{batch, ReactiveCell};
use crate::types::{ConnectionState, SubscriptionId};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Callback invocations deferred until the transport lock is released.
#[derive(Default)]
struct Effects(Vec<Box<dyn FnOnce()>>);

impl Effects {
    fn push(&mut self, f: impl FnOnce() + 'static) {
        self.0.push(Box::new(f));
    }

    fn run(self) {
        for effect in self.0 {
            effect();
        }
    }
}

/// Internal subscription record.
struct Subscription {
    id: SubscriptionId,
    query: String,
    variables: Option<Value>,
    operation_name: Option<String>,
    state: ReactiveCell<SubscriptionState>,
    events: Sender<SubscriptionEvent>,
    on_data: Option<DataCallback>,
    on_error: Option<ErrorCallback>,
    on_complete: Option<CompleteCallback>,
}

impl Subscription {
    fn subscribe_message(&self) -> Message {
        Message::subscribe(
            self.id.to_wire(),
            SubscribePayload {
                query: self.query.clone(),
                variables: self.variables.clone(),
                operation_name: self.operation_name.clone(),
            },
        )
    }

    /// Queue an event for the handle. Never blocks; a full buffer drops it.
    fn emit(&self, event: SubscriptionEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(id = %self.id, "subscription event buffer full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn deliver_error(&self, error: ClientError, effects: &mut Effects) {
        self.state.update(|s| s.error = Some(error.clone()));
        self.emit(SubscriptionEvent::Error(error.clone()));
        if let Some(cb) = self.on_error.clone() {
            effects.push(move || cb(&error));
        }
    }
}

/// Mutable transport state, always accessed under the shared lock.
struct TransportInner {
    config: TransportConfig,
    connector: Box<dyn Connector>,
    connection: Option<Box<dyn Connection>>,
    /// Id of `connection`; socket events carrying any other id are stale.
    connection_id: Option<ConnectionId>,
    next_connection: u64,
    /// `connection_init` went out on the current connection.
    init_sent: bool,
    state: ConnectionState,
    state_cell: ReactiveCell<ConnectionState>,
    /// Registry in registration order (ids are monotonic).
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    /// Subscribe frames waiting for the next handshake, FIFO.
    outbound: Vec<(SubscriptionId, String)>,
    next_id: u64,
    reconnect_attempts: u32,
    connect_deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
    next_ping_at: Option<Instant>,
}

/// `now + delay`, saturating far in the future instead of overflowing.
fn deadline(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 24 * 3600))
}

impl TransportInner {
    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "connection state changed");
        }
        self.state = next;
        self.state_cell.set(next);

        let active = next == ConnectionState::Connected;
        for sub in self.subscriptions.values() {
            sub.state.update(|s| {
                s.connection_state = next;
                s.active = active;
            });
        }
    }

    fn is_current(&self, conn: ConnectionId) -> bool {
        self.connection_id == Some(conn)
    }

    fn lookup(&self, wire_id: &str) -> Option<&Subscription> {
        SubscriptionId::parse(wire_id).and_then(|id| self.subscriptions.get(&id))
    }

    fn send(&mut self, message: &Message) -> Result<()> {
        let frame = encode(message)?;
        self.send_raw(&frame)
    }

    fn send_raw(&mut self, frame: &str) -> Result<()> {
        match self.connection.as_mut() {
            Some(connection) => {
                debug!(frame, "sending frame");
                connection.send(frame)
            }
            None => Err(ClientError::Connection("no open connection".to_string())),
        }
    }

    /// Forget the current socket, closing it first when `close` is given.
    fn drop_connection(&mut self, close: Option<(u16, &str)>) {
        if let Some(mut connection) = self.connection.take() {
            if let Some((code, reason)) = close {
                connection.close(code, reason);
            }
        }
        self.connection_id = None;
        self.init_sent = false;
        self.connect_deadline = None;
        self.next_ping_at = None;
    }

    fn surface_error(&self, error: &ClientError, effects: &mut Effects) {
        for sub in self.subscriptions.values() {
            sub.deliver_error(error.clone(), effects);
        }
    }

    // --- Lifecycle ---

    fn open_connection(&mut self, now: Instant, effects: &mut Effects) {
        self.drop_connection(Some((CLOSE_NORMAL, "Reconnecting")));
        self.reconnect_at = None;
        self.set_state(ConnectionState::Connecting);

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        match self
            .connector
            .connect(id, &self.config.url, GRAPHQL_TRANSPORT_WS_PROTOCOL)
        {
            Ok(connection) => {
                debug!(%id, url = %self.config.url, "connection opening");
                self.connection = Some(connection);
                self.connection_id = Some(id);
                self.connect_deadline = Some(deadline(now, self.config.connection_timeout));
            }
            Err(e) => {
                warn!(url = %self.config.url, error = %e, "connect failed");
                self.fail_connection(now, e, None, effects);
            }
        }
    }

    fn handle_open(&mut self, conn: ConnectionId, now: Instant, effects: &mut Effects) {
        if !self.is_current(conn) {
            debug!(%conn, "open for stale connection ignored");
            return;
        }
        if self.state != ConnectionState::Connecting || self.init_sent {
            debug!(state = %self.state, "ignoring open event");
            return;
        }

        let payload = match &self.config.connection_params {
            Some(params) => params.resolve(),
            None => Ok(None),
        };
        let sent = payload.and_then(|payload| self.send(&Message::init(payload)));
        match sent {
            Ok(()) => self.init_sent = true,
            Err(e) => {
                warn!(error = %e, "handshake could not be started");
                self.fail_connection(now, e, Some((CLOSE_NORMAL, "Handshake failed")), effects);
            }
        }
    }

    fn handle_ack(&mut self, now: Instant, effects: &mut Effects) {
        if self.state == ConnectionState::Connected || !self.init_sent {
            debug!(state = %self.state, init_sent = self.init_sent, "ignoring connection_ack");
            return;
        }

        self.connect_deadline = None;
        self.reconnect_at = None;
        self.reconnect_attempts = 0;
        self.set_state(ConnectionState::Connected);
        if self.config.keep_alive {
            self.next_ping_at = Some(deadline(now, self.config.keep_alive_interval));
        }

        // The server forgets everything on a fresh connection, so every
        // registered subscription is sent again, oldest first. Queued frames
        // are reused verbatim instead of being sent twice.
        let mut queued = std::mem::take(&mut self.outbound);
        let mut frames = Vec::with_capacity(self.subscriptions.len());
        for sub in self.subscriptions.values() {
            match queued.iter().position(|(id, _)| *id == sub.id) {
                Some(index) => frames.push(queued.remove(index).1),
                None => match encode(&sub.subscribe_message()) {
                    Ok(frame) => frames.push(frame),
                    Err(e) => warn!(id = %sub.id, error = %e, "could not encode subscribe frame"),
                },
            }
        }
        frames.extend(queued.into_iter().map(|(_, frame)| frame));

        let count = frames.len();
        for frame in frames {
            if let Err(e) = self.send_raw(&frame) {
                self.fail_connection(now, e, None, effects);
                return;
            }
        }
        info!(subscriptions = count, "handshake complete");
    }

    /// Give up on the current socket after an error.
    fn fail_connection(
        &mut self,
        now: Instant,
        error: ClientError,
        close: Option<(u16, &str)>,
        effects: &mut Effects,
    ) {
        self.surface_error(&error, effects);
        self.drop_connection(close);
        self.connection_lost(now, effects);
    }

    /// Decide between reconnecting and going idle after losing the socket.
    fn connection_lost(&mut self, now: Instant, effects: &mut Effects) {
        let was_connected = self.state == ConnectionState::Connected;
        if self.subscriptions.is_empty() && (was_connected || self.config.lazy) {
            self.set_state(ConnectionState::Disconnected);
            return;
        }
        self.schedule_reconnect(now, effects);
    }

    fn schedule_reconnect(&mut self, now: Instant, effects: &mut Effects) {
        let max = self.config.max_reconnect_attempts;
        if self.reconnect_attempts >= max {
            error!(attempts = max, "reconnection abandoned");
            self.reconnect_at = None;
            self.set_state(ConnectionState::Disconnected);
            self.surface_error(&ClientError::ReconnectExhausted { attempts: max }, effects);
            return;
        }

        let delay = self.config.reconnect_delay_for(self.reconnect_attempts);
        self.reconnect_attempts += 1;
        self.reconnect_at = Some(deadline(now, delay));
        self.set_state(ConnectionState::Reconnecting);
        info!(
            attempt = self.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
    }

    fn handle_error(
        &mut self,
        conn: ConnectionId,
        now: Instant,
        message: &str,
        effects: &mut Effects,
    ) {
        if !self.is_current(conn) {
            debug!(%conn, error = message, "error for stale connection ignored");
            return;
        }
        warn!(error = message, state = %self.state, "connection error");
        self.fail_connection(now, ClientError::Connection(message.to_string()), None, effects);
    }

    fn handle_close(
        &mut self,
        conn: ConnectionId,
        now: Instant,
        event: &CloseEvent,
        effects: &mut Effects,
    ) {
        if !self.is_current(conn) {
            debug!(%conn, code = event.code, "close for stale connection ignored");
            return;
        }
        self.drop_connection(None);

        if event.is_clean() {
            info!(code = event.code, reason = %event.reason, "connection closed");
            self.reconnect_at = None;
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        warn!(code = event.code, reason = %event.reason, "connection closed unexpectedly");
        self.connection_lost(now, effects);
    }

    fn tick(&mut self, now: Instant, effects: &mut Effects) {
        if let Some(at) = self.connect_deadline {
            if now >= at && self.state == ConnectionState::Connecting {
                let timeout_ms = self.config.connection_timeout.as_millis() as u64;
                warn!(timeout_ms, "connection_ack not received in time");
                self.fail_connection(
                    now,
                    ClientError::ConnectionTimeout(timeout_ms),
                    Some((CLOSE_INIT_TIMEOUT, "Connection initialisation timeout")),
                    effects,
                );
            }
        }

        if let Some(at) = self.reconnect_at {
            if now >= at && self.state == ConnectionState::Reconnecting {
                self.open_connection(now, effects);
            }
        }

        if let Some(at) = self.next_ping_at {
            if now >= at && self.state == ConnectionState::Connected {
                match self.send(&Message::ping()) {
                    Ok(()) => {
                        self.next_ping_at = Some(deadline(now, self.config.keep_alive_interval));
                    }
                    Err(e) => self.fail_connection(now, e, None, effects),
                }
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        [self.connect_deadline, self.reconnect_at, self.next_ping_at]
            .into_iter()
            .flatten()
            .min()
    }

    fn shutdown(&mut self) {
        self.drop_connection(Some((CLOSE_NORMAL, "Normal Closure")));
        self.reconnect_at = None;
        self.reconnect_attempts = 0;
        self.set_state(ConnectionState::Disconnected);
    }

    // --- Frames ---

    fn handle_message(
        &mut self,
        conn: ConnectionId,
        now: Instant,
        frame: &str,
        effects: &mut Effects,
    ) {
        if !self.is_current(conn) {
            debug!(%conn, "frame from stale connection ignored");
            return;
        }
        let message = match decode(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping frame");
                return;
            }
        };
        debug!(kind = %message.message_type(), id = message.id(), "frame received");

        match message {
            Message::ConnectionAck { .. } => self.handle_ack(now, effects),
            Message::Ping { .. } => {
                if let Err(e) = self.send(&Message::pong()) {
                    self.fail_connection(now, e, None, effects);
                }
            }
            Message::Pong { .. } => {}
            Message::Next { id, payload } => self.handle_next(&id, &payload, effects),
            Message::Error { id, payload } => self.handle_error_frame(&id, payload.as_ref(), effects),
            Message::Complete { id } => self.handle_complete(&id, effects),
            other @ (Message::ConnectionInit { .. } | Message::Subscribe { .. }) => {
                warn!(kind = %other.message_type(), "unexpected client frame from server");
            }
        }
    }

    /// Subscription frames only count once the handshake has completed.
    fn accepts_data(&self, wire_id: &str) -> bool {
        if self.state != ConnectionState::Connected {
            debug!(id = wire_id, state = %self.state, "frame before handshake ignored");
            return false;
        }
        true
    }

    fn handle_next(&mut self, wire_id: &str, payload: &Value, effects: &mut Effects) {
        if !self.accepts_data(wire_id) {
            return;
        }
        let Some(sub) = self.lookup(wire_id) else {
            debug!(id = wire_id, "next for unknown subscription");
            return;
        };

        let data = Message::next_data(payload);
        sub.state.update(|s| {
            s.data = Some(data.clone());
            s.error = None;
        });
        sub.emit(SubscriptionEvent::Data(data.clone()));
        if let Some(cb) = sub.on_data.clone() {
            effects.push(move || cb(&data));
        }
    }

    fn handle_error_frame(&mut self, wire_id: &str, payload: Option<&Value>, effects: &mut Effects) {
        if !self.accepts_data(wire_id) {
            return;
        }
        let Some(sub) = self.lookup(wire_id) else {
            debug!(id = wire_id, "error for unknown subscription");
            return;
        };

        let error = ClientError::Subscription {
            id: sub.id,
            message: Message::error_message(payload),
        };
        sub.deliver_error(error, effects);
    }

    fn handle_complete(&mut self, wire_id: &str, effects: &mut Effects) {
        if !self.accepts_data(wire_id) {
            return;
        }
        let Some(sub) = SubscriptionId::parse(wire_id).and_then(|id| self.subscriptions.remove(&id))
        else {
            debug!(id = wire_id, "complete for unknown subscription");
            return;
        };

        sub.state.update(|s| s.active = false);
        sub.emit(SubscriptionEvent::Complete);
        if let Some(cb) = sub.on_complete.clone() {
            effects.push(move || cb());
        }
        info!(id = %sub.id, "subscription completed by server");
    }

    // --- Subscriptions ---

    fn subscribe(
        &mut self,
        options: SubscribeOptions,
        transport: Weak<Shared>,
        now: Instant,
        effects: &mut Effects,
    ) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let (sender, receiver) = bounded(self.config.event_buffer_size.max(1));
        let state = ReactiveCell::new(SubscriptionState {
            data: None,
            error: None,
            active: self.state == ConnectionState::Connected,
            connection_state: self.state,
        });
        let operation_name = options
            .operation_name
            .or_else(|| options.query.operation_name());
        let sub = Subscription {
            id,
            query: options.query.canonicalize(),
            variables: options.variables,
            operation_name,
            state: state.clone(),
            events: sender,
            on_data: options.on_data,
            on_error: options.on_error,
            on_complete: options.on_complete,
        };
        let frame = encode(&sub.subscribe_message());
        self.subscriptions.insert(id, sub);
        debug!(%id, "subscription registered");

        match frame {
            Ok(frame) if self.state == ConnectionState::Connected => {
                if let Err(e) = self.send_raw(&frame) {
                    self.fail_connection(now, e, None, effects);
                }
            }
            Ok(frame) => self.outbound.push((id, frame)),
            Err(e) => warn!(%id, error = %e, "could not encode subscribe frame"),
        }

        if self.config.lazy && self.state == ConnectionState::Disconnected {
            self.open_connection(now, effects);
        }

        SubscriptionHandle::new(id, state, receiver, transport)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.outbound.retain(|(queued, _)| *queued != id);
        let Some(sub) = self.subscriptions.remove(&id) else {
            return;
        };

        if self.state == ConnectionState::Connected {
            if let Err(e) = self.send(&Message::complete(id.to_wire())) {
                warn!(%id, error = %e, "could not send complete frame");
            }
        }
        sub.state.update(|s| s.active = false);
        sub.emit(SubscriptionEvent::Unsubscribed);
        debug!(%id, "subscription removed");

        if self.config.lazy
            && self.subscriptions.is_empty()
            && self.state != ConnectionState::Disconnected
        {
            info!("last subscription gone, closing lazy connection");
            self.shutdown();
        }
    }
}

/// Lock shared between the transport and its handles.
pub(crate) struct Shared {
    inner: Mutex<TransportInner>,
}

impl Shared {
    /// Run `f` under the lock inside one batch. Cell listeners and
    /// callbacks fire after the lock is released, in that order.
    fn run<R>(&self, f: impl FnOnce(&mut TransportInner, &mut Effects) -> R) -> R {
        let mut effects = Effects::default();
        let result = batch(|| {
            let mut inner = self.inner.lock();
            f(&mut inner, &mut effects)
        });
        effects.run();
        result
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        self.run(|inner, _| inner.unsubscribe(id));
    }
}

/// Client side of the `graphql-transport-ws` protocol.
///
/// The transport owns one connection and multiplexes subscriptions over
/// it. It never blocks and spawns nothing: the host forwards socket
/// events (`handle_open`, `handle_message`, `handle_error`,
/// `handle_close`) and drives timers with [`tick`](Self::tick), using
/// [`next_deadline`](Self::next_deadline) to know when to call it.
pub struct SubscriptionTransport {
    shared: Arc<Shared>,
}

impl SubscriptionTransport {
    /// Create a transport. Unless configured lazy, it starts connecting
    /// immediately.
    pub fn new(config: TransportConfig, connector: impl Connector + 'static) -> Result<Self> {
        config.validate()?;
        let lazy = config.lazy;

        let transport = Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(TransportInner {
                    config,
                    connector: Box::new(connector),
                    connection: None,
                    connection_id: None,
                    next_connection: 1,
                    init_sent: false,
                    state: ConnectionState::Disconnected,
                    state_cell: ReactiveCell::new(ConnectionState::Disconnected),
                    subscriptions: BTreeMap::new(),
                    outbound: Vec::new(),
                    next_id: 1,
                    reconnect_attempts: 0,
                    connect_deadline: None,
                    reconnect_at: None,
                    next_ping_at: None,
                }),
            }),
        };

        if !lazy {
            let now = Instant::now();
            transport
                .shared
                .run(|inner, effects| inner.open_connection(now, effects));
        }
        Ok(transport)
    }

    /// Register a subscription. Returns immediately; frames are sent now
    /// if connected, otherwise on the next handshake.
    pub fn subscribe(&self, options: SubscribeOptions) -> SubscriptionHandle {
        let weak = Arc::downgrade(&self.shared);
        let now = Instant::now();
        self.shared
            .run(|inner, effects| inner.subscribe(options, weak, now, effects))
    }

    /// Cancel a subscription. Safe to call more than once.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.unsubscribe(id);
    }

    // --- Socket events ---
    //
    // Each event names the connection it came from. Events for any socket
    // other than the current one are ignored.

    /// The socket finished opening; starts the handshake.
    pub fn handle_open(&self, conn: ConnectionId, now: Instant) {
        self.shared
            .run(|inner, effects| inner.handle_open(conn, now, effects));
    }

    /// A text frame arrived.
    pub fn handle_message(&self, conn: ConnectionId, now: Instant, frame: &str) {
        self.shared
            .run(|inner, effects| inner.handle_message(conn, now, frame, effects));
    }

    /// The socket reported an error.
    pub fn handle_error(&self, conn: ConnectionId, now: Instant, message: &str) {
        self.shared
            .run(|inner, effects| inner.handle_error(conn, now, message, effects));
    }

    /// The socket closed.
    pub fn handle_close(&self, conn: ConnectionId, now: Instant, event: CloseEvent) {
        self.shared
            .run(|inner, effects| inner.handle_close(conn, now, &event, effects));
    }

    // --- Timers ---

    /// Fire every timer due at `now`.
    pub fn tick(&self, now: Instant) {
        self.shared.run(|inner, effects| inner.tick(now, effects));
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.shared.inner.lock().next_deadline()
    }

    // --- Control ---

    /// Drop the current connection and connect again with a fresh
    /// attempt counter.
    pub fn reconnect(&self, now: Instant) {
        info!("reconnect requested");
        self.shared.run(|inner, effects| {
            inner.reconnect_attempts = 0;
            inner.open_connection(now, effects);
        });
    }

    /// Close the connection without reconnecting. Subscriptions stay
    /// registered and are resent after a later [`reconnect`](Self::reconnect).
    pub fn close(&self) {
        self.shared.run(|inner, _| inner.shutdown());
    }

    // --- Introspection ---

    /// Id of the connection currently open or opening.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.shared.inner.lock().connection_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Reactive view of the connection state.
    pub fn connection_state_cell(&self) -> ReactiveCell<ConnectionState> {
        self.shared.inner.lock().state_cell.clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.inner.lock().subscriptions.len()
    }

    pub fn has_subscription(&self, id: SubscriptionId) -> bool {
        self.shared.inner.lock().subscriptions.contains_key(&id)
    }

    /// Ids of registered subscriptions, in registration order.
    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.shared.inner.lock().subscriptions.keys().copied().collect()
    }

    /// Subscribe frames waiting for a handshake.
    pub fn queued_frames(&self) -> usize {
        self.shared.inner.lock().outbound.len()
    }

    /// Reconnect cycles since the last successful handshake.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.inner.lock().reconnect_attempts
    }
}

impl Drop for SubscriptionTransport {
    fn drop(&mut self) {
        self.shared
            .inner
            .lock()
            .drop_connection(Some((CLOSE_NORMAL, "Normal Closure")));
    }
}
