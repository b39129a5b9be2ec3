#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::any::Any;
use std::future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use super::config::{Config, PingMessage};
use super::error::WsError;
use super::message::{InboundMessage, is_heartbeat};
use super::timer::{Timer, deadline_after};
use super::traits::{ConnectionInterceptor, Connector, MessageInterceptor};
use super::transport::{
    CLIENT_TIMEOUT, CloseFrame, GOING_AWAY, NORMAL_CLOSURE, OpenEvent, TransportEvent,
    TransportHandle,
};
use crate::error::{Error, Kind};

/// Connection state tracking.
///
/// Tracked independently of the transport so that "closed, reconnect pending" and
/// "closed on request" can be told apart together with the manual-close flag.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// A transport is being opened, or a retry after a connect timeout is pending
    Connecting,
    /// The transport is open
    Open,
    /// A requested close is in progress
    Closing,
    /// No transport
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Requests from [`Client`](super::Client) handles to the connection task.
pub(crate) enum Command {
    Connect(oneshot::Sender<()>),
    Close {
        frame: CloseFrame,
        done: oneshot::Sender<()>,
    },
    Reconnect(oneshot::Sender<()>),
    Send(String),
    ConnectionInterceptor(Arc<dyn ConnectionInterceptor>),
    MessageInterceptor(Arc<dyn MessageInterceptor>),
}

enum Event {
    Command(Command),
    Transport(TransportEvent),
    ConnectTimeout,
    PongTimeout,
    Heartbeat(Instant),
    Reconnect,
}

/// Owns the transport, the timers and the interceptors of one client.
///
/// Runs as a single task: every transport event, timer expiry and command is handled to
/// completion before the next one is looked at.
pub(crate) struct Connection<C: Connector> {
    config: Config,
    connector: C,
    state_tx: watch::Sender<ConnectionState>,
    commands: mpsc::UnboundedReceiver<Command>,
    transport: Option<TransportHandle>,
    /// Reconnect attempts since the last successful open
    attempts: u32,
    /// Set by `close()`, suppresses every automatic reconnect
    manual_close: bool,
    connect_timer: Timer,
    heartbeat_timer: Timer,
    pong_timer: Timer,
    reconnect_timer: Timer,
    /// Last payload produced by a [`PingMessage::Producer`]
    last_ping: Option<String>,
    connection_interceptor: Option<Arc<dyn ConnectionInterceptor>>,
    message_interceptor: Option<Arc<dyn MessageInterceptor>>,
}

impl<C: Connector> Connection<C> {
    pub(crate) fn new(
        config: Config,
        connector: C,
        state_tx: watch::Sender<ConnectionState>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            config,
            connector,
            state_tx,
            commands,
            transport: None,
            attempts: 0,
            manual_close: false,
            connect_timer: Timer::default(),
            heartbeat_timer: Timer::default(),
            pong_timer: Timer::default(),
            reconnect_timer: Timer::default(),
            last_ping: None,
            connection_interceptor: None,
            message_interceptor: None,
        }
    }

    /// Main event loop. Exits once every client handle has been dropped.
    pub(crate) async fn run(mut self) {
        self.connect();

        loop {
            // Commands first, so interceptors registered before an event are in place for it.
            let event = tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => Event::Command(command),
                    None => break,
                },
                event = next_transport_event(self.transport.as_mut()) => Event::Transport(event),
                _ = self.connect_timer.fired() => Event::ConnectTimeout,
                _ = self.pong_timer.fired() => Event::PongTimeout,
                deadline = self.heartbeat_timer.fired() => Event::Heartbeat(deadline),
                _ = self.reconnect_timer.fired() => Event::Reconnect,
            };

            self.handle(event);
        }

        self.shutdown();
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Command(command) => self.on_command(command),
            Event::Transport(TransportEvent::Open(open)) => self.on_open(&open),
            Event::Transport(TransportEvent::Message(text)) => self.on_message(text),
            Event::Transport(TransportEvent::Error(error)) => self.on_transport_error(&error),
            Event::Transport(TransportEvent::Close(frame)) => self.on_close(&frame),
            Event::ConnectTimeout => self.on_connect_timeout(),
            Event::PongTimeout => self.on_pong_timeout(),
            Event::Heartbeat(deadline) => self.on_heartbeat(deadline),
            Event::Reconnect => {
                self.attempts = self.attempts.saturating_add(1);
                self.connect();
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect(done) => {
                self.manual_close = false;
                self.connect();
                _ = done.send(());
            }
            Command::Close { frame, done } => {
                self.close(frame);
                _ = done.send(());
            }
            Command::Reconnect(done) => {
                self.reconnect();
                _ = done.send(());
            }
            Command::Send(text) => self.send(text),
            Command::ConnectionInterceptor(interceptor) => {
                self.connection_interceptor = Some(interceptor);
            }
            Command::MessageInterceptor(interceptor) => {
                self.message_interceptor = Some(interceptor);
            }
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });

        #[cfg(feature = "tracing")]
        if changed {
            tracing::debug!(%state, "Connection state changed");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = changed;
    }

    /// Open a fresh transport unless already open.
    fn connect(&mut self) {
        if self.state().is_open() {
            #[cfg(feature = "tracing")]
            tracing::debug!("connect() ignored, connection already open");
            return;
        }

        self.reconnect_timer.cancel();
        self.connect_timer.cancel();
        if let Some(stale) = self.transport.take() {
            stale.close(CloseFrame::new(NORMAL_CLOSURE, "superseded"));
        }

        self.set_state(ConnectionState::Connecting);

        match self
            .connector
            .open(&self.config.address, &self.config.protocols)
        {
            Ok(transport) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    address = %self.config.address,
                    attempt = self.attempts,
                    "Opening transport"
                );
                self.transport = Some(transport);
                self.connect_timer.arm(self.config.connect_timeout);
            }
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(address = %self.config.address, %error, "Unable to create transport");
                self.notify_error(&error);
                self.on_lost(ConnectionState::Closed);
            }
        }
    }

    /// Manual close: suppresses reconnects until the next `connect()` or `reconnect()`.
    fn close(&mut self, frame: CloseFrame) {
        self.manual_close = true;
        self.cancel_timers();

        if let Some(transport) = self.transport.take() {
            self.set_state(ConnectionState::Closing);
            #[cfg(feature = "tracing")]
            tracing::info!(code = frame.code, reason = %frame.reason, "Closing connection");
            transport.close(frame);
        }

        self.set_state(ConnectionState::Closed);
    }

    fn reconnect(&mut self) {
        self.attempts = 0;
        self.close(CloseFrame::new(NORMAL_CLOSURE, "reconnect"));
        self.manual_close = false;
        self.connect();
    }

    fn send(&self, text: String) {
        match self.transport.as_ref() {
            Some(transport) if self.state().is_open() => {
                if let Err(e) = transport.send(text) {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Failed to hand message to transport");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
            }
            _ => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%text, "Dropping outbound message, connection is not open");
                #[cfg(not(feature = "tracing"))]
                let _ = &text;
            }
        }
    }

    fn on_open(&mut self, event: &OpenEvent) {
        self.connect_timer.cancel();
        self.attempts = 0;
        self.set_state(ConnectionState::Open);

        #[cfg(feature = "tracing")]
        tracing::info!(
            address = %self.config.address,
            protocol = ?event.protocol,
            "Connection open"
        );

        if let Some(interceptor) = &self.connection_interceptor {
            contain("on_open", || interceptor.on_open(event));
        }

        self.start_heartbeat();
    }

    fn on_message(&mut self, text: String) {
        // Any inbound frame proves the peer is alive.
        self.pong_timer.cancel();

        let ping = match &self.config.ping_message {
            PingMessage::Text(ping) => Some(ping.as_str()),
            PingMessage::Producer(_) => self.last_ping.as_deref(),
        };
        if is_heartbeat(&text, ping) {
            #[cfg(feature = "tracing")]
            tracing::trace!(%text, "Heartbeat frame received");
            return;
        }

        let Some(interceptor) = self.message_interceptor.as_ref() else {
            #[cfg(feature = "tracing")]
            tracing::trace!(%text, "No message interceptor registered, dropping message");
            return;
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(%text, "Received message");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let message = InboundMessage::new(text);
            interceptor.on_message(&message)
        }));

        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => Error::with_boxed_source(Kind::Interceptor, e),
            Err(panic) => Error::interceptor(panic_message(panic.as_ref())),
        };

        #[cfg(feature = "tracing")]
        tracing::warn!(%error, "Message interceptor failed");

        contain("on_error", || interceptor.on_error(&error));
    }

    fn on_transport_error(&self, error: &Error) {
        #[cfg(feature = "tracing")]
        tracing::warn!(%error, "Transport error");
        self.notify_error(error);
    }

    fn on_close(&mut self, frame: &CloseFrame) {
        self.transport = None;

        #[cfg(feature = "tracing")]
        tracing::info!(code = frame.code, reason = %frame.reason, "Connection closed");
        #[cfg(not(feature = "tracing"))]
        let _ = frame;

        self.on_lost(ConnectionState::Closed);
    }

    fn on_connect_timeout(&mut self) {
        if self.state().is_open() {
            return;
        }

        let timeout = self.config.connect_timeout;
        #[cfg(feature = "tracing")]
        tracing::warn!(?timeout, "Transport did not open in time");

        if let Some(transport) = self.transport.take() {
            transport.close(CloseFrame::new(CLIENT_TIMEOUT, "connect timeout"));
        }
        self.notify_error(&WsError::ConnectTimeout(timeout).into());
        self.on_lost(ConnectionState::Connecting);
    }

    fn on_pong_timeout(&mut self) {
        let Some(timeout) = self.config.pong_timeout else {
            return;
        };

        #[cfg(feature = "tracing")]
        tracing::warn!(?timeout, "No heartbeat response, dropping transport");

        if let Some(transport) = self.transport.take() {
            transport.close(CloseFrame::new(CLIENT_TIMEOUT, "heartbeat timeout"));
        }
        self.notify_error(&WsError::HeartbeatTimeout(timeout).into());
        self.on_lost(ConnectionState::Closed);
    }

    fn on_heartbeat(&mut self, deadline: Instant) {
        if !self.state().is_open() {
            return;
        }

        let payload = self.config.ping_message.payload();
        let sent = self
            .transport
            .as_ref()
            .is_some_and(|transport| transport.send(payload.clone()).is_ok());

        #[cfg(feature = "tracing")]
        if sent {
            tracing::trace!(%payload, "Heartbeat sent");
        } else {
            tracing::warn!(%payload, "Unable to send heartbeat");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = sent;

        self.last_ping = Some(payload);
        if let Some(timeout) = self.config.pong_timeout
            && !self.pong_timer.is_armed()
        {
            self.pong_timer.arm(timeout);
        }
        self.heartbeat_timer
            .arm_at(deadline_after(deadline, self.config.ping_interval));
    }

    /// Shared path for every unexpected loss of the transport.
    ///
    /// `pending` is the state reported while a reconnect is scheduled.
    fn on_lost(&mut self, pending: ConnectionState) {
        self.connect_timer.cancel();
        self.stop_heartbeat();

        let scheduled =
            !self.manual_close && self.config.auto_reconnect && self.schedule_reconnect();

        self.set_state(if scheduled {
            pending
        } else {
            ConnectionState::Closed
        });
    }

    fn schedule_reconnect(&mut self) -> bool {
        let max = self.config.max_reconnect_attempts;
        if max != 0 && self.attempts >= max {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                attempts = self.attempts,
                "Maximum reconnect attempts reached, giving up"
            );
            return false;
        }

        let delay = self.config.reconnect_delay(self.attempts);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            attempt = self.attempts.saturating_add(1),
            ?delay,
            "Scheduling reconnect"
        );
        self.reconnect_timer.arm(delay);
        true
    }

    fn start_heartbeat(&mut self) {
        self.stop_heartbeat();
        if self.config.heartbeat_enabled() {
            self.heartbeat_timer.arm(self.config.ping_interval);
        }
    }

    fn stop_heartbeat(&mut self) {
        self.heartbeat_timer.cancel();
        self.pong_timer.cancel();
        self.last_ping = None;
    }

    fn cancel_timers(&mut self) {
        self.connect_timer.cancel();
        self.reconnect_timer.cancel();
        self.stop_heartbeat();
    }

    fn notify_error(&self, error: &Error) {
        if let Some(interceptor) = &self.connection_interceptor {
            contain("on_error", || interceptor.on_error(error));
        }
    }

    fn shutdown(&mut self) {
        self.manual_close = true;
        self.cancel_timers();
        if let Some(transport) = self.transport.take() {
            transport.close(CloseFrame::new(GOING_AWAY, "client dropped"));
        }
        self.set_state(ConnectionState::Closed);

        #[cfg(feature = "tracing")]
        tracing::debug!("Connection task terminated");
    }
}

async fn next_transport_event(transport: Option<&mut TransportHandle>) -> TransportEvent {
    match transport {
        Some(transport) => transport.next_event().await,
        None => future::pending().await,
    }
}

/// Run a lifecycle callback, logging and swallowing a panic so the task keeps running.
fn contain<F: FnOnce()>(callback: &'static str, f: F) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(f)) {
        let message = panic_message(panic.as_ref());
        #[cfg(feature = "tracing")]
        tracing::error!(callback, %message, "Interceptor callback panicked");
        #[cfg(not(feature = "tracing"))]
        let _ = (callback, message);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "interceptor panicked".to_owned()
    }
}
