use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};

use super::config::Config;
use super::connection::{Command, Connection, ConnectionState};
use super::traits::{ConnectionInterceptor, Connector, MessageInterceptor};
use super::transport::{CloseFrame, NORMAL_CLOSURE};
use crate::Result;

/// Reconnecting socket client.
///
/// A cheap, cloneable handle to a background task that owns the transport, the connect,
/// heartbeat and reconnect timers, and the interceptors. The task starts connecting as soon
/// as the client is created and shuts down, closing the transport, once the last handle is
/// dropped.
///
/// # Example
///
/// ```rust, no_run
/// use reconnecting_socket::error::BoxError;
/// use reconnecting_socket::ws::Client;
/// use reconnecting_socket::ws::config::Config;
/// use reconnecting_socket::ws::message::InboundMessage;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = Config::builder().address("wss://echo.websocket.org").build();
///     let client = Client::websocket(config)?;
///
///     client.use_message_interceptor(|message: &InboundMessage| -> Result<(), BoxError> {
///         println!("received {:?}", message.payload);
///         Ok(())
///     });
///
///     let mut state = client.state_receiver();
///     state.wait_for(|state| state.is_open()).await?;
///     client.send(&serde_json::json!({"op": "subscribe"}));
///
///     client.close().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    /// Sender channel for requests to the connection task
    commands: mpsc::UnboundedSender<Command>,
    /// Watch channel receiver for state changes
    state_rx: watch::Receiver<ConnectionState>,
}

impl Client {
    /// Create a client over `connector` and start connecting.
    ///
    /// Fails if the configuration is invalid or when called outside of a tokio runtime.
    pub fn new<C: Connector>(config: Config, connector: C) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Closed);

        let connection = Connection::new(config, connector, state_tx, commands_rx);
        runtime.spawn(connection.run());

        Ok(Self {
            commands: commands_tx,
            state_rx,
        })
    }

    /// Create a client over a `tokio-tungstenite` WebSocket.
    #[cfg(feature = "ws")]
    pub fn websocket(config: Config) -> Result<Self> {
        Self::new(config, super::socket::TungsteniteConnector)
    }

    /// Open a transport unless already open. Clears a previous manual close.
    pub async fn connect(&self) {
        self.request(Command::Connect).await;
    }

    /// Close with code 1000, "normal closure".
    pub async fn close(&self) {
        self.close_with(NORMAL_CLOSURE, "normal closure").await;
    }

    /// Close the transport and suppress automatic reconnection.
    ///
    /// When this returns every timer has been cancelled and the transport detached.
    pub async fn close_with<S: Into<String>>(&self, code: u16, reason: S) {
        let frame = CloseFrame::new(code, reason);
        self.request(|done| Command::Close { frame, done }).await;
    }

    /// Drop the current transport and connect again right away, resetting the backoff.
    pub async fn reconnect(&self) {
        self.request(Command::Reconnect).await;
    }

    /// Send `data`. Strings are sent verbatim, anything else as JSON text.
    ///
    /// Returns `false`, without touching the transport, when the connection is not open or
    /// the payload cannot be serialized.
    ///
    /// `true` means the payload was accepted while the last observed state was
    /// [`ConnectionState::Open`], not that it was written. The state is a snapshot that can
    /// lag behind the connection task, so a transport lost in the meantime drops the payload.
    pub fn send<T: Serialize + ?Sized>(&self, data: &T) -> bool {
        if !self.state().is_open() {
            #[cfg(feature = "tracing")]
            tracing::warn!(state = %self.state(), "Cannot send, connection is not open");
            return false;
        }

        let text = match serde_json::to_value(data) {
            Ok(Value::String(text)) => text,
            Ok(value) => value.to_string(),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Unable to serialize outbound message");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                return false;
            }
        };

        self.commands.send(Command::Send(text)).is_ok()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Register the lifecycle interceptor, replacing any previous one.
    ///
    /// Accepts a [`ConnectionInterceptor`], an `on_open` closure, or an
    /// `(on_open, on_error)` pair of closures.
    pub fn use_connection_interceptor<I: ConnectionInterceptor>(&self, interceptor: I) {
        _ = self
            .commands
            .send(Command::ConnectionInterceptor(Arc::new(interceptor)));
    }

    /// Register the message interceptor, replacing any previous one.
    pub fn use_message_interceptor<I: MessageInterceptor>(&self, interceptor: I) {
        _ = self
            .commands
            .send(Command::MessageInterceptor(Arc::new(interceptor)));
    }

    /// Send a command and wait until the connection task has applied it.
    async fn request<F>(&self, command: F)
    where
        F: FnOnce(oneshot::Sender<()>) -> Command,
    {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(command(done_tx)).is_ok() {
            _ = done_rx.await;
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
