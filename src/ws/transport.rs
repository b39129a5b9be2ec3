//! Channel-based transport abstraction.
//!
//! A [`Connector`](super::Connector) hands the client a [`TransportHandle`] and keeps the
//! matching [`TransportPeer`] for whatever task drives the real socket. The client only ever
//! sees [`TransportEvent`]s; the driver only ever sees [`Outbound`] commands.

use tokio::sync::mpsc;

use crate::Result;
use crate::error::Error;
use crate::ws::error::WsError;

/// Normal closure, used by [`Client::close`](super::Client::close).
pub const NORMAL_CLOSURE: u16 = 1000;
/// Endpoint going away, used when the client is dropped.
pub const GOING_AWAY: u16 = 1001;
/// No status code was present in the close frame.
pub const NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Application code used when the client gives up on an unresponsive transport.
pub const CLIENT_TIMEOUT: u16 = 4000;

/// Close code and reason, as carried by a close frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn new<S: Into<String>>(code: u16, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn normal() -> Self {
        Self::new(NORMAL_CLOSURE, "normal closure")
    }

    #[must_use]
    pub fn abnormal() -> Self {
        Self::new(ABNORMAL_CLOSURE, "abnormal closure")
    }
}

/// Details of a successful open.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenEvent {
    /// Subprotocol selected by the server, if any
    pub protocol: Option<String>,
}

impl OpenEvent {
    #[must_use]
    pub fn new(protocol: Option<String>) -> Self {
        Self { protocol }
    }
}

/// Lifecycle events emitted by a transport.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportEvent {
    Open(OpenEvent),
    Message(String),
    Error(Error),
    Close(CloseFrame),
}

/// Commands from the client to the transport driver.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close(CloseFrame),
}

/// The client's side of a transport.
///
/// Dropping the handle detaches it: the driver observes a closed event channel and
/// any further events it emits are discarded.
#[derive(Debug)]
pub struct TransportHandle {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

/// The driver's side of a transport.
#[derive(Debug)]
pub struct TransportPeer {
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl TransportHandle {
    /// Create a connected handle/peer pair.
    #[must_use]
    pub fn channel() -> (TransportHandle, TransportPeer) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        (
            TransportHandle {
                events: events_rx,
                outbound: outbound_tx,
            },
            TransportPeer {
                events: events_tx,
                outbound: outbound_rx,
            },
        )
    }

    pub(crate) fn send(&self, text: String) -> Result<()> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    /// Request closure and detach. No further events from this transport are observed.
    pub(crate) fn close(self, frame: CloseFrame) {
        _ = self.outbound.send(Outbound::Close(frame));
    }

    /// Next lifecycle event. A driver that goes away without reporting a close is
    /// surfaced as an abnormal closure.
    pub(crate) async fn next_event(&mut self) -> TransportEvent {
        self.events
            .recv()
            .await
            .unwrap_or_else(|| TransportEvent::Close(CloseFrame::abnormal()))
    }
}

impl TransportPeer {
    /// Deliver an event to the client. Returns `false` once the handle has been dropped.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Next command from the client, or `None` once the handle is dropped and drained.
    pub async fn next_outbound(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Non-blocking variant of [`TransportPeer::next_outbound`].
    pub fn try_next_outbound(&mut self) -> Option<Outbound> {
        self.outbound.try_recv().ok()
    }

    /// Whether the client has detached from this transport.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.events.is_closed()
    }
}
