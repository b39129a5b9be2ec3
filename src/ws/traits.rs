//! Core traits: the transport capability and the interceptor slots.

use super::message::InboundMessage;
use super::transport::{OpenEvent, TransportHandle};
use crate::error::{BoxError, Error};

/// Capability to open a bidirectional, message-oriented connection.
///
/// Implementations return immediately with a [`TransportHandle`] and report the outcome of
/// the handshake asynchronously through the matching
/// [`TransportPeer`](super::transport::TransportPeer). An `Err` here means the transport
/// could not even be constructed (invalid address, runtime refusal) and counts as a failed
/// connection attempt.
///
/// # Example
///
/// ```ignore
/// struct Loopback;
///
/// impl Connector for Loopback {
///     fn open(&self, _address: &str, _protocols: &[String]) -> Result<TransportHandle> {
///         let (handle, peer) = TransportHandle::channel();
///         peer.emit(TransportEvent::Open(OpenEvent::default()));
///         tokio::spawn(drive(peer));
///         Ok(handle)
///     }
/// }
/// ```
pub trait Connector: Send + Sync + 'static {
    fn open(&self, address: &str, protocols: &[String]) -> crate::Result<TransportHandle>;
}

/// Connection lifecycle callbacks.
pub trait ConnectionInterceptor: Send + Sync + 'static {
    /// Called every time the transport opens.
    fn on_open(&self, event: &OpenEvent);

    /// Called for transport errors, connect timeouts and heartbeat timeouts. Errors alone
    /// never change the connection state.
    fn on_error(&self, error: &Error) {
        let _ = error;
    }
}

/// Inbound message callbacks.
pub trait MessageInterceptor: Send + Sync + 'static {
    fn on_message(&self, message: &InboundMessage) -> Result<(), BoxError>;

    /// Called when [`MessageInterceptor::on_message`] fails or panics.
    fn on_error(&self, error: &Error) {
        let _ = error;
    }
}

impl<F> ConnectionInterceptor for F
where
    F: Fn(&OpenEvent) + Send + Sync + 'static,
{
    fn on_open(&self, event: &OpenEvent) {
        self(event);
    }
}

/// An `(on_open, on_error)` pair of closures.
impl<O, E> ConnectionInterceptor for (O, E)
where
    O: Fn(&OpenEvent) + Send + Sync + 'static,
    E: Fn(&Error) + Send + Sync + 'static,
{
    fn on_open(&self, event: &OpenEvent) {
        (self.0)(event);
    }

    fn on_error(&self, error: &Error) {
        (self.1)(error);
    }
}

impl<F> MessageInterceptor for F
where
    F: Fn(&InboundMessage) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn on_message(&self, message: &InboundMessage) -> Result<(), BoxError> {
        self(message)
    }
}

/// An `(on_message, on_error)` pair of closures.
impl<M, E> MessageInterceptor for (M, E)
where
    M: Fn(&InboundMessage) -> Result<(), BoxError> + Send + Sync + 'static,
    E: Fn(&Error) + Send + Sync + 'static,
{
    fn on_message(&self, message: &InboundMessage) -> Result<(), BoxError> {
        (self.0)(message)
    }

    fn on_error(&self, error: &Error) {
        (self.1)(error);
    }
}
