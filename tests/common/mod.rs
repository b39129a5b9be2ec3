#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reconnecting_socket::Result;
use reconnecting_socket::error::{BoxError, Error};
use reconnecting_socket::ws::config::Config;
use reconnecting_socket::ws::message::InboundMessage;
use reconnecting_socket::ws::transport::{
    CloseFrame, OpenEvent, Outbound, TransportEvent, TransportHandle, TransportPeer,
};
use reconnecting_socket::ws::{
    Client, ConnectionInterceptor, ConnectionState, Connector, MessageInterceptor, WsError,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};

pub const ADDRESS: &str = "ws://mock.invalid/stream";

/// A transport opened by [`MockConnector`], seen from the server side.
#[derive(Debug)]
pub struct MockSocket {
    pub peer: TransportPeer,
    pub address: String,
    pub protocols: Vec<String>,
    pub opened_at: Instant,
}

impl MockSocket {
    pub fn open(&self) {
        assert!(
            self.peer.emit(TransportEvent::Open(OpenEvent::new(None))),
            "socket was detached before open"
        );
    }

    pub fn message(&self, text: &str) -> bool {
        self.peer.emit(TransportEvent::Message(text.to_owned()))
    }

    pub fn error(&self) -> bool {
        self.peer
            .emit(TransportEvent::Error(WsError::ConnectionClosed.into()))
    }

    pub fn drop_connection(&self) -> bool {
        self.peer.emit(TransportEvent::Close(CloseFrame::abnormal()))
    }

    /// Everything the client has sent so far, without waiting.
    pub fn drain(&mut self) -> Vec<Outbound> {
        std::iter::from_fn(|| self.peer.try_next_outbound()).collect()
    }
}

/// Connector whose transports are handed to the test instead of a network.
#[derive(Clone)]
pub struct MockConnector {
    sockets: mpsc::UnboundedSender<MockSocket>,
    /// Number of upcoming `open` calls that fail construction
    failures: Arc<AtomicU32>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockSocket>) {
        let (sockets_tx, sockets_rx) = mpsc::unbounded_channel();
        let connector = Self {
            sockets: sockets_tx,
            failures: Arc::new(AtomicU32::new(0)),
        };
        (connector, sockets_rx)
    }

    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

impl Connector for MockConnector {
    fn open(&self, address: &str, protocols: &[String]) -> Result<TransportHandle> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::validation("mock construction failure"));
        }

        let (handle, peer) = TransportHandle::channel();
        _ = self.sockets.send(MockSocket {
            peer,
            address: address.to_owned(),
            protocols: protocols.to_vec(),
            opened_at: Instant::now(),
        });
        Ok(handle)
    }
}

/// Records every interceptor callback.
#[derive(Clone, Default)]
pub struct Recorder {
    pub opens: Arc<Mutex<Vec<OpenEvent>>>,
    pub errors: Arc<Mutex<Vec<String>>>,
    pub messages: Arc<Mutex<Vec<InboundMessage>>>,
    pub message_errors: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn opens(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<InboundMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn message_errors(&self) -> Vec<String> {
        self.message_errors.lock().unwrap().clone()
    }
}

impl ConnectionInterceptor for Recorder {
    fn on_open(&self, event: &OpenEvent) {
        self.opens.lock().unwrap().push(event.clone());
    }

    fn on_error(&self, error: &Error) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

impl MessageInterceptor for Recorder {
    fn on_message(&self, message: &InboundMessage) -> std::result::Result<(), BoxError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn on_error(&self, error: &Error) {
        self.message_errors.lock().unwrap().push(error.to_string());
    }
}

pub fn config() -> Config {
    Config::builder().address(ADDRESS).build()
}

/// Create a client and return it together with its first socket.
pub async fn start(
    config: Config,
) -> (
    Client,
    MockConnector,
    mpsc::UnboundedReceiver<MockSocket>,
    MockSocket,
) {
    let (connector, mut sockets) = MockConnector::new();
    let client = Client::new(config, connector.clone()).unwrap();
    let socket = next_socket(&mut sockets).await;
    (client, connector, sockets, socket)
}

/// Wait (in virtual time) for the next transport the client opens.
pub async fn next_socket(sockets: &mut mpsc::UnboundedReceiver<MockSocket>) -> MockSocket {
    timeout(Duration::from_secs(3600), sockets.recv())
        .await
        .expect("client did not open a transport")
        .unwrap()
}

pub async fn wait_for_state(client: &Client, state: ConnectionState) {
    let mut rx = client.state_receiver();
    timeout(Duration::from_secs(5), rx.wait_for(|current| *current == state))
        .await
        .unwrap_or_else(|_| panic!("state never became {state}, still {}", client.state()))
        .unwrap();
}

/// Let the connection task drain everything that is ready without moving the clock.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
