#![cfg(feature = "ws")]
#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use reconnecting_socket::ws::config::Config;
use reconnecting_socket::ws::message::Payload;
use reconnecting_socket::ws::{Client, ConnectionState};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::common::{Recorder, wait_for_state};

/// Mock WebSocket server.
struct MockWsServer {
    addr: SocketAddr,
    /// Broadcast messages to ALL connected clients
    message_tx: broadcast::Sender<String>,
    /// Drop every live connection without a close handshake
    disconnect_tx: broadcast::Sender<()>,
    /// Frames received from clients, heartbeats excluded
    received_rx: mpsc::UnboundedReceiver<Message>,
    /// Number of accepted WebSocket connections
    connections: Arc<AtomicUsize>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (message_tx, _) = broadcast::channel::<String>(100);
        let (disconnect_tx, _) = broadcast::channel::<()>(4);
        let (received_tx, received_rx) = mpsc::unbounded_channel::<Message>();
        let connections = Arc::new(AtomicUsize::new(0));

        let broadcast_tx = message_tx.clone();
        let kill_tx = disconnect_tx.clone();
        let accepted = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                accepted.fetch_add(1, Ordering::SeqCst);

                let (mut write, mut read) = ws_stream.split();
                let received_tx = received_tx.clone();
                let mut msg_rx = broadcast_tx.subscribe();
                let mut kill_rx = kill_tx.subscribe();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) if text.as_str() == "ping" => {
                                        if write.send(Message::Text("pong".into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Some(Ok(Message::Text(text))) => {
                                        drop(received_tx.send(Message::Text(text.clone())));
                                        if write.send(Message::Text(text)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Some(Ok(close @ Message::Close(_))) => {
                                        drop(received_tx.send(close));
                                        break;
                                    }
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            msg = msg_rx.recv() => {
                                match msg {
                                    Ok(text) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(_) => break,
                                }
                            }
                            _ = kill_rx.recv() => break,
                        }
                    }
                });
            }
        });

        Self {
            addr,
            message_tx,
            disconnect_tx,
            received_rx,
            connections,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/stream", self.addr)
    }

    /// Send a message to all connected clients.
    fn send(&self, message: &str) {
        drop(self.message_tx.send(message.to_owned()));
    }

    fn disconnect_all(&self) {
        drop(self.disconnect_tx.send(()));
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Receive the next frame sent by a client.
    async fn recv(&mut self) -> Option<Message> {
        timeout(Duration::from_secs(2), self.received_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

fn config(server: &MockWsServer) -> Config {
    Config::builder()
        .address(server.ws_url())
        .reconnect_interval(Duration::from_millis(50))
        .max_reconnect_interval(Duration::from_millis(200))
        .ping_interval(Duration::from_millis(100))
        .connect_timeout(Duration::from_secs(2))
        .build()
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn exchanges_messages_and_hides_heartbeats() {
    let mut server = MockWsServer::start().await;
    let client = Client::websocket(config(&server)).unwrap();
    let recorder = Recorder::default();
    client.use_connection_interceptor(recorder.clone());
    client.use_message_interceptor(recorder.clone());
    wait_for_state(&client, ConnectionState::Open).await;

    assert!(client.send(&json!({"op": "subscribe"})));
    assert_eq!(
        server.recv().await,
        Some(Message::Text(r#"{"op":"subscribe"}"#.into()))
    );

    server.send("tick");
    // Let a few heartbeats and their pongs go by.
    sleep(Duration::from_millis(350)).await;

    let messages = recorder.messages();
    assert_eq!(
        messages.iter().map(|m| m.payload.clone()).collect::<Vec<_>>(),
        vec![
            Payload::Json(json!({"op": "subscribe"})),
            Payload::Text("tick".to_owned()),
        ]
    );
    assert_eq!(recorder.opens(), 1);
}

#[tokio::test]
async fn reconnects_after_the_server_drops_the_connection() {
    let server = MockWsServer::start().await;
    let client = Client::websocket(config(&server)).unwrap();
    let recorder = Recorder::default();
    client.use_connection_interceptor(recorder.clone());
    wait_for_state(&client, ConnectionState::Open).await;
    eventually(|| recorder.opens() == 1).await;

    server.disconnect_all();

    eventually(|| recorder.opens() == 2).await;
    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(server.connections(), 2);
}

#[tokio::test]
async fn close_sends_a_close_frame_and_stays_closed() {
    let mut server = MockWsServer::start().await;
    let client = Client::websocket(config(&server)).unwrap();
    wait_for_state(&client, ConnectionState::Open).await;

    client.close().await;

    match server.recv().await {
        Some(Message::Close(Some(frame))) => {
            assert_eq!(frame.code, CloseCode::Normal);
            assert_eq!(frame.reason.as_str(), "normal closure");
        }
        other => panic!("expected a close frame, got {other:?}"),
    }

    sleep(Duration::from_millis(300)).await;
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn unreachable_server_exhausts_reconnect_attempts() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let config = Config::builder()
        .address(format!("ws://{addr}"))
        .reconnect_interval(Duration::from_millis(10))
        .max_reconnect_attempts(2)
        .build();
    let client = Client::websocket(config).unwrap();
    let recorder = Recorder::default();
    client.use_connection_interceptor(recorder.clone());

    // Initial attempt plus two retries, each reporting its connection error.
    eventually(|| recorder.errors().len() >= 2).await;
    wait_for_state(&client, ConnectionState::Closed).await;
    sleep(Duration::from_millis(100)).await;

    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(recorder.errors().len() <= 3, "{:?}", recorder.errors());
    assert_eq!(recorder.opens(), 0);
}

#[tokio::test]
async fn invalid_address_is_retried_as_a_failed_attempt() {
    let config = Config::builder()
        .address("http://not-a-websocket")
        .reconnect_interval(Duration::from_millis(10))
        .max_reconnect_attempts(1)
        .build();
    let client = Client::websocket(config).unwrap();
    let recorder = Recorder::default();
    client.use_connection_interceptor(recorder.clone());

    eventually(|| !recorder.errors().is_empty()).await;
    wait_for_state(&client, ConnectionState::Closed).await;

    assert!(recorder.errors()[0].contains("http"), "{:?}", recorder.errors());
}
