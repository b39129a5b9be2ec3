//! Connects to a public echo server, sends a few messages and prints what comes back.
//!
//! The client keeps reconnecting with backoff if the server drops the connection; kill your
//! network for a moment to watch it recover.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=debug cargo run --example echo --features tracing -- wss://echo.websocket.org
//! ```

use std::time::Duration;

use reconnecting_socket::error::{BoxError, Error};
use reconnecting_socket::ws::config::Config;
use reconnecting_socket::ws::message::InboundMessage;
use reconnecting_socket::ws::transport::OpenEvent;
use reconnecting_socket::ws::{Client, ConnectionInterceptor};
use serde_json::json;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

const DEFAULT_ADDRESS: &str = "wss://echo.websocket.org";

struct LoggingInterceptor;

impl ConnectionInterceptor for LoggingInterceptor {
    fn on_open(&self, event: &OpenEvent) {
        info!(protocol = ?event.protocol, "Connected");
    }

    fn on_error(&self, error: &Error) {
        warn!(%error, kind = ?error.kind(), "Connection error");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_owned());

    let config = Config::builder()
        .address(address)
        .reconnect_interval(Duration::from_millis(500))
        .max_reconnect_interval(Duration::from_secs(10))
        .ping_interval(Duration::from_secs(5))
        .pong_timeout(Duration::from_secs(15))
        .build();
    let client = Client::websocket(config)?;

    client.use_connection_interceptor(LoggingInterceptor);
    client.use_message_interceptor(|message: &InboundMessage| -> Result<(), BoxError> {
        info!(payload = ?message.payload, at = message.received_at_millis, "Message");
        Ok(())
    });

    let mut state = client.state_receiver();
    timeout(Duration::from_secs(10), state.wait_for(|state| state.is_open())).await??;

    for sequence in 0..3 {
        let sent = client.send(&json!({"op": "echo", "sequence": sequence}));
        info!(sequence, sent, "Sent");
        sleep(Duration::from_secs(1)).await;
    }
    client.send("plain text survives untouched");

    sleep(Duration::from_secs(2)).await;
    client.close().await;
    info!(state = %client.state(), "Done");

    Ok(())
}
