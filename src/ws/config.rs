use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;

use crate::Result;
use crate::error::Error;

const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_RECONNECT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_RECONNECT_DECAY: f64 = 1.5;
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PING_MESSAGE: &str = "ping";

/// Configuration for [`Client`](super::Client) behavior.
///
/// Every field except `address` has a default. Values are checked by [`Config::validate`]
/// when the client is constructed; invalid configurations are rejected rather than clamped.
///
/// ```
/// use std::time::Duration;
///
/// use reconnecting_socket::ws::config::Config;
///
/// let config = Config::builder()
///     .address("wss://example.com/stream")
///     .reconnect_interval(Duration::from_millis(500))
///     .max_reconnect_attempts(5)
///     .build();
///
/// assert!(config.validate().is_ok());
/// ```
#[non_exhaustive]
#[derive(Clone, Debug, Builder)]
pub struct Config {
    /// Target address of the socket
    #[builder(into)]
    pub address: String,
    /// Subprotocols requested during the handshake
    #[builder(default, into)]
    pub protocols: Vec<String>,
    /// Whether unexpected closes schedule a reconnect
    #[builder(default = true)]
    pub auto_reconnect: bool,
    /// Base delay before the first reconnect attempt
    #[builder(default = DEFAULT_RECONNECT_INTERVAL)]
    pub reconnect_interval: Duration,
    /// Upper bound on any reconnect delay
    #[builder(default = DEFAULT_MAX_RECONNECT_INTERVAL)]
    pub max_reconnect_interval: Duration,
    /// Multiplicative growth of the delay per attempt, at least 1
    #[builder(default = DEFAULT_RECONNECT_DECAY)]
    pub reconnect_decay: f64,
    /// Maximum number of consecutive reconnect attempts. Zero means unlimited.
    #[builder(default)]
    pub max_reconnect_attempts: u32,
    /// Heartbeat period. [`Duration::ZERO`] disables heartbeats.
    #[builder(default = DEFAULT_PING_INTERVAL)]
    pub ping_interval: Duration,
    /// Heartbeat payload
    #[builder(default, into)]
    pub ping_message: PingMessage,
    /// How long to wait for any inbound frame after a ping before the transport is
    /// considered dead. `None` never forces a reconnect.
    pub pong_timeout: Option<Duration>,
    /// Maximum time for the transport to open
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    pub connect_timeout: Duration,
}

impl Config {
    /// Check the configuration, returning a validation error on the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::validation("address must not be empty"));
        }
        if self.reconnect_interval.is_zero() {
            return Err(Error::validation("reconnect interval must be > 0"));
        }
        if self.max_reconnect_interval < self.reconnect_interval {
            return Err(Error::validation(
                "max reconnect interval must be >= reconnect interval",
            ));
        }
        if !self.reconnect_decay.is_finite() || self.reconnect_decay < 1.0 {
            return Err(Error::validation("reconnect decay must be a finite value >= 1"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::validation("connect timeout must be > 0"));
        }
        if self.pong_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(Error::validation("pong timeout must be > 0 when set"));
        }
        Ok(())
    }

    /// Delay before reconnect attempt number `attempt` (zero based):
    /// `min(reconnect_interval * reconnect_decay^attempt, max_reconnect_interval)`.
    #[must_use]
    #[expect(
        clippy::float_arithmetic,
        reason = "Backoff growth is defined by a fractional decay factor"
    )]
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let base = self.reconnect_interval.as_secs_f64();
        let cap = self.max_reconnect_interval.as_secs_f64();
        let grown = base * self.reconnect_decay.powf(f64::from(attempt));

        // `grown` is +inf once the exponent overflows; `min` folds that into the cap.
        // A cap near `Duration::MAX` does not survive the round trip through `f64`.
        Duration::try_from_secs_f64(grown.min(cap)).unwrap_or(self.max_reconnect_interval)
    }

    /// Whether heartbeats are sent while open.
    #[must_use]
    pub fn heartbeat_enabled(&self) -> bool {
        !self.ping_interval.is_zero()
    }
}

/// Heartbeat payload: a fixed string, or a producer evaluated on every tick.
#[non_exhaustive]
#[derive(Clone)]
pub enum PingMessage {
    Text(String),
    Producer(Arc<dyn Fn() -> String + Send + Sync>),
}

impl PingMessage {
    /// Build a payload producer, e.g. one that embeds a timestamp or sequence number.
    pub fn producer<F>(producer: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self::Producer(Arc::new(producer))
    }

    /// Payload for the next heartbeat.
    #[must_use]
    pub fn payload(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Producer(producer) => producer(),
        }
    }
}

impl Default for PingMessage {
    fn default() -> Self {
        Self::Text(DEFAULT_PING_MESSAGE.to_owned())
    }
}

impl fmt::Debug for PingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

impl From<&str> for PingMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for PingMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}
