#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Kind};

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    #[cfg(feature = "ws")]
    Connection(tokio_tungstenite::tungstenite::Error),
    /// The transport did not open before the connect timeout elapsed
    ConnectTimeout(Duration),
    /// No inbound traffic arrived within the heartbeat response timeout
    HeartbeatTimeout(Duration),
    /// WebSocket connection was closed
    ConnectionClosed,
    /// Address scheme is not a WebSocket scheme
    UnsupportedScheme(String),
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "ws")]
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::ConnectTimeout(after) => {
                write!(f, "WebSocket did not open within {after:?}")
            }
            Self::HeartbeatTimeout(after) => {
                write!(f, "No heartbeat response received within {after:?}")
            }
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::UnsupportedScheme(scheme) => {
                write!(f, "Unsupported WebSocket scheme: {scheme}")
            }
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            #[cfg(feature = "ws")]
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for Error {
    fn from(e: WsError) -> Self {
        let kind = match e {
            WsError::ConnectTimeout(_) | WsError::HeartbeatTimeout(_) => Kind::Timeout,
            WsError::UnsupportedScheme(_) => Kind::Validation,
            _ => Kind::WebSocket,
        };
        Error::with_source(kind, e)
    }
}

#[cfg(feature = "ws")]
impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::with_source(Kind::WebSocket, WsError::Connection(e))
    }
}
