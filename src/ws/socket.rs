//! [`Connector`] backed by `tokio-tungstenite`.

use futures::{SinkExt as _, StreamExt as _};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use super::error::WsError;
use super::traits::Connector;
use super::transport::{
    CloseFrame, NO_STATUS, OpenEvent, Outbound, TransportEvent, TransportHandle, TransportPeer,
};
use crate::Result;
use crate::error::{Error, Kind};

/// Opens `ws://` and `wss://` connections, one driver task per transport.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn open(&self, address: &str, protocols: &[String]) -> Result<TransportHandle> {
        let request = build_request(address, protocols)?;
        let (handle, peer) = TransportHandle::channel();

        tokio::spawn(drive(request, peer));

        Ok(handle)
    }
}

fn build_request(address: &str, protocols: &[String]) -> Result<Request> {
    let url = Url::parse(address)?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(WsError::UnsupportedScheme(url.scheme().to_owned()).into());
    }

    let mut request = url.as_str().into_client_request()?;
    if !protocols.is_empty() {
        let value = HeaderValue::from_str(&protocols.join(", "))
            .map_err(|e| Error::with_source(Kind::Validation, e))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    Ok(request)
}

/// Pump frames between the socket and the client until either side goes away.
async fn drive(request: Request, mut peer: TransportPeer) {
    let (stream, response) = match connect_async(request).await {
        Ok(connected) => connected,
        Err(e) => {
            peer.emit(TransportEvent::Error(e.into()));
            peer.emit(TransportEvent::Close(CloseFrame::abnormal()));
            return;
        }
    };

    let protocol = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    if !peer.emit(TransportEvent::Open(OpenEvent::new(protocol))) {
        // Detached while the handshake was in flight (connect timeout or close).
        return;
    }

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if !peer.emit(TransportEvent::Message(text.to_string())) {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let frame = frame.map_or_else(
                            || CloseFrame::new(NO_STATUS, ""),
                            |frame| CloseFrame::new(u16::from(frame.code), frame.reason.as_str()),
                        );
                        peer.emit(TransportEvent::Close(frame));
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and control frames are not part of the message stream.
                    }
                    Some(Err(e)) => {
                        peer.emit(TransportEvent::Error(e.into()));
                        peer.emit(TransportEvent::Close(CloseFrame::abnormal()));
                        break;
                    }
                    None => {
                        peer.emit(TransportEvent::Close(CloseFrame::abnormal()));
                        break;
                    }
                }
            }

            command = peer.next_outbound() => {
                match command {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            peer.emit(TransportEvent::Error(e.into()));
                        }
                    }
                    Some(Outbound::Close(frame)) => {
                        let close = WsCloseFrame {
                            code: CloseCode::from(frame.code),
                            reason: frame.reason.into(),
                        };
                        _ = write.send(Message::Close(Some(close))).await;
                        break;
                    }
                    None => {
                        _ = write.close().await;
                        break;
                    }
                }
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Transport driver finished");
}
