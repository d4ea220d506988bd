//! WebSocket transport using tokio-tungstenite.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::infrastructure::ports::{
    FrameReader, FrameWriter, SessionStream, StreamTarget, TransportError, TransportPort,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the session stream as a WebSocket. The token travels as the
/// `{type}, {token}` subprotocol pair.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|e| TransportError::Connect(e.to_string()))
}

#[async_trait]
impl TransportPort for WebSocketTransport {
    async fn open(&self, target: &StreamTarget) -> Result<SessionStream, TransportError> {
        let mut request = target
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            header_value(&format!("{}, {}", target.token_type, target.token))?,
        );
        headers.insert(
            header::AUTHORIZATION,
            header_value(&format!("{} {}", target.token_type, target.token))?,
        );

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::info!(session_id = %target.session_id, "WebSocket connected");

        let (write, read) = socket.split();
        Ok(SessionStream {
            reader: Box::new(WebSocketReader { read }),
            writer: Box::new(WebSocketWriter { write }),
        })
    }
}

struct WebSocketReader {
    read: SplitStream<Socket>,
}

fn map_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        other => TransportError::Io(other.to_string()),
    }
}

#[async_trait]
impl FrameReader for WebSocketReader {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        while let Some(message) = self.read.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => tracing::warn!("Dropping non UTF-8 binary frame: {}", e),
                },
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Server closed connection");
                    return None;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(map_error(e))),
            }
        }
        None
    }
}

struct WebSocketWriter {
    write: SplitSink<Socket, Message>,
}

#[async_trait]
impl FrameWriter for WebSocketWriter {
    async fn write_frame(&mut self, frame: String) -> Result<(), TransportError> {
        self.write.send(Message::Text(frame)).await.map_err(map_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.write.close().await {
            Ok(()) => Ok(()),
            Err(e) => match map_error(e) {
                TransportError::Closed => Ok(()),
                other => Err(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_url_fails_to_connect() {
        let target = StreamTarget {
            url: "not a url".to_string(),
            session_id: "s".to_string(),
            session_key: "k".to_string(),
            token_type: "Bearer".to_string(),
            token: "t".to_string(),
        };
        let result = WebSocketTransport::new().open(&target).await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    #[test]
    fn closed_errors_are_cancellations() {
        assert!(map_error(tungstenite::Error::ConnectionClosed).is_cancellation());
        assert!(!map_error(tungstenite::Error::Io(std::io::Error::other("reset"))).is_cancellation());
    }
}
