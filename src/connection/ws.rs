//! WebSocket transport backed by `tokio-tungstenite`.
//!
//! Envelopes travel as JSON text frames. Binary frames are decoded the same
//! way so servers that only speak bytes still work. Ping/pong is answered by
//! the websocket library while reading.

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use super::envelope::Envelope;
use super::transport::{AuthPayload, Connector, Transport, TransportError};

/// Builds the websocket URL for `endpoint`: `http` becomes `ws`, `https`
/// becomes `wss`, and the auth payload rides along as `userId`.
///
/// # Errors
///
/// Returns [`TransportError::InvalidEndpoint`] for schemes other than
/// `http`, `https`, `ws`, and `wss`.
pub fn socket_url(endpoint: &Url, auth: &AuthPayload) -> Result<Url, TransportError> {
    let mut url = endpoint.clone();
    let scheme = match endpoint.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(TransportError::InvalidEndpoint(format!("unsupported scheme `{other}`"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| TransportError::InvalidEndpoint(endpoint.to_string()))?;
    url.query_pairs_mut().append_pair("userId", &auth.user_id);
    Ok(url)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Url, auth: &AuthPayload) -> Result<Box<dyn Transport>, TransportError> {
        let url = socket_url(endpoint, auth)?;
        debug!(%url, "opening websocket");
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let payload = envelope.encode()?;
        self.stream
            .send(Message::text(payload))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Envelope, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Envelope::decode(text.as_bytes()).map_err(TransportError::from)),
                Message::Binary(bytes) => return Some(Envelope::decode(&bytes).map_err(TransportError::from)),
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "websocket close failed");
        }
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
