//! Transport seam between the connection driver and the wire.
//!
//! The driver only needs to open a session, write envelopes, and read
//! envelopes until the peer goes away. Tests plug in scripted fakes; the
//! binary uses [`super::ws::WsConnector`].

use reqwest::Url;
use serde::Serialize;

use super::envelope::Envelope;

/// Authentication payload attached to every connect attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("malformed envelope: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Opens transport sessions. One call per connect attempt.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Open a session to `endpoint`, presenting `auth` during the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the handshake does not complete.
    async fn connect(&self, endpoint: &Url, auth: &AuthPayload) -> Result<Box<dyn Transport>, TransportError>;
}

/// One open transport session.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Write one envelope.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] when the session can no longer write.
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Read the next envelope. `None` means the peer closed the session.
    ///
    /// Must be cancel-safe: the driver races it against outbound traffic.
    async fn recv(&mut self) -> Option<Result<Envelope, TransportError>>;

    /// Close the session. Errors are swallowed; the session is gone either way.
    async fn close(&mut self);
}
