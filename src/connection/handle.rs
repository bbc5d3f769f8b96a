//! Cloneable handle to one transport session and its event channels.

use std::fmt;
use std::sync::Arc;

use reqwest::Url;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::debug;
use uuid::Uuid;

use super::envelope::Envelope;
use super::transport::AuthPayload;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle position of a connection handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A connect attempt is in flight.
    Connecting,
    /// Handshake completed; envelopes flow.
    Connected,
    /// Session lost; the driver may be waiting to reconnect.
    Disconnected,
    /// Driver stopped; the handle is spent.
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` or `teardown()` was called locally.
    ClientClosed,
    /// The peer closed the session.
    TransportClosed,
    /// The session failed mid-flight.
    TransportError(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientClosed => f.write_str("client closed"),
            Self::TransportClosed => f.write_str("transport closed"),
            Self::TransportError(e) => write!(f, "transport error: {e}"),
        }
    }
}

/// Notification published to handle subscribers, in transport order.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected(DisconnectReason),
    Message(Envelope),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection is closed")]
    Closed,
}

struct Shared {
    id: Uuid,
    endpoint: Url,
    auth: AuthPayload,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<ConnectionEvent>,
    outbound: mpsc::UnboundedSender<Envelope>,
    shutdown: watch::Sender<bool>,
}

/// Receiving halves owned by the driver task.
pub(crate) struct DriverChannels {
    pub(crate) outbound: mpsc::UnboundedReceiver<Envelope>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

/// Handle to a live (or reconnecting) transport session.
///
/// Clones share the same session. The handle is created by
/// [`super::ConnectionManager::initialize`] and spent once `disconnect` runs.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    pub(crate) fn open(endpoint: Url, user_id: String) -> (Self, DriverChannels) {
        let (status, _) = watch::channel(ConnectionStatus::Connecting);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let shared = Shared {
            id: Uuid::new_v4(),
            endpoint,
            auth: AuthPayload { user_id },
            status,
            events,
            outbound,
            shutdown,
        };
        let channels = DriverChannels { outbound: outbound_rx, shutdown: shutdown_rx };
        (Self { shared: Arc::new(shared) }, channels)
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.shared.auth.user_id
    }

    #[must_use]
    pub fn auth(&self) -> &AuthPayload {
        &self.shared.auth
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.shared.endpoint
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Whether `other` refers to the same session as `self`.
    #[must_use]
    pub fn same_session(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Subscribe to connect/disconnect/message events from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Queue an envelope for the server. Envelopes queued while the session is
    /// reconnecting go out after the next `authenticate` announcement.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] once the handle has been
    /// disconnected or its driver has stopped.
    pub fn emit(&self, event: impl Into<String>, data: Value) -> Result<(), ConnectionError> {
        if *self.shared.shutdown.borrow() {
            return Err(ConnectionError::Closed);
        }
        self.shared
            .outbound
            .send(Envelope::new(event, data))
            .map_err(|_| ConnectionError::Closed)
    }

    /// Ask the driver to close the session and stop reconnecting. Idempotent.
    pub fn disconnect(&self) {
        let already = self.shared.shutdown.send_replace(true);
        if !already {
            debug!(conn_id = %self.shared.id, "disconnect requested");
        }
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        self.shared.status.send_replace(status);
    }

    pub(crate) fn publish(&self, event: ConnectionEvent) {
        // No subscribers is normal; nothing to deliver.
        let _ = self.shared.events.send(event);
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.shared.id)
            .field("user_id", &self.shared.auth.user_id)
            .field("endpoint", &self.shared.endpoint.as_str())
            .field("status", &self.status())
            .finish()
    }
}
