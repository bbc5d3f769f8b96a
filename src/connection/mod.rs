//! Connection manager owning the single active real-time connection.
//!
//! SYSTEM CONTEXT
//! ==============
//! The composition root creates one `ConnectionManager` and calls
//! `initialize` once the session store knows who the user is. Everything
//! else reads the current handle through `get` and leaves lifecycle changes
//! to the owner.
//!
//! DESIGN
//! ======
//! At most one handle is current per manager. Re-initializing replaces the
//! current handle and disconnects the one it replaced, so a manager never
//! keeps two drivers alive for the same user slot. Each handle runs its own
//! driver task (see `driver`), which owns reconnection.

mod driver;
pub mod envelope;
mod handle;
pub mod transport;
pub mod ws;

use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Url;
use tracing::debug;

use crate::config::{ClientConfig, ReconnectPolicy};
use driver::Driver;

pub use envelope::{AUTHENTICATE_EVENT, Envelope};
pub use handle::{ConnectionError, ConnectionEvent, ConnectionHandle, ConnectionStatus, DisconnectReason};
pub use transport::{AuthPayload, Connector, Transport, TransportError};
pub use ws::WsConnector;

pub struct ConnectionManager {
    endpoint: Url,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    current: Mutex<Option<ConnectionHandle>>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(endpoint: Url, connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        Self { endpoint, connector, policy, current: Mutex::new(None) }
    }

    /// Manager targeting the configured socket endpoint.
    #[must_use]
    pub fn from_config(config: &ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self::new(config.socket_endpoint(), connector, config.reconnect)
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Open a connection for `user_id` and make it the current handle.
    ///
    /// The transport is opened in the background; the returned handle starts
    /// in [`ConnectionStatus::Connecting`]. On every successful handshake the
    /// driver logs a notice and sends one `authenticate` envelope carrying
    /// `user_id`. A previously current handle is disconnected.
    ///
    /// Must be called from within a tokio runtime.
    pub fn initialize(&self, user_id: impl Into<String>) -> ConnectionHandle {
        let (handle, channels) = ConnectionHandle::open(self.endpoint.clone(), user_id.into());
        let driver = Driver::new(handle.clone(), Arc::clone(&self.connector), self.policy, channels);
        tokio::spawn(driver.run());

        let previous = self.lock().replace(handle.clone());
        if let Some(previous) = previous {
            debug!(old = %previous.id(), new = %handle.id(), "replacing current connection");
            previous.disconnect();
        }
        debug!(conn_id = %handle.id(), user_id = handle.user_id(), endpoint = %self.endpoint, "connection initialized");
        handle
    }

    /// The current handle, if any.
    #[must_use]
    pub fn get(&self) -> Option<ConnectionHandle> {
        self.lock().clone()
    }

    /// Disconnect and forget the current handle. No-op when there is none.
    pub fn teardown(&self) {
        let current = self.lock().take();
        if let Some(handle) = current {
            debug!(conn_id = %handle.id(), "tearing down connection");
            handle.disconnect();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ConnectionHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
