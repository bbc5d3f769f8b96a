//! Composition root tying the session store to the connection manager.
//!
//! SYSTEM CONTEXT
//! ==============
//! `main` builds one `App` from config and drives it with `run`. The app is
//! the only caller of `initialize`/`teardown`; it keeps exactly one
//! connection open while a user is signed in and none otherwise.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, WsConnector};
use crate::identity::{HttpIdentityClient, IdentityBackend, IdentityError};
use crate::session::{SessionState, SessionStore};

pub struct App {
    identity: Arc<dyn IdentityBackend>,
    session: SessionStore,
    connections: ConnectionManager,
}

impl App {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityBackend>, connections: ConnectionManager) -> Self {
        Self { identity, session: SessionStore::new(), connections }
    }

    /// App wired to the HTTP identity backend and the websocket transport.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn from_config(config: &ClientConfig) -> Result<Self, IdentityError> {
        let identity = Arc::new(HttpIdentityClient::new(&config.identity)?);
        let connections = ConnectionManager::from_config(config, Arc::new(WsConnector));
        Ok(Self::new(identity, connections))
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    #[must_use]
    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Follow the session until `shutdown` resolves, then close the
    /// connection and stop listening.
    ///
    /// A failed session lookup is logged and the app starts signed out.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let listener = self.session.listen(Arc::clone(&self.identity));
        let mut states = self.session.subscribe();

        if let Err(e) = self.session.restore(self.identity.as_ref()).await {
            warn!(error = %e, "session lookup failed; starting signed out");
        }

        tokio::pin!(shutdown);
        loop {
            let state = states.borrow_and_update().clone();
            self.sync(&state);

            tokio::select! {
                () = &mut shutdown => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("shutting down");
        self.connections.teardown();
        listener.abort();
    }

    /// Bring the connection in line with `state`.
    fn sync(&self, state: &SessionState) {
        match state.current_user() {
            Some(user) => {
                let current = self.connections.get();
                if current.as_ref().is_some_and(|handle| handle.user_id() == user.id) {
                    return;
                }
                info!(user_id = %user.id, "session active; connecting");
                self.connections.initialize(user.id.clone());
            }
            None => {
                if self.connections.get().is_some() {
                    info!("signed out; closing connection");
                    self.connections.teardown();
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
