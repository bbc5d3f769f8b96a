//! Auth-session state for the current user.
//!
//! SYSTEM CONTEXT
//! ==============
//! The composition root watches this store to decide when a realtime
//! connection should exist and for which user. The store is the only writer;
//! everything else reads snapshots or subscribes.
//!
//! DESIGN
//! ======
//! State lives in a `watch` channel, so observers always see the latest value
//! and are woken on every change. Two inputs feed it: a one-shot lookup of the
//! persisted session (`restore`) and the backend's change stream (`listen`).
//! A change event applied while the lookup is in flight makes the lookup
//! result stale, and it is discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::identity::{AuthChange, AuthEvent, IdentityBackend, IdentityError, User};

/// Snapshot of who is signed in. `is_authenticated()` is true exactly when a
/// user is present.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    current_user: Option<User>,
}

impl SessionState {
    #[must_use]
    pub fn signed_in(user: User) -> Self {
        Self { current_user: Some(user) }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }
}

/// Observable session state with a single writer.
#[derive(Clone)]
pub struct SessionStore {
    state: Arc<watch::Sender<SessionState>>,
    /// Count of change events applied; lets `restore` detect newer events.
    applied: Arc<AtomicU64>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { state: Arc::new(state), applied: Arc::new(AtomicU64::new(0)) }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().current_user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Apply one auth change. Returns whether the state changed.
    ///
    /// `SIGNED_IN` with a session signs the user in, `SIGNED_OUT` signs out,
    /// and every other kind is ignored.
    pub fn apply(&self, change: &AuthChange) -> bool {
        let next = match (&change.event, &change.session) {
            (AuthEvent::SignedIn, Some(session)) => SessionState::signed_in(session.user.clone()),
            (AuthEvent::SignedOut, _) => SessionState::signed_out(),
            (event, _) => {
                debug!(%event, "ignoring auth change");
                return false;
            }
        };
        self.applied.fetch_add(1, Ordering::SeqCst);
        self.replace(next)
    }

    /// Populate the state from the backend's persisted session.
    ///
    /// Returns whether a session was found and applied. No session is not an
    /// error; the state is left as it was.
    ///
    /// # Errors
    ///
    /// Propagates the backend's lookup error unchanged.
    pub async fn restore(&self, backend: &dyn IdentityBackend) -> Result<bool, IdentityError> {
        let seen = self.applied.load(Ordering::SeqCst);
        let Some(session) = backend.get_session().await? else {
            debug!("no persisted session");
            return Ok(false);
        };
        if self.applied.load(Ordering::SeqCst) != seen {
            debug!("auth change arrived during lookup; keeping newer state");
            return Ok(false);
        }
        info!(user_id = %session.user.id, "restored session");
        self.replace(SessionState::signed_in(session.user));
        Ok(true)
    }

    /// Follow the backend's change stream for as long as the task runs.
    ///
    /// The subscription is taken before this returns, so no change published
    /// afterwards is missed. If the listener falls behind, the state is
    /// re-synchronized from a fresh lookup.
    pub fn listen(&self, backend: Arc<dyn IdentityBackend>) -> JoinHandle<()> {
        let mut changes = backend.subscribe();
        let store = self.clone();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        store.apply(&change);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth change listener lagged; re-syncing");
                        store.resync(backend.as_ref()).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("auth change stream closed");
                        break;
                    }
                }
            }
        })
    }

    async fn resync(&self, backend: &dyn IdentityBackend) {
        match backend.get_session().await {
            Ok(Some(session)) => {
                self.applied.fetch_add(1, Ordering::SeqCst);
                self.replace(SessionState::signed_in(session.user));
            }
            Ok(None) => {
                self.applied.fetch_add(1, Ordering::SeqCst);
                self.replace(SessionState::signed_out());
            }
            Err(e) => warn!(error = %e, "session re-sync failed"),
        }
    }

    fn replace(&self, next: SessionState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
