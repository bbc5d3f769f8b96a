//! GoTrue-compatible identity REST client.
//!
//! Thin HTTP wrapper for `/token` and `/logout`. The signed-in session is
//! kept in a [`SessionStorage`] file and every state transition is announced
//! on a broadcast channel. Pure parsing in `parse_session` for testability.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{AuthChange, AuthEvent, IdentityBackend, IdentityError, Session, SessionStorage};
use crate::config::IdentityConfig;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const CHANGE_CHANNEL_CAPACITY: usize = 32;

/// Refresh sessions whose access token expires within this many seconds.
pub const EXPIRY_MARGIN_SECS: i64 = 10;

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpIdentityClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: Option<String>,
    storage: SessionStorage,
    changes: broadcast::Sender<AuthChange>,
}

impl HttpIdentityClient {
    /// Build a client from identity config.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn new(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| IdentityError::HttpClientBuild(e.to_string()))?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_owned(),
            anon_key: config.anon_key.clone(),
            storage: SessionStorage::new(config.session_file.clone()),
            changes,
        })
    }

    #[must_use]
    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// Exchange email + password for a session, persist it, and announce
    /// `SIGNED_IN`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Response`] when the credentials are refused,
    /// or a request/storage error.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let session = self
            .token_request("password", json!({ "email": email, "password": password }))
            .await?;
        self.storage.save(&session).await?;
        info!(user_id = %session.user.id, "signed in");
        self.notify(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Trade a refresh token for a new session, persist it, and announce
    /// `TOKEN_REFRESHED`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Response`] when the refresh token is refused,
    /// or a request/storage error.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, IdentityError> {
        let session = self
            .token_request("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        self.storage.save(&session).await?;
        debug!(user_id = %session.user.id, "session refreshed");
        self.notify(AuthEvent::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }

    /// Revoke the stored session (if any), clear storage, and announce
    /// `SIGNED_OUT`. A token the backend no longer knows is not an error.
    ///
    /// # Errors
    ///
    /// Returns a request/storage error, or [`IdentityError::Response`] for
    /// unexpected statuses.
    pub async fn sign_out(&self) -> Result<(), IdentityError> {
        if let Some(session) = self.storage.load().await? {
            let request = self
                .authorize(self.http.post(format!("{}/logout", self.base_url)))
                .bearer_auth(&session.access_token);
            let response = request
                .send()
                .await
                .map_err(|e| IdentityError::Request(e.to_string()))?;
            let status = response.status();
            if !(status.is_success() || matches!(status.as_u16(), 401 | 404)) {
                let body = response.text().await.unwrap_or_default();
                return Err(IdentityError::Response { status: status.as_u16(), body });
            }
        }

        self.storage.clear().await?;
        info!("signed out");
        self.notify(AuthEvent::SignedOut, None);
        Ok(())
    }

    async fn token_request(&self, grant_type: &str, body: Value) -> Result<Session, IdentityError> {
        let url = format!("{}/token?grant_type={grant_type}", self.base_url);
        let response = self
            .authorize(self.http.post(url))
            .json(&body)
            .send()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(IdentityError::Response { status, body: text });
        }

        parse_session(&text, now_secs())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.anon_key {
            Some(key) => request.header("apikey", key),
            None => request,
        }
    }

    fn notify(&self, event: AuthEvent, session: Option<Session>) {
        // Nobody listening is fine; the change is already persisted.
        let _ = self.changes.send(AuthChange::new(event, session));
    }
}

#[async_trait::async_trait]
impl IdentityBackend for HttpIdentityClient {
    /// Load the persisted session, refreshing it when it is about to expire.
    /// A refresh the backend rejects clears the session and announces
    /// `SIGNED_OUT`.
    async fn get_session(&self) -> Result<Option<Session>, IdentityError> {
        let Some(session) = self.storage.load().await? else {
            return Ok(None);
        };
        if !session.expires_within(now_secs(), EXPIRY_MARGIN_SECS) {
            return Ok(Some(session));
        }

        let refreshed = if session.refresh_token.is_empty() {
            Err(IdentityError::Response { status: 401, body: "missing refresh token".into() })
        } else {
            self.refresh_session(&session.refresh_token).await
        };

        match refreshed {
            Ok(fresh) => Ok(Some(fresh)),
            Err(e) if e.is_rejection() => {
                warn!(user_id = %session.user.id, error = %e, "stored session expired; signing out");
                self.storage.clear().await?;
                self.notify(AuthEvent::SignedOut, None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse a `/token` response. `expires_at` is derived from `expires_in` when
/// the backend omits it.
fn parse_session(json: &str, now: i64) -> Result<Session, IdentityError> {
    let mut session: Session = serde_json::from_str(json).map_err(|e| IdentityError::Parse(e.to_string()))?;
    if session.expires_at.is_none() {
        session.expires_at = session.expires_in.map(|secs| now.saturating_add(secs));
    }
    Ok(session)
}

fn now_secs() -> i64 {
    let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
