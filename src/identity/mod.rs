//! Identity backend: session lookup and auth-change notifications.
//!
//! DESIGN
//! ======
//! The session store only needs two things from an identity provider: the
//! persisted session, if any, and a stream of auth changes. `IdentityBackend`
//! is that seam. `HttpIdentityClient` implements it against a
//! GoTrue-compatible REST API and adds sign-in, refresh, and sign-out.

pub mod client;
pub mod storage;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

pub use client::HttpIdentityClient;
pub use storage::SessionStorage;

// =============================================================================
// SESSION MODEL
// =============================================================================

/// User record as reported by the identity backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
    #[serde(default)]
    pub app_metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl User {
    /// Minimal record with only an id; handy for fakes and fixtures.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            phone: None,
            role: None,
            user_metadata: Value::Null,
            app_metadata: Value::Null,
            created_at: None,
        }
    }
}

/// Persisted authenticated session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_owned()
}

impl Session {
    /// Whether the access token expires at or before `now + margin_secs`.
    /// Sessions without an expiry never expire.
    #[must_use]
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now.saturating_add(margin_secs))
    }
}

// =============================================================================
// AUTH CHANGES
// =============================================================================

/// Kind of auth-state change. Unknown kinds are kept verbatim so newer
/// backends do not break older clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
    Other(String),
}

impl AuthEvent {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InitialSession => "INITIAL_SESSION",
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
            Self::PasswordRecovery => "PASSWORD_RECOVERY",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for AuthEvent {
    fn from(raw: &str) -> Self {
        match raw {
            "INITIAL_SESSION" => Self::InitialSession,
            "SIGNED_IN" => Self::SignedIn,
            "SIGNED_OUT" => Self::SignedOut,
            "TOKEN_REFRESHED" => Self::TokenRefreshed,
            "USER_UPDATED" => Self::UserUpdated,
            "PASSWORD_RECOVERY" => Self::PasswordRecovery,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification on the auth-change stream.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

impl AuthChange {
    #[must_use]
    pub fn new(event: AuthEvent, session: Option<Session>) -> Self {
        Self { event, session }
    }
}

// =============================================================================
// BACKEND TRAIT
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("http client build failed: {0}")]
    HttpClientBuild(String),
    #[error("identity request failed: {0}")]
    Request(String),
    #[error("identity response error: status {status}")]
    Response { status: u16, body: String },
    #[error("identity response parse failed: {0}")]
    Parse(String),
    #[error("session storage failed: {0}")]
    Storage(String),
}

impl IdentityError {
    /// Whether the backend refused the credentials (as opposed to being
    /// unreachable).
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Response { status: 400 | 401 | 403, .. })
    }
}

/// Provider of persisted sessions and auth-change notifications.
#[async_trait::async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Look up the persisted session. `Ok(None)` means nobody is signed in.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when storage or the backend fails.
    async fn get_session(&self) -> Result<Option<Session>, IdentityError>;

    /// Subscribe to auth changes from now on.
    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
