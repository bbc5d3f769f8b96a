//! Client configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! Every setting has a literal fallback so a bare checkout talks to a local
//! backend on `http://localhost:3000`. Parsing goes through a lookup closure
//! so tests never touch the process environment.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io/";
pub const DEFAULT_IDENTITY_PATH: &str = "/auth/v1";
pub const DEFAULT_SESSION_FILE: &str = ".sessionlink/session.json";
pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 1000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL in {var}: {value}")]
    InvalidUrl { var: &'static str, value: String },
    #[error("invalid value in {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Backoff settings for the transport driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Policy that gives up after the first connect attempt or remote close.
    #[must_use]
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    /// Delay to wait after `delay`, doubling up to `max_delay`.
    #[must_use]
    pub fn next_delay(&self, delay: Duration) -> Duration {
        delay.saturating_mul(2).min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(DEFAULT_RECONNECT_INITIAL_MS),
            max_delay: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
        }
    }
}

/// Where and how to reach the identity backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub url: String,
    pub anon_key: Option<String>,
    pub session_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub backend_url: Url,
    pub socket_path: String,
    pub identity: IdentityConfig,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `BACKEND_URL`: default `http://localhost:3000` (also used when empty);
    ///   `VITE_BACKEND_URL` is read when `BACKEND_URL` is unset or empty
    /// - `SOCKET_PATH`: default `/socket.io/`
    /// - `IDENTITY_URL`: default `{BACKEND_URL}/auth/v1`
    /// - `IDENTITY_ANON_KEY`: sent as the `apikey` header when set
    /// - `SESSION_FILE`: default `.sessionlink/session.json`
    /// - `RECONNECT`: `true` (default) or `false`
    /// - `RECONNECT_INITIAL_MS` / `RECONNECT_MAX_MS`: default 1000 / 10000;
    ///   the initial delay must be at least 1 and at most the max
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a URL or number does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a URL or number does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_setting = non_empty(lookup("BACKEND_URL")).or_else(|| lookup("VITE_BACKEND_URL"));
        let backend_raw = resolve_backend_url(backend_setting.as_deref());
        let backend_url = Url::parse(&backend_raw)
            .map_err(|_| ConfigError::InvalidUrl { var: "BACKEND_URL", value: backend_raw.clone() })?;

        let socket_path = non_empty(lookup("SOCKET_PATH")).unwrap_or_else(|| DEFAULT_SOCKET_PATH.to_owned());

        let identity_url = match non_empty(lookup("IDENTITY_URL")) {
            Some(raw) => {
                Url::parse(&raw).map_err(|_| ConfigError::InvalidUrl { var: "IDENTITY_URL", value: raw.clone() })?;
                raw.trim_end_matches('/').to_owned()
            }
            None => format!("{backend_raw}{DEFAULT_IDENTITY_PATH}"),
        };
        let identity = IdentityConfig {
            url: identity_url,
            anon_key: non_empty(lookup("IDENTITY_ANON_KEY")),
            session_file: non_empty(lookup("SESSION_FILE"))
                .map_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE), PathBuf::from),
        };

        let initial_ms = parse_u64("RECONNECT_INITIAL_MS", lookup("RECONNECT_INITIAL_MS"), DEFAULT_RECONNECT_INITIAL_MS)?;
        let max_ms = parse_u64("RECONNECT_MAX_MS", lookup("RECONNECT_MAX_MS"), DEFAULT_RECONNECT_MAX_MS)?;
        if initial_ms == 0 {
            return Err(ConfigError::InvalidValue { var: "RECONNECT_INITIAL_MS", value: "0".to_owned() });
        }
        if initial_ms > max_ms {
            return Err(ConfigError::InvalidValue {
                var: "RECONNECT_MAX_MS",
                value: format!("{max_ms} (below RECONNECT_INITIAL_MS {initial_ms})"),
            });
        }
        let reconnect = ReconnectPolicy {
            enabled: parse_bool("RECONNECT", lookup("RECONNECT"), true)?,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
        };

        Ok(Self { backend_url, socket_path, identity, reconnect })
    }

    /// Backend URL with the socket path appended to any path prefix, as
    /// handed to the connector.
    #[must_use]
    pub fn socket_endpoint(&self) -> Url {
        let mut url = self.backend_url.clone();
        let prefix = self.backend_url.path().trim_end_matches('/');
        let socket_path = self.socket_path.trim_start_matches('/');
        url.set_path(&format!("{prefix}/{socket_path}"));
        url
    }
}

/// Resolve the backend URL, falling back to the local development server when
/// the setting is unset or empty.
#[must_use]
pub fn resolve_backend_url(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_BACKEND_URL)
        .trim_end_matches('/')
        .to_owned()
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

fn parse_bool(var: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match non_empty(raw).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue { var, value: other.to_owned() }),
    }
}

fn parse_u64(var: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match non_empty(raw) {
        None => Ok(default),
        Some(value) => value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
