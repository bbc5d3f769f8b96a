use super::*;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

// =============================================================================
// resolve_backend_url
// =============================================================================

#[test]
fn resolve_backend_url_unset_falls_back_to_localhost() {
    assert_eq!(resolve_backend_url(None), "http://localhost:3000");
}

#[test]
fn resolve_backend_url_empty_falls_back_to_localhost() {
    assert_eq!(resolve_backend_url(Some("")), "http://localhost:3000");
    assert_eq!(resolve_backend_url(Some("   ")), "http://localhost:3000");
}

#[test]
fn resolve_backend_url_trims_trailing_slash() {
    assert_eq!(resolve_backend_url(Some("https://api.example.test/")), "https://api.example.test");
}

// =============================================================================
// ClientConfig::from_lookup
// =============================================================================

#[test]
fn from_lookup_defaults() {
    let cfg = ClientConfig::from_lookup(|_| None).unwrap();
    assert_eq!(cfg.backend_url.as_str(), "http://localhost:3000/");
    assert_eq!(cfg.socket_path, DEFAULT_SOCKET_PATH);
    assert_eq!(cfg.identity.url, "http://localhost:3000/auth/v1");
    assert_eq!(cfg.identity.anon_key, None);
    assert_eq!(cfg.identity.session_file, PathBuf::from(DEFAULT_SESSION_FILE));
    assert_eq!(cfg.reconnect, ReconnectPolicy::default());
}

#[test]
fn from_lookup_parses_overrides() {
    let cfg = ClientConfig::from_lookup(lookup_from(&[
        ("BACKEND_URL", "https://rt.example.test/"),
        ("SOCKET_PATH", "/ws"),
        ("IDENTITY_URL", "https://id.example.test/auth/v1/"),
        ("IDENTITY_ANON_KEY", "anon-123"),
        ("SESSION_FILE", "/tmp/s.json"),
        ("RECONNECT", "false"),
        ("RECONNECT_INITIAL_MS", "250"),
        ("RECONNECT_MAX_MS", "4000"),
    ]))
    .unwrap();

    assert_eq!(cfg.backend_url.as_str(), "https://rt.example.test/");
    assert_eq!(cfg.socket_path, "/ws");
    assert_eq!(cfg.identity.url, "https://id.example.test/auth/v1");
    assert_eq!(cfg.identity.anon_key.as_deref(), Some("anon-123"));
    assert_eq!(cfg.identity.session_file, PathBuf::from("/tmp/s.json"));
    assert!(!cfg.reconnect.enabled);
    assert_eq!(cfg.reconnect.initial_delay, Duration::from_millis(250));
    assert_eq!(cfg.reconnect.max_delay, Duration::from_millis(4000));
}

#[test]
fn from_lookup_identity_url_follows_backend_url() {
    let cfg = ClientConfig::from_lookup(lookup_from(&[("BACKEND_URL", "http://10.0.0.5:8080")])).unwrap();
    assert_eq!(cfg.identity.url, "http://10.0.0.5:8080/auth/v1");
}

#[test]
fn from_lookup_invalid_backend_url_errors() {
    let err = ClientConfig::from_lookup(lookup_from(&[("BACKEND_URL", "not a url")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidUrl { var: "BACKEND_URL", .. }));
}

#[test]
fn from_lookup_invalid_number_errors() {
    let err = ClientConfig::from_lookup(lookup_from(&[("RECONNECT_MAX_MS", "soon")])).unwrap_err();
    assert!(err.to_string().contains("RECONNECT_MAX_MS"));
}

#[test]
fn from_lookup_invalid_bool_errors() {
    let err = ClientConfig::from_lookup(lookup_from(&[("RECONNECT", "maybe")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { var: "RECONNECT", .. }));
}

#[test]
fn socket_endpoint_applies_socket_path() {
    let cfg = ClientConfig::from_lookup(|_| None).unwrap();
    assert_eq!(cfg.socket_endpoint().as_str(), "http://localhost:3000/socket.io/");
}

#[test]
fn socket_endpoint_keeps_backend_path_prefix() {
    let cfg = ClientConfig::from_lookup(lookup_from(&[("BACKEND_URL", "http://host.example.test/app")])).unwrap();
    assert_eq!(cfg.socket_endpoint().as_str(), "http://host.example.test/app/socket.io/");

    let cfg = ClientConfig::from_lookup(lookup_from(&[
        ("BACKEND_URL", "http://host.example.test/app/"),
        ("SOCKET_PATH", "rt"),
    ]))
    .unwrap();
    assert_eq!(cfg.socket_endpoint().as_str(), "http://host.example.test/app/rt");
}

#[test]
fn from_lookup_reads_vite_backend_url_when_backend_url_unset() {
    let cfg = ClientConfig::from_lookup(lookup_from(&[("VITE_BACKEND_URL", "http://10.0.0.9:4000")])).unwrap();
    assert_eq!(cfg.backend_url.as_str(), "http://10.0.0.9:4000/");
    assert_eq!(cfg.identity.url, "http://10.0.0.9:4000/auth/v1");
}

#[test]
fn from_lookup_backend_url_wins_over_vite_backend_url() {
    let cfg = ClientConfig::from_lookup(lookup_from(&[
        ("BACKEND_URL", "http://primary.example.test"),
        ("VITE_BACKEND_URL", "http://legacy.example.test"),
    ]))
    .unwrap();
    assert_eq!(cfg.backend_url.host_str(), Some("primary.example.test"));
}

#[test]
fn from_lookup_rejects_zero_initial_delay() {
    let err = ClientConfig::from_lookup(lookup_from(&[("RECONNECT_INITIAL_MS", "0")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { var: "RECONNECT_INITIAL_MS", .. }));
}

#[test]
fn from_lookup_rejects_initial_delay_above_max() {
    let err = ClientConfig::from_lookup(lookup_from(&[
        ("RECONNECT_INITIAL_MS", "5000"),
        ("RECONNECT_MAX_MS", "2000"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { var: "RECONNECT_MAX_MS", .. }));
}

#[test]
fn from_lookup_accepts_initial_delay_equal_to_max() {
    let cfg = ClientConfig::from_lookup(lookup_from(&[
        ("RECONNECT_INITIAL_MS", "3000"),
        ("RECONNECT_MAX_MS", "3000"),
    ]))
    .unwrap();
    assert_eq!(cfg.reconnect.next_delay(cfg.reconnect.initial_delay), Duration::from_millis(3000));
}

// =============================================================================
// ReconnectPolicy
// =============================================================================

#[test]
fn next_delay_doubles_until_cap() {
    let policy = ReconnectPolicy::default();
    assert_eq!(policy.next_delay(Duration::from_millis(1000)), Duration::from_millis(2000));
    assert_eq!(policy.next_delay(Duration::from_millis(8000)), Duration::from_millis(10_000));
    assert_eq!(policy.next_delay(Duration::from_millis(10_000)), Duration::from_millis(10_000));
}

#[test]
fn disabled_policy_keeps_default_delays() {
    let policy = ReconnectPolicy::disabled();
    assert!(!policy.enabled);
    assert_eq!(policy.initial_delay, Duration::from_millis(DEFAULT_RECONNECT_INITIAL_MS));
}
