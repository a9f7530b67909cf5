//! Channel configuration.
//!
//! Everything the channel needs is passed in explicitly; nothing is inferred
//! from the host environment inside the channel itself. `from_env` exists for
//! binaries and reads the variables once, at the edge.

use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Path segment of the notification endpoint, relative to the page origin.
pub const ENDPOINT_PATH: &str = "/ws";

pub const DEFAULT_ORIGIN: &str = "http://localhost:8080";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid origin url: {0}")]
    InvalidOrigin(String),
    #[error("unsupported origin scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Fixed-delay, fixed-attempt-count reconnect behavior.
///
/// The delay is constant between attempts (no exponential backoff).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY, DEFAULT_MAX_RECONNECT_ATTEMPTS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub endpoint: Url,
    /// When `false`, `connect()` never opens a transport.
    pub enabled: bool,
    pub reconnect: ReconnectPolicy,
}

impl ChannelConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            enabled: true,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Derive the endpoint from a page origin: same host and port, fixed path,
    /// `wss` for secure origins and `ws` otherwise.
    pub fn for_origin(origin: &Url) -> Result<Self, ConfigError> {
        Ok(Self::new(endpoint_for_origin(origin)?))
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Read configuration from `STOCKWATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let origin_raw = lookup("STOCKWATCH_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let origin = Url::parse(&origin_raw)
            .map_err(|e| ConfigError::InvalidOrigin(format!("{origin_raw}: {e}")))?;

        let mut config = Self::for_origin(&origin)?;

        if let Some(raw) = lookup("STOCKWATCH_SOCKETS_ENABLED") {
            config.enabled = parse_bool("STOCKWATCH_SOCKETS_ENABLED", &raw)?;
        }

        if let Some(raw) = lookup("STOCKWATCH_RECONNECT_DELAY_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "STOCKWATCH_RECONNECT_DELAY_MS",
                value: raw.clone(),
            })?;
            config.reconnect.delay = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup("STOCKWATCH_RECONNECT_MAX_ATTEMPTS") {
            config.reconnect.max_attempts =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "STOCKWATCH_RECONNECT_MAX_ATTEMPTS",
                    value: raw.clone(),
                })?;
        }

        Ok(config)
    }
}

fn endpoint_for_origin(origin: &Url) -> Result<Url, ConfigError> {
    let scheme = match origin.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };

    let host = origin
        .host_str()
        .ok_or_else(|| ConfigError::InvalidOrigin(format!("{origin}: missing host")))?;

    let authority = match origin.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    Url::parse(&format!("{scheme}://{authority}{ENDPOINT_PATH}"))
        .map_err(|e| ConfigError::InvalidOrigin(e.to_string()))
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn secure_origin_maps_to_wss_and_keeps_port() {
        let config = ChannelConfig::for_origin(&url("https://erp.example.com:8443/inventory?tab=1"))
            .unwrap();
        assert_eq!(config.endpoint.as_str(), "wss://erp.example.com:8443/ws");
    }

    #[test]
    fn insecure_origin_maps_to_ws_without_default_port() {
        let config = ChannelConfig::for_origin(&url("http://localhost/")).unwrap();
        assert_eq!(config.endpoint.as_str(), "ws://localhost/ws");

        let config = ChannelConfig::for_origin(&url("http://127.0.0.1:5173")).unwrap();
        assert_eq!(config.endpoint.as_str(), "ws://127.0.0.1:5173/ws");
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert_eq!(
            ChannelConfig::for_origin(&url("file:///tmp/index.html")),
            Err(ConfigError::UnsupportedScheme("file".to_string()))
        );
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = ChannelConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.endpoint.as_str(), "ws://localhost:8080/ws");
        assert!(config.enabled);
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = ChannelConfig::from_lookup(lookup(&[
            ("STOCKWATCH_ORIGIN", "https://stock.example.org"),
            ("STOCKWATCH_SOCKETS_ENABLED", "off"),
            ("STOCKWATCH_RECONNECT_DELAY_MS", "250"),
            ("STOCKWATCH_RECONNECT_MAX_ATTEMPTS", "2"),
        ]))
        .unwrap();

        assert_eq!(config.endpoint.as_str(), "wss://stock.example.org/ws");
        assert!(!config.enabled);
        assert_eq!(
            config.reconnect,
            ReconnectPolicy::new(Duration::from_millis(250), 2)
        );
    }

    #[test]
    fn malformed_values_are_reported_with_their_key() {
        let err = ChannelConfig::from_lookup(lookup(&[("STOCKWATCH_RECONNECT_DELAY_MS", "soon")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "STOCKWATCH_RECONNECT_DELAY_MS",
                value: "soon".to_string()
            }
        );

        assert!(matches!(
            ChannelConfig::from_lookup(lookup(&[("STOCKWATCH_SOCKETS_ENABLED", "maybe")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn policy_allows_until_max_attempts() {
        let policy = ReconnectPolicy::new(Duration::from_millis(10), 2);
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
    }
}
