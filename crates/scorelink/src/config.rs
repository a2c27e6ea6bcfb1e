//! Client configuration.

use std::time::Duration;

use scorelink_timing::{ReconnectPolicy, RefreshPolicy};

/// Environment variable overriding [`ClientConfig::socket_url`].
pub const SOCKET_URL_ENV: &str = "SCORELINK_SOCKET_URL";
/// Environment variable overriding [`ClientConfig::api_url`].
pub const API_URL_ENV: &str = "SCORELINK_API_URL";

/// Everything the client needs to reach the scoreboard server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the push channel.
    pub socket_url: String,
    /// Base URL of the REST API (auth endpoints live under `/auth`).
    pub api_url: String,
    /// How long to wait for the server's `Welcome` after the upgrade.
    pub handshake_timeout: Duration,
    /// Timeout for each auth endpoint request.
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub refresh: RefreshPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_url: "ws://localhost:3000".to_string(),
            api_url: "http://localhost:3000/api".to_string(),
            handshake_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            refresh: RefreshPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults, with the URLs taken from `SCORELINK_SOCKET_URL` and
    /// `SCORELINK_API_URL` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(SOCKET_URL_ENV) {
            config.socket_url = url;
        }
        if let Ok(url) = std::env::var(API_URL_ENV) {
            config.api_url = url;
        }
        config
    }

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called by [`ClientBuilder`](crate::ClientBuilder). Zero timeouts are
    /// raised to 1 s; a trailing `/` on `api_url` is dropped so endpoint
    /// paths join cleanly.
    pub fn validated(mut self) -> Self {
        if self.handshake_timeout.is_zero() {
            tracing::warn!("handshake_timeout is zero, raising to 1s");
            self.handshake_timeout = Duration::from_secs(1);
        }
        if self.request_timeout.is_zero() {
            tracing::warn!("request_timeout is zero, raising to 1s");
            self.request_timeout = Duration::from_secs(1);
        }
        while self.api_url.ends_with('/') {
            self.api_url.pop();
        }
        self.reconnect = self.reconnect.validated();
        self.refresh = self.refresh.validated();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_points_at_local_server() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.socket_url, "ws://localhost:3000");
        assert_eq!(cfg.api_url, "http://localhost:3000/api");
        assert_eq!(cfg.handshake_timeout, Duration::from_secs(5));
        assert_eq!(cfg.reconnect.max_attempts, 5);
    }

    #[test]
    fn test_validated_trims_trailing_slash() {
        let cfg = ClientConfig {
            api_url: "https://scores.example.com/api//".into(),
            ..Default::default()
        }
        .validated();
        assert_eq!(cfg.api_url, "https://scores.example.com/api");
    }

    #[test]
    fn test_validated_raises_zero_timeouts() {
        let cfg = ClientConfig {
            handshake_timeout: Duration::ZERO,
            request_timeout: Duration::ZERO,
            ..Default::default()
        }
        .validated();
        assert_eq!(cfg.handshake_timeout, Duration::from_secs(1));
        assert_eq!(cfg.request_timeout, Duration::from_secs(1));
    }
}
