//! Client configuration for the attendance service.

use std::time::Duration;

/// Default base URL for a locally hosted attendance service.
const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Configuration shared by every component that talks to the service.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the attendance service
    pub base_url: String,
    /// Bearer token attached to every request when present
    pub auth_token: Option<String>,
    /// User agent string
    pub user_agent: String,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout; there is no retry on top of it
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_token: None,
            user_agent: format!("rollcall/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Builds a config from the environment, falling back to defaults.
    ///
    /// Recognized variables: `ROLLCALL_BASE_URL`, `ROLLCALL_AUTH_TOKEN`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("ROLLCALL_BASE_URL") {
            if !url.is_empty() {
                config.base_url = url;
            }
        }
        if let Ok(token) = std::env::var("ROLLCALL_AUTH_TOKEN") {
            if !token.is_empty() {
                config.auth_token = Some(token);
            }
        }
        config
    }

    /// Replaces the base URL, trimming a trailing slash.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.auth_token.is_none());
        assert!(config.user_agent.starts_with("rollcall/"));
    }

    #[test]
    fn test_with_base_url_trims_slash() {
        let config = ClientConfig::default().with_base_url("http://example.edu:3000/");
        assert_eq!(config.base_url, "http://example.edu:3000");
    }
}
