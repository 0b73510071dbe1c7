//! Configuration for the remote backend client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for [`HttpChatBackend`](super::http::HttpChatBackend).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend, without the `api/` root.
    pub base_url: String,
    /// Request timeout.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Headers sent with every request.
    ///
    /// Deployments tunnelled through ngrok need
    /// `("ngrok-skip-browser-warning", "true")` here to bypass the
    /// interstitial page.
    pub default_headers: Vec<(String, String)>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_owned(),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            default_headers: Vec::new(),
        }
    }
}

impl BackendConfig {
    /// Create a config for the given backend base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Add a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let config = BackendConfig::new("https://chat.example.de")
            .with_timeout(Duration::from_secs(30))
            .with_header("ngrok-skip-browser-warning", "true");

        assert_eq!(config.base_url, "https://chat.example.de");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(
            config.default_headers,
            vec![("ngrok-skip-browser-warning".to_owned(), "true".to_owned())]
        );
    }

    #[test]
    fn test_duration_roundtrip() {
        let config = BackendConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: BackendConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.request_timeout, config.request_timeout);
    }
}
