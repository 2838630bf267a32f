//! Configuration types for the marketplace queue transport

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Queue connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// NATS server URLs (comma-separated when loaded from env)
    pub servers: Vec<String>,
    /// Subject prefix isolating environments (e.g., "prod", "dev")
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Optional credentials file path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<String>,
    /// Optional username
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Optional password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Consumer tuning
    #[serde(default)]
    pub consumer: ConsumerSettings,
}

fn default_prefix() -> String {
    "prod".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            servers: vec!["localhost:4222".to_string()],
            prefix: default_prefix(),
            credentials_file: None,
            username: None,
            password: None,
            consumer: ConsumerSettings::default(),
        }
    }
}

impl QueueConfig {
    /// Create a new queue config with the given servers and prefix
    pub fn new(servers: Vec<String>, prefix: impl Into<String>) -> Self {
        Self {
            servers,
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Parse servers from a comma-separated URL string
    pub fn from_url(url: impl AsRef<str>, prefix: impl Into<String>) -> Self {
        let servers = url
            .as_ref()
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();
        Self::new(servers, prefix)
    }

    /// Set credentials file
    pub fn with_credentials(mut self, file: impl Into<String>) -> Self {
        self.credentials_file = Some(file.into());
        self
    }

    /// Set username and password
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// Tuning knobs for the long-poll consumer.
///
/// Durations are stored as whole seconds so the struct deserializes cleanly
/// from TOML and environment strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerSettings {
    /// Maximum messages fetched per poll (capped at 10)
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// Long-poll window in seconds (capped at 20)
    #[serde(default = "default_wait_time")]
    pub wait_time_secs: u64,
    /// Sleep after a transport-level receive error
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Redelivery window for unacknowledged messages
    #[serde(default = "default_ack_wait")]
    pub ack_wait_secs: u64,
    /// Maximum delivery attempts per message; -1 means unlimited
    #[serde(default = "default_max_deliver")]
    pub max_deliver: i64,
    /// Per-message processing timeout
    #[serde(default = "default_message_timeout")]
    pub message_timeout_secs: u64,
    /// Whole-batch processing timeout
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,
    /// Consecutive receive failures before the consumer reports a fatal error
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn default_max_messages() -> usize {
    10
}

fn default_wait_time() -> u64 {
    20
}

fn default_retry_delay() -> u64 {
    5
}

fn default_ack_wait() -> u64 {
    120
}

fn default_max_deliver() -> i64 {
    -1
}

fn default_message_timeout() -> u64 {
    30
}

fn default_batch_timeout() -> u64 {
    60
}

fn default_max_consecutive_failures() -> u32 {
    10
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            wait_time_secs: default_wait_time(),
            retry_delay_secs: default_retry_delay(),
            ack_wait_secs: default_ack_wait(),
            max_deliver: default_max_deliver(),
            message_timeout_secs: default_message_timeout(),
            batch_timeout_secs: default_batch_timeout(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl ConsumerSettings {
    /// Receive batch size, clamped to the transport maximum of 10.
    pub fn batch_size(&self) -> usize {
        self.max_messages.clamp(1, 10)
    }

    /// Long-poll window, clamped to the transport maximum of 20 seconds.
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_secs.min(20))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn ack_wait(&self) -> Duration {
        Duration::from_secs(self.ack_wait_secs)
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_secs(self.message_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_localhost() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.servers, vec!["localhost:4222"]);
        assert_eq!(cfg.prefix, "prod");
        assert!(cfg.credentials_file.is_none());
    }

    #[test]
    fn test_from_url_single() {
        let cfg = QueueConfig::from_url("nats://localhost:4222", "dev");
        assert_eq!(cfg.servers, vec!["nats://localhost:4222"]);
        assert_eq!(cfg.prefix, "dev");
    }

    #[test]
    fn test_from_url_multiple_trims_whitespace() {
        let cfg = QueueConfig::from_url("n1:4222 , n2:4222,n3:4222", "prod");
        assert_eq!(cfg.servers, vec!["n1:4222", "n2:4222", "n3:4222"]);
    }

    #[test]
    fn test_with_auth() {
        let cfg = QueueConfig::from_url("localhost:4222", "test").with_auth("alice", "secret");
        assert_eq!(cfg.username, Some("alice".to_string()));
        assert_eq!(cfg.password, Some("secret".to_string()));
    }

    #[test]
    fn test_consumer_defaults() {
        let settings = ConsumerSettings::default();
        assert_eq!(settings.max_messages, 10);
        assert_eq!(settings.wait_time_secs, 20);
        assert_eq!(settings.retry_delay_secs, 5);
        assert_eq!(settings.max_deliver, -1);
        assert_eq!(settings.message_timeout_secs, 30);
        assert_eq!(settings.batch_timeout_secs, 60);
    }

    #[test]
    fn test_batch_size_clamped() {
        let settings = ConsumerSettings {
            max_messages: 50,
            ..Default::default()
        };
        assert_eq!(settings.batch_size(), 10);

        let settings = ConsumerSettings {
            max_messages: 0,
            ..Default::default()
        };
        assert_eq!(settings.batch_size(), 1);
    }

    #[test]
    fn test_wait_time_clamped() {
        let settings = ConsumerSettings {
            wait_time_secs: 45,
            ..Default::default()
        };
        assert_eq!(settings.wait_time(), Duration::from_secs(20));
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: ConsumerSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.max_messages, 10);
        assert_eq!(settings.max_consecutive_failures, 10);
    }

    #[test]
    fn test_optional_fields_omitted_in_json() {
        let cfg = QueueConfig::from_url("localhost:4222", "test");
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("credentials_file"));
        assert!(!json.contains("username"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn test_default_prefix_on_deserialization() {
        let json = r#"{"servers":["localhost:4222"]}"#;
        let cfg: QueueConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.prefix, "prod");
    }
}
