//! Error types for market-nats

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for market-nats operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Queue '{0}' does not exist")]
    QueueNotFound(String),

    #[error("Acknowledge error: {0}")]
    Ack(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = Error::Connection("refused".to_string());
        assert_eq!(err.to_string(), "Connection error: refused");
    }

    #[test]
    fn test_publish_error_display() {
        let err = Error::Publish("stream unavailable".to_string());
        assert_eq!(err.to_string(), "Publish error: stream unavailable");
    }

    #[test]
    fn test_queue_not_found_display() {
        let err = Error::QueueNotFound("discord".to_string());
        assert_eq!(err.to_string(), "Queue 'discord' does not exist");
    }

    #[test]
    fn test_fetch_error_display() {
        let err = Error::Fetch("no responders".to_string());
        assert_eq!(err.to_string(), "Fetch error: no responders");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("not_a_number").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().starts_with("Serialization error:"));
    }

    #[test]
    fn test_from_anyhow_error() {
        let anyhow_err = anyhow::anyhow!("something went wrong");
        let err: Error = anyhow_err.into();
        assert_eq!(err.to_string(), "Other error: something went wrong");
    }
}
