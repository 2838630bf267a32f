//! Queue naming for the marketplace bridge
//!
//! Two independent unidirectional queues connect the backend and the bot:
//!
//! - `discord` (backend → bot): provisioning commands such as `create_thread`.
//!   Stream `MARKET_DISCORD_{PREFIX}`, subject `market.{prefix}.discord`.
//! - `backend` (bot → backend): correlated responses (`thread_created`,
//!   `error`). Stream `MARKET_BACKEND_{PREFIX}`, subject
//!   `market.{prefix}.backend`.
//!
//! There is no ordering relationship between the two queues.

use std::fmt;

use crate::error::{Error, Result};

/// The closed set of queues this transport knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    /// Backend → bot command queue
    Discord,
    /// Bot → backend response queue
    Backend,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Discord => "discord",
            QueueName::Backend => "backend",
        }
    }

    /// Resolve a queue by name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "discord" => Ok(QueueName::Discord),
            "backend" => Ok(QueueName::Backend),
            other => Err(Error::QueueNotFound(other.to_string())),
        }
    }

    /// JetStream stream name for this queue.
    pub fn stream_name(&self, prefix: &str) -> String {
        match self {
            QueueName::Discord => format!("MARKET_DISCORD_{}", prefix.to_uppercase()),
            QueueName::Backend => format!("MARKET_BACKEND_{}", prefix.to_uppercase()),
        }
    }

    /// Subject messages for this queue are published on.
    pub fn subject(&self, prefix: &str) -> String {
        format!("market.{}.{}", prefix, self.as_str())
    }

    /// Durable consumer name used by this process.
    pub fn consumer_name(&self) -> String {
        format!("market-bot-{}", self.as_str())
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
