//! Durable queue transport between the marketplace backend and the Discord bot

pub mod config;
pub mod connect;
pub mod envelope;
pub mod error;
pub mod mock;
pub mod queues;
pub mod transport;

pub use config::{ConsumerSettings, QueueConfig};
pub use connect::connect;
pub use envelope::{Correlation, MessageKind, QueueMessage, ResponseEnvelope};
pub use error::{Error, Result};
pub use queues::QueueName;
pub use transport::{
    AttributeValue, QueueSource, QueueStats, QueueTransport, RawQueueRecord, ResponseSink,
    TransportCounters,
};
