//! Durable queue transport over JetStream
//!
//! Wraps the two marketplace streams behind send / receive / ack / describe.
//! Delivery is at-least-once: a message is removed from the queue only by an
//! explicit acknowledgment after successful processing; everything else is
//! redelivered after the ack wait expires.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::consumer::{AckPolicy, Consumer};
use async_nats::jetstream::{self, stream};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::envelope::ResponseEnvelope;
use crate::error::{Error, Result};
use crate::queues::QueueName;

/// Transport-level wrapper around one delivered message.
///
/// Carries just enough for acknowledgment and logging; business logic only
/// ever sees the parsed body.
pub struct RawQueueRecord {
    message_id: String,
    delivery_count: i64,
    body: Vec<u8>,
    acker: Acker,
}

enum Acker {
    Jetstream(Box<jetstream::Message>),
    Probe(Arc<AtomicBool>),
}

impl RawQueueRecord {
    fn from_jetstream(message: jetstream::Message) -> Self {
        let (message_id, delivery_count) = match message.info() {
            Ok(info) => (info.stream_sequence.to_string(), info.delivered),
            Err(_) => ("unknown".to_string(), 1),
        };
        Self {
            message_id,
            delivery_count,
            body: message.payload.to_vec(),
            acker: Acker::Jetstream(Box::new(message)),
        }
    }

    /// Build a detached record for tests. The returned flag flips to `true`
    /// when the record is acknowledged.
    pub fn mock(message_id: impl Into<String>, body: impl Into<Vec<u8>>) -> (Self, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        let record = Self {
            message_id: message_id.into(),
            delivery_count: 1,
            body: body.into(),
            acker: Acker::Probe(flag.clone()),
        };
        (record, flag)
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// How many times this message has been delivered (1 = first delivery).
    pub fn delivery_count(&self) -> i64 {
        self.delivery_count
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) async fn acknowledge(&self) -> Result<()> {
        match &self.acker {
            Acker::Jetstream(message) => message
                .ack()
                .await
                .map_err(|e| Error::Ack(e.to_string())),
            Acker::Probe(flag) => {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

/// Approximate queue depth, for observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Messages waiting in the stream
    pub depth: u64,
    /// Delivered but not yet acknowledged
    pub in_flight: u64,
}

/// Monotonic counters for observability.
///
/// Updates race freely; nothing correctness-critical reads them.
#[derive(Debug, Default)]
pub struct TransportCounters {
    message_count: AtomicU64,
    error_count: AtomicU64,
    last_message_time: AtomicI64,
}

impl TransportCounters {
    pub fn record_message(&self) {
        self.message_count.fetch_add(1, Ordering::Relaxed);
        self.last_message_time
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Time the most recent message was received, if any.
    pub fn last_message_time(&self) -> Option<DateTime<Utc>> {
        match self.last_message_time.load(Ordering::Relaxed) {
            0 => None,
            secs => DateTime::from_timestamp(secs, 0),
        }
    }
}

/// Typed message attribute attached as a header on send.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    String(String),
    Number(i64),
}

impl AttributeValue {
    fn render(&self) -> String {
        match self {
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Number(n) => n.to_string(),
        }
    }
}

/// Receive side of the transport. The consumer loop depends on this seam so
/// it can run against an in-memory queue in tests.
pub trait QueueSource: Send + Sync {
    fn receive(
        &self,
        queue: QueueName,
        max_messages: usize,
        wait: Duration,
    ) -> impl Future<Output = Result<Vec<RawQueueRecord>>> + Send;

    /// Acknowledge a processed message. Must be called only after successful
    /// handling; reports failure as `false`.
    fn ack(&self, record: &RawQueueRecord) -> impl Future<Output = bool> + Send;

    fn describe(&self, queue: QueueName) -> impl Future<Output = Option<QueueStats>> + Send;

    fn counters(&self) -> &TransportCounters;
}

/// Send side for correlated responses. Implemented by the real transport and
/// by [`crate::mock::MockSink`].
pub trait ResponseSink: Send + Sync {
    /// Stamp and send a response envelope; callers observe a boolean.
    fn send_response(&self, response: ResponseEnvelope) -> impl Future<Output = bool> + Send;
}

impl<T: QueueSource> QueueSource for Arc<T> {
    fn receive(
        &self,
        queue: QueueName,
        max_messages: usize,
        wait: Duration,
    ) -> impl Future<Output = Result<Vec<RawQueueRecord>>> + Send {
        T::receive(self.as_ref(), queue, max_messages, wait)
    }

    fn ack(&self, record: &RawQueueRecord) -> impl Future<Output = bool> + Send {
        T::ack(self.as_ref(), record)
    }

    fn describe(&self, queue: QueueName) -> impl Future<Output = Option<QueueStats>> + Send {
        T::describe(self.as_ref(), queue)
    }

    fn counters(&self) -> &TransportCounters {
        T::counters(self.as_ref())
    }
}

impl<T: ResponseSink> ResponseSink for Arc<T> {
    fn send_response(&self, response: ResponseEnvelope) -> impl Future<Output = bool> + Send {
        T::send_response(self.as_ref(), response)
    }
}

/// Queue transport over a JetStream context.
pub struct QueueTransport {
    jetstream: jetstream::Context,
    config: QueueConfig,
    consumers: RwLock<HashMap<QueueName, Consumer<pull::Config>>>,
    counters: TransportCounters,
}

impl QueueTransport {
    pub fn new(client: async_nats::Client, config: QueueConfig) -> Self {
        Self {
            jetstream: jetstream::new(client),
            config,
            consumers: RwLock::new(HashMap::new()),
            counters: TransportCounters::default(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Create-or-get both streams and the command-queue consumer. Called at
    /// startup; failure here is fatal.
    pub async fn ensure_queues(&self) -> Result<()> {
        self.ensure_stream(QueueName::Discord).await?;
        self.ensure_stream(QueueName::Backend).await?;
        self.resolve(QueueName::Discord).await?;
        info!("Queues ready (prefix: {})", self.config.prefix);
        Ok(())
    }

    async fn ensure_stream(&self, queue: QueueName) -> Result<stream::Stream> {
        let name = queue.stream_name(&self.config.prefix);
        self.jetstream
            .get_or_create_stream(stream::Config {
                name: name.clone(),
                subjects: vec![queue.subject(&self.config.prefix)],
                retention: stream::RetentionPolicy::WorkQueue,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Connection(format!("Failed to ensure stream {}: {}", name, e)))
    }

    /// Resolve a queue to its durable pull consumer, creating it on first
    /// use. The handle is cached for subsequent polls.
    pub async fn resolve(&self, queue: QueueName) -> Result<Consumer<pull::Config>> {
        if let Some(consumer) = self.consumers.read().expect("consumer cache lock").get(&queue) {
            return Ok(consumer.clone());
        }

        let stream = self.ensure_stream(queue).await?;
        let settings = &self.config.consumer;
        let name = queue.consumer_name();
        let consumer = stream
            .get_or_create_consumer(
                &name,
                pull::Config {
                    durable_name: Some(name.clone()),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: settings.ack_wait(),
                    max_deliver: settings.max_deliver.max(-1),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                Error::Connection(format!("Failed to resolve consumer for '{}': {}", queue, e))
            })?;

        self.consumers
            .write()
            .expect("consumer cache lock")
            .insert(queue, consumer.clone());
        Ok(consumer)
    }

    async fn try_send(&self, queue: QueueName, body: Vec<u8>, headers: Option<async_nats::HeaderMap>) -> Result<()> {
        let subject = queue.subject(&self.config.prefix);
        debug!("Publishing to {}, size: {} bytes", subject, body.len());

        let ack = match headers {
            Some(headers) => self
                .jetstream
                .publish_with_headers(subject.clone(), headers, body.into())
                .await,
            None => self.jetstream.publish(subject.clone(), body.into()).await,
        }
        .map_err(|e| Error::Publish(format!("Failed to publish to {}: {}", subject, e)))?;

        ack.await
            .map_err(|e| Error::Publish(format!("No publish ack from {}: {}", subject, e)))?;
        Ok(())
    }

    /// Send a serializable message to a queue. Failures are logged and
    /// reported as `false`; this never panics or raises into the caller.
    pub async fn send(&self, queue: QueueName, message: &impl Serialize) -> bool {
        self.send_with_attributes(queue, message, &[]).await
    }

    /// Send with typed string/number attributes attached as headers.
    pub async fn send_with_attributes(
        &self,
        queue: QueueName,
        message: &impl Serialize,
        attributes: &[(&str, AttributeValue)],
    ) -> bool {
        let body = match serde_json::to_vec(message) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to serialize message for queue '{}': {}", queue, e);
                self.counters.record_error();
                return false;
            }
        };

        let headers = if attributes.is_empty() {
            None
        } else {
            let mut map = async_nats::HeaderMap::new();
            for (key, value) in attributes {
                map.insert(*key, value.render().as_str());
            }
            Some(map)
        };

        match self.try_send(queue, body, headers).await {
            Ok(()) => {
                debug!("Message sent to queue '{}'", queue);
                true
            }
            Err(e) => {
                error!("Failed to send message to queue '{}': {}", queue, e);
                self.counters.record_error();
                false
            }
        }
    }
}

impl QueueSource for QueueTransport {
    /// Long-poll one batch of messages. Returns an empty vec when the wait
    /// expires with nothing to deliver; transport failures are `Err` and the
    /// caller is expected to sleep and retry.
    async fn receive(
        &self,
        queue: QueueName,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<RawQueueRecord>> {
        let consumer = self.resolve(queue).await?;

        let mut batch = consumer
            .fetch()
            .max_messages(max_messages.clamp(1, 10))
            .expires(wait)
            .messages()
            .await
            .map_err(|e| Error::Fetch(format!("Failed to fetch from '{}': {}", queue, e)))?;

        let mut records = Vec::new();
        while let Some(next) = batch.next().await {
            match next {
                Ok(message) => records.push(RawQueueRecord::from_jetstream(message)),
                Err(e) => {
                    if records.is_empty() {
                        return Err(Error::Fetch(format!(
                            "Error receiving from '{}': {}",
                            queue, e
                        )));
                    }
                    // Keep what was already delivered; the rest redelivers.
                    warn!("Receive from '{}' ended early: {}", queue, e);
                    break;
                }
            }
        }

        Ok(records)
    }

    async fn ack(&self, record: &RawQueueRecord) -> bool {
        match record.acknowledge().await {
            Ok(()) => {
                debug!("Acknowledged message {}", record.message_id());
                true
            }
            Err(e) => {
                error!(
                    "Failed to acknowledge message {}: {}",
                    record.message_id(),
                    e
                );
                self.counters.record_error();
                false
            }
        }
    }

    /// Stream/consumer introspection. `None` on any failure; depth reporting
    /// must never take the consumer down.
    async fn describe(&self, queue: QueueName) -> Option<QueueStats> {
        let name = queue.stream_name(&self.config.prefix);
        let mut stream = match self.jetstream.get_stream(&name).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to look up stream {}: {}", name, e);
                return None;
            }
        };

        let depth = match stream.info().await {
            Ok(info) => info.state.messages,
            Err(e) => {
                warn!("Failed to fetch stream info for {}: {}", name, e);
                return None;
            }
        };

        let in_flight = match self.resolve(queue).await {
            Ok(consumer) => {
                let mut consumer = consumer;
                match consumer.info().await {
                    Ok(info) => info.num_ack_pending as u64,
                    Err(_) => 0,
                }
            }
            Err(_) => 0,
        };

        Some(QueueStats { depth, in_flight })
    }

    fn counters(&self) -> &TransportCounters {
        &self.counters
    }
}

impl ResponseSink for QueueTransport {
    async fn send_response(&self, response: ResponseEnvelope) -> bool {
        let body = match response.to_wire() {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to serialize {} response: {}", response.kind, e);
                self.counters.record_error();
                return false;
            }
        };

        match self.try_send(QueueName::Backend, body, None).await {
            Ok(()) => {
                info!("Response sent successfully: {}", response.kind);
                true
            }
            Err(e) => {
                error!("Failed to send {} response: {}", response.kind, e);
                self.counters.record_error();
                false
            }
        }
    }
}
