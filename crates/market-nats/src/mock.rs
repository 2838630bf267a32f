//! In-memory transport doubles for unit testing without a real NATS server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::envelope::ResponseEnvelope;
use crate::error::Result;
use crate::queues::QueueName;
use crate::transport::{QueueSource, QueueStats, RawQueueRecord, ResponseSink, TransportCounters};

/// In-memory response sink that records every envelope in send order.
/// Use in tests instead of a real `QueueTransport`.
#[derive(Clone, Default)]
pub struct MockSink {
    sent: Arc<Mutex<Vec<ResponseEnvelope>>>,
    failing: Arc<AtomicBool>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured envelopes in send order.
    pub fn sent(&self) -> Vec<ResponseEnvelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// When set, `send_response` reports failure and records nothing.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ResponseSink for MockSink {
    async fn send_response(&self, response: ResponseEnvelope) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().unwrap().push(response);
        true
    }
}

/// Scripted in-memory queue source for consumer-loop tests.
///
/// `receive` pops pre-loaded batches in order; once the script is exhausted
/// it emulates an empty long-poll (sleeps the wait window, returns nothing).
pub struct MockQueue {
    batches: Mutex<VecDeque<Result<Vec<RawQueueRecord>>>>,
    acked: Mutex<Vec<String>>,
    stats: Mutex<Option<QueueStats>>,
    counters: TransportCounters,
}

impl MockQueue {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(VecDeque::new()),
            acked: Mutex::new(Vec::new()),
            stats: Mutex::new(None),
            counters: TransportCounters::default(),
        }
    }

    /// Queue a batch of records for the next `receive` call.
    pub fn push_batch(&self, records: Vec<RawQueueRecord>) {
        self.batches.lock().unwrap().push_back(Ok(records));
    }

    /// Queue a transport error for the next `receive` call.
    pub fn push_error(&self, error: crate::error::Error) {
        self.batches.lock().unwrap().push_back(Err(error));
    }

    /// Set the stats returned by `describe`.
    pub fn set_stats(&self, stats: QueueStats) {
        *self.stats.lock().unwrap() = Some(stats);
    }

    /// Message ids acknowledged so far, in ack order.
    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().unwrap().clone()
    }
}

impl Default for MockQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueSource for MockQueue {
    async fn receive(
        &self,
        _queue: QueueName,
        _max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<RawQueueRecord>> {
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => batch,
            None => {
                tokio::time::sleep(wait).await;
                Ok(Vec::new())
            }
        }
    }

    async fn ack(&self, record: &RawQueueRecord) -> bool {
        match record.acknowledge().await {
            Ok(()) => {
                self.acked
                    .lock()
                    .unwrap()
                    .push(record.message_id().to_string());
                true
            }
            Err(_) => false,
        }
    }

    async fn describe(&self, _queue: QueueName) -> Option<QueueStats> {
        *self.stats.lock().unwrap()
    }

    fn counters(&self) -> &TransportCounters {
        &self.counters
    }
}
