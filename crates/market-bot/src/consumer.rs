//! Long-poll queue consumer
//!
//! Pulls command batches from the discord queue and drives the router. Each
//! message is processed in its own task under a per-message timeout, with the
//! whole batch bounded as well; a message is acknowledged only after its
//! handler reports success. There is no ordering guarantee within a batch.

use std::sync::Arc;
use std::time::Duration;

use market_nats::{ConsumerSettings, QueueName, QueueSource, RawQueueRecord, ResponseSink};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::gateway::DiscordGateway;
use crate::router::MessageRouter;

/// How often the queue depth is logged while the loop is healthy.
const DEPTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Fatal consumer failures, reported to the supervisor.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Giving up after {count} consecutive receive failures: {last}")]
    ReceiveFailures { count: u32, last: market_nats::Error },
}

pub struct QueueConsumer<Q, G, S> {
    source: Arc<Q>,
    router: Arc<MessageRouter<G, S>>,
    settings: ConsumerSettings,
}

impl<Q, G, S> QueueConsumer<Q, G, S>
where
    Q: QueueSource + 'static,
    G: DiscordGateway + 'static,
    S: ResponseSink + 'static,
{
    pub fn new(source: Arc<Q>, router: Arc<MessageRouter<G, S>>, settings: ConsumerSettings) -> Self {
        Self {
            source,
            router,
            settings,
        }
    }

    /// Run the receive loop until a fatal transport failure.
    ///
    /// Individual receive errors are retried after a fixed delay; only a run
    /// of `max_consecutive_failures` in a row escalates to the supervisor.
    pub async fn run(&self) -> Result<(), ConsumerError> {
        info!("Starting consumer for the '{}' queue", QueueName::Discord);

        let mut consecutive_failures = 0u32;
        let mut last_depth_log = Instant::now();

        loop {
            match self
                .source
                .receive(
                    QueueName::Discord,
                    self.settings.batch_size(),
                    self.settings.wait_time(),
                )
                .await
            {
                Ok(records) => {
                    consecutive_failures = 0;
                    if !records.is_empty() {
                        info!(
                            "Received {} messages from the '{}' queue",
                            records.len(),
                            QueueName::Discord
                        );
                        self.process_batch(records).await;
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    self.source.counters().record_error();
                    error!(
                        "Error receiving from the '{}' queue ({} consecutive): {}",
                        QueueName::Discord,
                        consecutive_failures,
                        e
                    );
                    if consecutive_failures >= self.settings.max_consecutive_failures {
                        return Err(ConsumerError::ReceiveFailures {
                            count: consecutive_failures,
                            last: e,
                        });
                    }
                    tokio::time::sleep(self.settings.retry_delay()).await;
                }
            }

            if last_depth_log.elapsed() >= DEPTH_LOG_INTERVAL {
                if let Some(stats) = self.source.describe(QueueName::Discord).await {
                    info!(
                        "Queue '{}' depth: {} waiting, {} in flight",
                        QueueName::Discord,
                        stats.depth,
                        stats.in_flight
                    );
                }
                last_depth_log = Instant::now();
            }
        }
    }

    /// Process one batch concurrently. Messages that outlive the batch
    /// timeout are cancelled; cancellation counts as not-yet-processed and
    /// leaves them queued.
    async fn process_batch(&self, records: Vec<RawQueueRecord>) {
        let mut tasks = JoinSet::new();
        let message_timeout = self.settings.message_timeout();

        for record in records {
            let source = Arc::clone(&self.source);
            let router = Arc::clone(&self.router);
            tasks.spawn(async move {
                Self::process_record(source, router, record, message_timeout).await;
            });
        }

        let drained = tokio::time::timeout(self.settings.batch_timeout(), async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!("Message task panicked: {}", e);
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "Batch exceeded {:?}; cancelling remaining message tasks",
                self.settings.batch_timeout()
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }

    async fn process_record(
        source: Arc<Q>,
        router: Arc<MessageRouter<G, S>>,
        record: RawQueueRecord,
        timeout: Duration,
    ) {
        source.counters().record_message();
        let started = Instant::now();

        match tokio::time::timeout(timeout, router.process(record.body())).await {
            Ok(true) => {
                if !source.ack(&record).await {
                    warn!(
                        "Processed message {} but failed to acknowledge it",
                        record.message_id()
                    );
                }
            }
            Ok(false) => {
                source.counters().record_error();
                warn!(
                    "Handler failed for message {} (delivery {}); leaving it for redelivery",
                    record.message_id(),
                    record.delivery_count()
                );
            }
            Err(_) => {
                source.counters().record_error();
                warn!(
                    "Message {} timed out after {:.1}s; leaving it for redelivery",
                    record.message_id(),
                    started.elapsed().as_secs_f64()
                );
            }
        }
    }
}
