//! Consumer lifecycle supervision
//!
//! Owns the consumer's background task: starts it, restarts it on fatal
//! failure with capped exponential backoff, logs a periodic heartbeat, and
//! tears everything down on shutdown so no background work survives.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use market_nats::{QueueName, QueueSource, ResponseSink};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::consumer::QueueConsumer;
use crate::gateway::DiscordGateway;

/// Restart and heartbeat tuning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// First restart delay; doubles per consecutive failure.
    pub base_backoff: Duration,
    /// Ceiling for the restart delay.
    pub max_backoff: Duration,
    /// Automatic restarts before requiring manual intervention.
    pub max_restart_attempts: u32,
    pub heartbeat_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            base_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300),
            max_restart_attempts: 10,
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}

/// Restart delay for the given attempt (1-based): `base * 2^(attempt-1)`,
/// capped at `max_backoff`.
pub fn restart_backoff(config: &SupervisorConfig, attempt: u32) -> Duration {
    let multiplier = 1u32 << attempt.saturating_sub(1).min(16);
    config
        .base_backoff
        .saturating_mul(multiplier)
        .min(config.max_backoff)
}

/// Point-in-time operational view, derived from counters on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub message_count: u64,
    pub error_count: u64,
    pub last_message_time: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub consumer_running: bool,
    pub heartbeat_running: bool,
}

#[derive(Default)]
struct SupervisorShared {
    restart_count: AtomicU32,
    consumer_running: AtomicBool,
    heartbeat_running: AtomicBool,
}

/// Cheap cloneable view of supervisor state, used by the health endpoint.
pub struct SupervisorHandle<Q> {
    shared: Arc<SupervisorShared>,
    source: Arc<Q>,
}

impl<Q> Clone for SupervisorHandle<Q> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            source: Arc::clone(&self.source),
        }
    }
}

impl<Q: QueueSource> SupervisorHandle<Q> {
    pub fn snapshot(&self) -> HealthSnapshot {
        let counters = self.source.counters();
        HealthSnapshot {
            message_count: counters.message_count(),
            error_count: counters.error_count(),
            last_message_time: counters.last_message_time(),
            restart_count: self.shared.restart_count.load(Ordering::Relaxed),
            consumer_running: self.shared.consumer_running.load(Ordering::Relaxed),
            heartbeat_running: self.shared.heartbeat_running.load(Ordering::Relaxed),
        }
    }
}

pub struct ConsumerSupervisor<Q, G, S> {
    consumer: Arc<QueueConsumer<Q, G, S>>,
    source: Arc<Q>,
    config: SupervisorConfig,
    shared: Arc<SupervisorShared>,
    supervise_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl<Q, G, S> ConsumerSupervisor<Q, G, S>
where
    Q: QueueSource + 'static,
    G: DiscordGateway + 'static,
    S: ResponseSink + 'static,
{
    pub fn new(
        consumer: QueueConsumer<Q, G, S>,
        source: Arc<Q>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            consumer: Arc::new(consumer),
            source,
            config,
            shared: Arc::new(SupervisorShared::default()),
            supervise_task: None,
            heartbeat_task: None,
        }
    }

    pub fn handle(&self) -> SupervisorHandle<Q> {
        SupervisorHandle {
            shared: Arc::clone(&self.shared),
            source: Arc::clone(&self.source),
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.handle().snapshot()
    }

    /// Spawn the supervise and heartbeat tasks. Idempotent.
    pub fn start(&mut self) {
        if self.supervise_task.is_some() {
            warn!("Consumer supervisor already started");
            return;
        }

        let consumer = Arc::clone(&self.consumer);
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        self.supervise_task = Some(tokio::spawn(Self::supervise(consumer, shared, config)));

        let source = Arc::clone(&self.source);
        let shared = Arc::clone(&self.shared);
        let interval = self.config.heartbeat_interval;
        self.heartbeat_task = Some(tokio::spawn(Self::heartbeat(source, shared, interval)));

        info!("Consumer supervisor started");
    }

    /// Bounded restart loop. Recursion-free so the attempt cap is explicit
    /// and the call stack stays flat across restarts.
    async fn supervise(
        consumer: Arc<QueueConsumer<Q, G, S>>,
        shared: Arc<SupervisorShared>,
        config: SupervisorConfig,
    ) {
        let mut attempt = 0u32;
        loop {
            shared.consumer_running.store(true, Ordering::Relaxed);
            let result = consumer.run().await;
            shared.consumer_running.store(false, Ordering::Relaxed);

            match result {
                Ok(()) => {
                    info!("Queue consumer stopped");
                    break;
                }
                Err(e) => {
                    attempt += 1;
                    shared.restart_count.fetch_add(1, Ordering::Relaxed);

                    if attempt > config.max_restart_attempts {
                        error!(
                            "Queue consumer failed {} times; not restarting again, manual intervention required (last error: {})",
                            attempt, e
                        );
                        break;
                    }

                    let delay = restart_backoff(&config, attempt);
                    warn!(
                        "Queue consumer failed (attempt {}/{}): {}; restarting in {:?}",
                        attempt, config.max_restart_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn heartbeat(source: Arc<Q>, shared: Arc<SupervisorShared>, interval: Duration) {
        shared.heartbeat_running.store(true, Ordering::Relaxed);
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let counters = source.counters();
            let depth = source
                .describe(QueueName::Discord)
                .await
                .map(|stats| stats.depth);
            info!(
                "Consumer heartbeat: processed={} errors={} restarts={} queue_depth={:?}",
                counters.message_count(),
                counters.error_count(),
                shared.restart_count.load(Ordering::Relaxed),
                depth
            );
        }
    }

    /// Cancel and await the consumer and heartbeat tasks. After this returns
    /// no supervisor-owned background work remains.
    pub async fn stop(&mut self) {
        for task in [self.supervise_task.take(), self.heartbeat_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Supervised task ended abnormally: {}", e);
                }
            }
        }
        self.shared.consumer_running.store(false, Ordering::Relaxed);
        self.shared.heartbeat_running.store(false, Ordering::Relaxed);
        info!("Stopped queue consumer");
    }
}
