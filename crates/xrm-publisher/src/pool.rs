//! Resilient worker pool: one feeder task drains the durable queue onto a
//! shared channel; each worker owns an independent connection and retries
//! with reconnect/backoff until its message is confirmed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use xrm_types::QueueMessage;

use xrm_queue::DurableQueue;

use crate::backoff::{jittered_retry_delay, REINIT_DELAY, RECONNECT_DELAY};
use crate::error::PublishError;
use crate::session::PublisherSession;

/// Static configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Number of concurrent publish workers. Forced to 1 in shoveler mode
    /// to preserve message order.
    pub workers: usize,
    pub default_exchange: String,
}

/// Shared, atomically-updated counters for monitoring.
#[derive(Debug, Default)]
pub struct PoolStats {
    reconnects: AtomicU64,
    in_flight: AtomicU64,
}

impl PoolStats {
    #[must_use]
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }
}

/// The resilient AMQP publisher: a feeder plus `workers` independent
/// publish loops, sharing a queue, a credential URL, and a cancellation
/// signal.
pub struct PublisherPool {
    config: PublisherConfig,
    queue: Arc<DurableQueue>,
    url_rx: tokio::sync::watch::Receiver<String>,
    cancel: CancellationToken,
    stats: Arc<PoolStats>,
}

impl PublisherPool {
    #[must_use]
    pub fn new(
        config: PublisherConfig,
        queue: Arc<DurableQueue>,
        url_rx: tokio::sync::watch::Receiver<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            queue,
            url_rx,
            cancel,
            stats: Arc::new(PoolStats::default()),
        }
    }

    #[must_use]
    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    /// Run the feeder and worker tasks until cancelled. Returns once every
    /// worker has drained its in-flight message and disconnected.
    pub async fn run(&self) {
        let (tx, rx) = mpsc::channel::<QueueMessage>(self.config.workers.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let feeder = {
            let queue = Arc::clone(&self.queue);
            let cancel = self.cancel.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        dequeued = queue.dequeue() => {
                            match dequeued {
                                Ok(msg) => {
                                    if tx.send(msg).await.is_err() {
                                        break;
                                    }
                                }
                                Err(err) => {
                                    tracing::warn!(target: "relay.publisher", error = %err, "queue dequeue failed");
                                }
                            }
                        }
                    }
                }
            })
        };
        drop(tx);

        let mut workers = Vec::new();
        for id in 0..self.config.workers.max(1) {
            let rx = Arc::clone(&rx);
            let url_rx = self.url_rx.clone();
            let cancel = self.cancel.clone();
            let default_exchange = self.config.default_exchange.clone();
            let stats = Arc::clone(&self.stats);
            workers.push(tokio::spawn(async move {
                worker_loop(id, rx, url_rx, cancel, default_exchange, stats).await;
            }));
        }

        self.cancel.cancelled().await;
        let _ = feeder.await;
        for worker in workers {
            let _ = worker.await;
        }
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueueMessage>>>,
    mut url_rx: tokio::sync::watch::Receiver<String>,
    cancel: CancellationToken,
    default_exchange: String,
    stats: Arc<PoolStats>,
) {
    let mut session: Option<PublisherSession> = None;

    loop {
        if cancel.is_cancelled() && session.is_none() {
            break;
        }

        let msg = {
            let mut guard = rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => None,
                changed = url_rx.changed(), if session.is_some() => {
                    let _ = changed;
                    tracing::info!(target: "relay.publisher", id, "credential file changed, forcing reconnect");
                    session = None;
                    stats.reconnects.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                msg = guard.recv() => msg,
            }
        };
        let Some(msg) = msg else { break };

        // Once a message is out of the durable queue it has no way back in
        // (no peek/requeue), so it must be retried to completion here even
        // across a cancellation — the outer loop only exits between
        // messages, never mid-publish.
        stats.in_flight.fetch_add(1, Ordering::Relaxed);
        publish_with_retry(id, &msg, &mut session, &mut url_rx, &default_exchange, &stats).await;
        stats.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    if let Some(mut session) = session {
        session.close().await;
    }
}

/// Publish one message, reconnecting and retrying with jitter until it is
/// confirmed. Never abandons `msg`: this runs to completion regardless of
/// pool cancellation, since the durable queue has already relinquished it.
/// A credential-file change is raced alongside the connect/publish so an
/// already-connected worker picks up refreshed credentials promptly rather
/// than on its next failure.
async fn publish_with_retry(
    worker_id: usize,
    msg: &QueueMessage,
    session: &mut Option<PublisherSession>,
    url_rx: &mut tokio::sync::watch::Receiver<String>,
    default_exchange: &str,
    stats: &PoolStats,
) {
    loop {
        if session.is_none() || !session.as_ref().unwrap().is_connected() {
            let url = url_rx.borrow_and_update().clone();
            match PublisherSession::connect(&url).await {
                Ok(s) => {
                    *session = Some(s);
                }
                Err(err) => {
                    tracing::warn!(target: "relay.publisher", worker_id, error = %err, "connection attempt failed, backing off");
                    stats.reconnects.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            }
        }

        let publish_result = tokio::select! {
            changed = url_rx.changed() => {
                let _ = changed;
                tracing::info!(target: "relay.publisher", worker_id, "credential file changed, reconnecting before retry");
                *session = None;
                stats.reconnects.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            result = session.as_ref().unwrap().publish(msg, default_exchange) => result,
        };

        match publish_result {
            Ok(()) => return,
            Err(err @ (PublishError::Connection(_) | PublishError::Channel(_))) => {
                tracing::warn!(target: "relay.publisher", worker_id, error = %err, "session error, reconnecting");
                *session = None;
                stats.reconnects.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(REINIT_DELAY).await;
            }
            Err(err) => {
                tracing::warn!(target: "relay.publisher", worker_id, error = %err, "publish failed, retrying with jitter");
                tokio::time::sleep(jittered_retry_delay()).await;
            }
        }
    }
}
