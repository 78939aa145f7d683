//! Accepted-event producer.
//!
//! `publish` is a non-blocking enqueue onto a bounded channel; a fixed pool
//! of workers drains it and writes to the accepted topic synchronously with
//! a per-write timeout and bounded retries. Records that overflow the
//! channel or exhaust their retries are spilled to the DLQ table, so every
//! successful debit ends up either on the topic or in `kafka_dlq`.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ProducerConfig;
use crate::dlq::DlqStore;
use crate::domain::KeyedMessage;

#[derive(Debug, Error)]
pub enum PublishError {
    /// The worker pool has shut down; no new records are accepted.
    #[error("producer channel closed")]
    Closed,
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<KeyedMessage>>>;

/// Publish-side handle. Cheap to clone through an `Arc`.
pub struct AcceptedProducer {
    tx: mpsc::Sender<KeyedMessage>,
    dlq: Arc<DlqStore>,
}

impl AcceptedProducer {
    /// Create the producer handle and its worker pool.
    pub fn new(
        kafka: FutureProducer,
        dlq: Arc<DlqStore>,
        cfg: &ProducerConfig,
    ) -> (Arc<Self>, ProducerPool) {
        let (tx, rx) = mpsc::channel(cfg.queue_size);

        let handle = Arc::new(Self {
            tx,
            dlq: dlq.clone(),
        });

        let pool = ProducerPool {
            kafka,
            dlq,
            cfg: cfg.clone(),
            rx: Arc::new(Mutex::new(rx)),
            handles: Vec::new(),
        };

        (handle, pool)
    }

    /// Enqueue a record for publication without blocking.
    ///
    /// A full channel is not an error: the record is written synchronously
    /// to the DLQ instead, because the caller's debit has already happened
    /// and the admitted send must be durable somewhere.
    pub async fn publish(&self, msg: KeyedMessage) -> Result<(), PublishError> {
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(msg)) => {
                warn!(
                    topic = %msg.topic,
                    key = %msg.key,
                    "producer channel full, spilling to dlq"
                );
                if let Err(e) = self.dlq.insert(&msg).await {
                    error!(
                        topic = %msg.topic,
                        key = %msg.key,
                        error = %e,
                        "dlq insert failed after channel overflow, record lost"
                    );
                }
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(PublishError::Closed),
        }
    }
}

/// Worker pool writing queued records to Kafka.
pub struct ProducerPool {
    kafka: FutureProducer,
    dlq: Arc<DlqStore>,
    cfg: ProducerConfig,
    rx: SharedReceiver,
    handles: Vec<JoinHandle<()>>,
}

impl ProducerPool {
    /// Spawn the workers. On cancellation each worker drains what is still
    /// queued through the normal retry-bounded path before exiting.
    pub fn start(&mut self, cancel: CancellationToken) {
        for worker in 0..self.cfg.workers {
            let kafka = self.kafka.clone();
            let dlq = self.dlq.clone();
            let cfg = self.cfg.clone();
            let rx = self.rx.clone();
            let cancel = cancel.clone();

            self.handles.push(tokio::spawn(async move {
                worker_loop(worker, kafka, dlq, cfg, rx, cancel).await;
            }));
        }

        info!(workers = self.cfg.workers, "accepted producer pool started");
    }

    /// Wait for every worker to finish its drain.
    pub async fn stop(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "producer worker panicked");
            }
        }
        info!("accepted producer pool stopped");
    }
}

async fn worker_loop(
    worker: usize,
    kafka: FutureProducer,
    dlq: Arc<DlqStore>,
    cfg: ProducerConfig,
    rx: SharedReceiver,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                // Drain the channel so admitted sends are not stranded.
                loop {
                    let next = { rx.lock().await.try_recv() };
                    match next {
                        Ok(msg) => publish_with_retry(worker, &kafka, &dlq, &cfg, msg).await,
                        Err(_) => break,
                    }
                }
                info!(worker, "producer worker stopped");
                return;
            }

            received = async { rx.lock().await.recv().await } => match received {
                Some(msg) => publish_with_retry(worker, &kafka, &dlq, &cfg, msg).await,
                None => {
                    info!(worker, "producer channel closed, worker exiting");
                    return;
                }
            },
        }
    }
}

/// Write one record with bounded retries; on exhaustion, record the attempt
/// count and spill to the DLQ.
async fn publish_with_retry(
    worker: usize,
    kafka: &FutureProducer,
    dlq: &DlqStore,
    cfg: &ProducerConfig,
    mut msg: KeyedMessage,
) {
    let write_timeout = Duration::from_millis(cfg.write_timeout_ms);

    for attempt in 1..=cfg.retries {
        let record = FutureRecord::to(&msg.topic)
            .key(&msg.key)
            .payload(&msg.payload);

        match kafka.send(record, Timeout::After(write_timeout)).await {
            Ok(_) => return,
            Err((e, _)) => {
                warn!(
                    worker,
                    attempt,
                    topic = %msg.topic,
                    key = %msg.key,
                    error = %e,
                    "accepted publish attempt failed"
                );
                if attempt < cfg.retries {
                    tokio::time::sleep(backoff_delay(cfg.retry_backoff_ms, attempt)).await;
                }
            }
        }
    }

    msg.attempts = cfg.retries as i32;
    if let Err(e) = dlq.insert(&msg).await {
        error!(
            worker,
            topic = %msg.topic,
            key = %msg.key,
            error = %e,
            "dlq insert failed after exhausted retries, record lost"
        );
    }
}

/// Linear backoff: base x attempt.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms * attempt as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_linear() {
        assert_eq!(backoff_delay(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(500, 3), Duration::from_millis(1500));
    }
}
