//! Status pipeline: both ends of the status topic.
//!
//! The publish side ([`StatusSink`]) is used by the accepted consumer and
//! the dispatch workers. The ingest side ([`StatusPipeline`]) runs parallel
//! readers on the topic, funnels decoded events into a bounded channel, and
//! batch-inserts them into the analytics store on size or time triggers.

mod sink;
mod store;

pub use sink::{KafkaStatusSink, MemoryStatusSink, StatusPublishError, StatusSink};
pub use store::{AnalyticsStore, StatusRow};

use std::sync::Arc;
use std::time::Duration;

use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{KafkaConfig, StatusConfig};
use crate::domain::StatusEvent;
use crate::infra;

/// Pause after a read error before polling the topic again.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Running reader and writer tasks for the status topic.
pub struct StatusPipeline {
    handles: Vec<JoinHandle<()>>,
}

impl StatusPipeline {
    /// Spawn the reader and writer pools. Readers stop on cancellation;
    /// writers then flush their residual batches and exit.
    pub fn start(
        kafka_cfg: &KafkaConfig,
        cfg: &StatusConfig,
        store: Arc<AnalyticsStore>,
        cancel: CancellationToken,
    ) -> Result<Self, KafkaError> {
        let (tx, rx) = mpsc::channel::<StatusEvent>(cfg.channel_size);
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::new();

        for reader in 0..cfg.readers {
            let consumer =
                infra::new_consumer(kafka_cfg, &kafka_cfg.status_topic, &kafka_cfg.status_group)?;
            let tx = tx.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                reader_loop(reader, consumer, tx, cancel).await;
            }));
        }
        // Writers observe a closed channel once the readers are gone.
        drop(tx);

        for writer in 0..cfg.writers {
            let writer_task = Writer {
                writer,
                store: store.clone(),
                cfg: cfg.clone(),
                rx: rx.clone(),
            };
            let cancel = cancel.clone();
            handles.push(tokio::spawn(writer_task.run(cancel)));
        }

        info!(
            readers = cfg.readers,
            writers = cfg.writers,
            "status pipeline started"
        );

        Ok(Self { handles })
    }

    pub async fn stop(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "status pipeline task panicked");
            }
        }
        info!("status pipeline stopped");
    }
}

async fn reader_loop(
    reader: usize,
    consumer: rdkafka::consumer::StreamConsumer,
    tx: mpsc::Sender<StatusEvent>,
    cancel: CancellationToken,
) {
    info!(reader, "status reader started");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            result = consumer.recv() => match result {
                Err(e) => {
                    warn!(reader, error = %e, "status read error");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(READ_ERROR_BACKOFF) => {}
                    }
                }
                Ok(message) => {
                    let Some(payload) = message.payload() else {
                        continue;
                    };

                    match serde_json::from_slice::<StatusEvent>(payload) {
                        Err(e) => {
                            // Poisoned record: log and skip.
                            warn!(reader, error = %e, "undecodable status event dropped");
                        }
                        Ok(event) => {
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                result = tx.send(event) => {
                                    if result.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            },
        }
    }

    info!(reader, "status reader stopped");
}

struct Writer {
    writer: usize,
    store: Arc<AnalyticsStore>,
    cfg: StatusConfig,
    rx: Arc<Mutex<mpsc::Receiver<StatusEvent>>>,
}

impl Writer {
    async fn run(self, cancel: CancellationToken) {
        let mut batch: Vec<StatusRow> = Vec::with_capacity(self.cfg.batch_size);
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.cfg.flush_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(writer = self.writer, "status writer started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.flush(&mut batch).await;
                    info!(writer = self.writer, "status writer stopped");
                    return;
                }

                received = Self::recv(&self.rx) => match received {
                    Some(event) => {
                        batch.push(StatusRow::from_event(&event));
                        if batch.len() >= self.cfg.batch_size {
                            self.flush(&mut batch).await;
                        }
                    }
                    None => {
                        self.flush(&mut batch).await;
                        info!(writer = self.writer, "status channel closed, writer exiting");
                        return;
                    }
                },

                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await;
                    }
                }
            }
        }
    }

    async fn recv(rx: &Arc<Mutex<mpsc::Receiver<StatusEvent>>>) -> Option<StatusEvent> {
        rx.lock().await.recv().await
    }

    async fn flush(&self, batch: &mut Vec<StatusRow>) {
        if batch.is_empty() {
            return;
        }

        let timeout = Duration::from_millis(self.cfg.insert_timeout_ms);

        match tokio::time::timeout(timeout, self.store.insert_batch(batch)).await {
            Ok(Ok(())) => {
                info!(
                    writer = self.writer,
                    records = batch.len(),
                    "status batch inserted"
                );
            }
            Ok(Err(e)) => {
                error!(
                    writer = self.writer,
                    records = batch.len(),
                    error = %e,
                    "status batch insert failed, batch dropped"
                );
            }
            Err(_) => {
                error!(
                    writer = self.writer,
                    records = batch.len(),
                    "status batch insert timed out, batch dropped"
                );
            }
        }

        batch.clear();
    }
}
