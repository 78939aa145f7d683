//! Accepted-topic consumer.
//!
//! Parallel readers share one consumer group on the accepted topic. Each
//! record becomes a [`Job`] with a fresh ID, gets a best-effort `processing`
//! status event, and is handed to the fair scheduler keyed by customer ID.
//! Undecodable records are poisoned: logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::KafkaConfig;
use crate::domain::{AcceptedMessage, Job, StatusEvent};
use crate::infra;
use crate::scheduler::FairScheduler;
use crate::status::StatusSink;

/// Pause after a read error before polling the topic again.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Running reader tasks on the accepted topic.
pub struct AcceptedConsumer {
    handles: Vec<JoinHandle<()>>,
}

impl AcceptedConsumer {
    /// Spawn `readers` consumer tasks, one Kafka consumer each, all in the
    /// accepted consumer group.
    pub fn start(
        kafka_cfg: &KafkaConfig,
        readers: usize,
        scheduler: Arc<FairScheduler>,
        status: Arc<dyn StatusSink>,
        cancel: CancellationToken,
    ) -> Result<Self, KafkaError> {
        let mut handles = Vec::with_capacity(readers);

        for reader in 0..readers {
            let consumer = infra::new_consumer(
                kafka_cfg,
                &kafka_cfg.accepted_topic,
                &kafka_cfg.accepted_group,
            )?;
            let scheduler = scheduler.clone();
            let status = status.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                reader_loop(reader, consumer, scheduler, status, cancel).await;
            }));
        }

        info!(readers, "accepted consumer started");

        Ok(Self { handles })
    }

    pub async fn stop(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "accepted reader panicked");
            }
        }
        info!("accepted consumer stopped");
    }
}

async fn reader_loop(
    reader: usize,
    consumer: rdkafka::consumer::StreamConsumer,
    scheduler: Arc<FairScheduler>,
    status: Arc<dyn StatusSink>,
    cancel: CancellationToken,
) {
    info!(reader, "accepted reader started");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            result = consumer.recv() => match result {
                Err(e) => {
                    warn!(reader, error = %e, "accepted read error");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(READ_ERROR_BACKOFF) => {}
                    }
                }
                Ok(message) => {
                    let Some(payload) = message.payload() else {
                        continue;
                    };

                    let accepted = match serde_json::from_slice::<AcceptedMessage>(payload) {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            // Poisoned record: log and skip.
                            warn!(reader, error = %e, "undecodable accepted record dropped");
                            continue;
                        }
                    };

                    let job = Job::from_accepted(&accepted);

                    // Audit only: a failed publish must not block the job.
                    if let Err(e) = status.publish(&StatusEvent::processing(&job)).await {
                        warn!(
                            reader,
                            job_id = %job.id,
                            error = %e,
                            "processing status publish failed"
                        );
                    }

                    scheduler.enqueue(job.customer_id, job);
                }
            },
        }
    }

    info!(reader, "accepted reader stopped");
}
