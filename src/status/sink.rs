//! Publish side of the status topic.
//!
//! Status events are an audit artefact, not the critical path: publishers
//! log failures and move on. The in-memory sink exists for tests and local
//! debugging, mirroring the Kafka sink's contract.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use thiserror::Error;
use tracing::debug;

use crate::domain::StatusEvent;

#[derive(Debug, Error)]
pub enum StatusPublishError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("kafka error: {0}")]
    Kafka(String),
}

/// Destination for lifecycle status events, keyed by job ID.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, event: &StatusEvent) -> Result<(), StatusPublishError>;
}

/// Kafka-backed sink writing to the status topic.
pub struct KafkaStatusSink {
    producer: FutureProducer,
    topic: String,
    write_timeout: Duration,
}

impl KafkaStatusSink {
    pub fn new(producer: FutureProducer, topic: &str, write_timeout: Duration) -> Self {
        Self {
            producer,
            topic: topic.to_string(),
            write_timeout,
        }
    }
}

#[async_trait]
impl StatusSink for KafkaStatusSink {
    async fn publish(&self, event: &StatusEvent) -> Result<(), StatusPublishError> {
        let payload = serde_json::to_vec(event)?;

        let record = FutureRecord::to(&self.topic)
            .key(&event.id)
            .payload(&payload);

        self.producer
            .send(record, Timeout::After(self.write_timeout))
            .await
            .map_err(|(e, _)| StatusPublishError::Kafka(e.to_string()))?;

        debug!(
            job_id = %event.id,
            status = %event.status,
            "status event published"
        );

        Ok(())
    }
}

/// In-memory sink recording every published event.
#[derive(Default)]
pub struct MemoryStatusSink {
    events: RwLock<Vec<StatusEvent>>,
}

impl MemoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far, in publish order.
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.read().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.read().unwrap().len()
    }
}

#[async_trait]
impl StatusSink for MemoryStatusSink {
    async fn publish(&self, event: &StatusEvent) -> Result<(), StatusPublishError> {
        self.events.write().unwrap().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, StatusKind};
    use chrono::Utc;
    use uuid::Uuid;

    fn test_job() -> Job {
        Job {
            id: Uuid::new_v4(),
            customer_id: 3,
            phone: "+12025550100".to_string(),
            message: "Hi".to_string(),
            priority: 1,
            created_at: Utc::now(),
            attempts: 0,
        }
    }

    #[tokio::test]
    async fn test_memory_sink_records_in_order() {
        let sink = MemoryStatusSink::new();
        let job = test_job();

        sink.publish(&StatusEvent::processing(&job)).await.unwrap();
        sink.publish(&StatusEvent::success(&job)).await.unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, StatusKind::Processing);
        assert_eq!(events[1].status, StatusKind::Success);
        assert_eq!(events[0].id, job.id.to_string());
    }
}
