//! Core domain types shared across the pipeline.
//!
//! The serialized forms of [`AcceptedMessage`] and [`StatusEvent`] are wire
//! contracts on the `sms.accepted` and `sms.status` topics. Field names are
//! part of the contract and must not change without coordinating both ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A send request admitted into the pipeline, as published on the accepted
/// topic. Partition key is the decimal customer ID, which gives per-customer
/// ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedMessage {
    pub message_id: Uuid,
    pub customer_id: i64,
    pub priority: i32,
    pub to: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl AcceptedMessage {
    pub fn new(
        message_id: Uuid,
        customer_id: i64,
        priority: i32,
        to: &str,
        message: &str,
    ) -> Self {
        Self {
            message_id,
            customer_id,
            priority,
            to: to.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// The scheduler's unit of work, derived 1:1 from an accepted message on
/// consumption. `attempts` counts provider dispatches; the worker pool stops
/// retrying once it reaches the configured maximum.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub customer_id: i64,
    pub phone: String,
    pub message: String,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
}

impl Job {
    /// Build a job from a consumed accepted message with a fresh job ID.
    pub fn from_accepted(accepted: &AcceptedMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id: accepted.customer_id,
            phone: accepted.to.clone(),
            message: accepted.message.clone(),
            priority: accepted.priority,
            created_at: Utc::now(),
            attempts: 0,
        }
    }
}

/// Lifecycle point of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Processing,
    Success,
    Failed,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Processing => "processing",
            StatusKind::Success => "success",
            StatusKind::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record on the status topic. Keyed by job ID; duplicates for the
/// same (job ID, status) are permitted by the at-least-once pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "CustomerID")]
    pub customer_id: i64,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Priority")]
    pub priority: i32,
    #[serde(rename = "status")]
    pub status: StatusKind,
    #[serde(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
}

impl StatusEvent {
    fn for_job(job: &Job, status: StatusKind) -> Self {
        Self {
            id: job.id.to_string(),
            customer_id: job.customer_id,
            phone: job.phone.clone(),
            message: job.message.clone(),
            priority: job.priority,
            status,
            created_at: job.created_at,
        }
    }

    pub fn processing(job: &Job) -> Self {
        Self::for_job(job, StatusKind::Processing)
    }

    pub fn success(job: &Job) -> Self {
        Self::for_job(job, StatusKind::Success)
    }

    pub fn failed(job: &Job) -> Self {
        Self::for_job(job, StatusKind::Failed)
    }
}

/// An in-flight reconciliation record pending flush to the relational store.
#[derive(Debug, Clone)]
pub struct BalanceUpdate {
    pub message_id: Uuid,
    pub customer_id: i64,
    pub to_number: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A raw record destined for an event-log topic, carrying everything the DLQ
/// needs if publication fails.
#[derive(Debug, Clone)]
pub struct KeyedMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub attempts: i32,
    pub priority: i32,
}

impl KeyedMessage {
    /// Wrap an accepted message for the accepted topic, keyed by customer ID.
    pub fn accepted(topic: &str, accepted: &AcceptedMessage) -> serde_json::Result<Self> {
        Ok(Self {
            topic: topic.to_string(),
            key: accepted.customer_id.to_string(),
            payload: serde_json::to_vec(accepted)?,
            attempts: 0,
            priority: accepted.priority,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job {
            id: Uuid::new_v4(),
            customer_id: 42,
            phone: "+12025550100".to_string(),
            message: "Hi".to_string(),
            priority: 1,
            created_at: Utc::now(),
            attempts: 0,
        }
    }

    #[test]
    fn test_accepted_wire_shape() {
        let accepted = AcceptedMessage::new(Uuid::new_v4(), 42, 1, "+12025550100", "Hi");
        let value: serde_json::Value =
            serde_json::from_slice(&serde_json::to_vec(&accepted).unwrap()).unwrap();

        for field in ["message_id", "customer_id", "priority", "to", "message", "created_at"] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(value["customer_id"], 42);
        assert_eq!(value["to"], "+12025550100");
    }

    #[test]
    fn test_status_wire_shape() {
        let event = StatusEvent::processing(&sample_job());
        let value: serde_json::Value =
            serde_json::from_slice(&serde_json::to_vec(&event).unwrap()).unwrap();

        for field in ["ID", "CustomerID", "Phone", "Message", "Priority", "status", "CreatedAt"] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(value["status"], "processing");
    }

    #[test]
    fn test_status_round_trips() {
        let event = StatusEvent::failed(&sample_job());
        let bytes = serde_json::to_vec(&event).unwrap();
        let back: StatusEvent = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(back.id, event.id);
        assert_eq!(back.status, StatusKind::Failed);
    }

    #[test]
    fn test_job_from_accepted() {
        let accepted = AcceptedMessage::new(Uuid::new_v4(), 7, 2, "+15550001111", "hello");
        let job = Job::from_accepted(&accepted);

        assert_eq!(job.customer_id, 7);
        assert_eq!(job.phone, "+15550001111");
        assert_eq!(job.priority, 2);
        assert_eq!(job.attempts, 0);
        assert_ne!(job.id, accepted.message_id);
    }

    #[test]
    fn test_accepted_keyed_by_customer() {
        let accepted = AcceptedMessage::new(Uuid::new_v4(), 1001, 0, "+1", "x");
        let km = KeyedMessage::accepted("sms.accepted", &accepted).unwrap();

        assert_eq!(km.key, "1001");
        assert_eq!(km.topic, "sms.accepted");
        assert_eq!(km.attempts, 0);
    }
}
