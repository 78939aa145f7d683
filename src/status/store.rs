//! Analytics store over ClickHouse.
//!
//! `sms_status_log` is the immutable audit trail. The primary dimension is
//! the job ID; duplicate rows for the same (job ID, status) are acceptable
//! under the pipeline's at-least-once semantics.

use chrono::{DateTime, Utc};
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};

use crate::domain::StatusEvent;

/// One row of the audit trail. `created_at` is the event's origin time;
/// `timestamp` is when the row was written.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct StatusRow {
    pub id: String,
    pub customer_id: i64,
    pub phone: String,
    pub message: String,
    pub status: String,
    pub priority: i32,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub timestamp: DateTime<Utc>,
}

impl StatusRow {
    /// Stamp an ingested event with the write time.
    pub fn from_event(event: &StatusEvent) -> Self {
        Self {
            id: event.id.clone(),
            customer_id: event.customer_id,
            phone: event.phone.clone(),
            message: event.message.clone(),
            status: event.status.as_str().to_string(),
            priority: event.priority,
            created_at: event.created_at,
            timestamp: Utc::now(),
        }
    }
}

/// Query and ingest interface over the audit table.
#[derive(Clone)]
pub struct AnalyticsStore {
    client: Client,
}

impl AnalyticsStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Bulk-insert a batch of status rows.
    pub async fn insert_batch(&self, rows: &[StatusRow]) -> Result<(), clickhouse::error::Error> {
        let mut insert = self.client.insert("sms_status_log")?;
        for row in rows {
            insert.write(row).await?;
        }
        insert.end().await
    }

    /// Page through a customer's status rows, newest first. Returns the rows
    /// and the customer's total row count.
    pub async fn list_by_customer(
        &self,
        customer_id: i64,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<StatusRow>, u64), clickhouse::error::Error> {
        let total: u64 = self
            .client
            .query("SELECT count() FROM sms_status_log WHERE customer_id = ?")
            .bind(customer_id)
            .fetch_one()
            .await?;

        let rows = self
            .client
            .query(
                "SELECT ?fields FROM sms_status_log WHERE customer_id = ? \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(customer_id)
            .bind(limit)
            .bind(offset)
            .fetch_all::<StatusRow>()
            .await?;

        Ok((rows, total))
    }

    /// Full status timeline of one message, newest first.
    pub async fn timeline(
        &self,
        message_id: &str,
    ) -> Result<Vec<StatusRow>, clickhouse::error::Error> {
        self.client
            .query("SELECT ?fields FROM sms_status_log WHERE id = ? ORDER BY created_at DESC")
            .bind(message_id)
            .fetch_all::<StatusRow>()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, StatusKind};
    use uuid::Uuid;

    #[test]
    fn test_row_from_event() {
        let job = Job {
            id: Uuid::new_v4(),
            customer_id: 42,
            phone: "+12025550100".to_string(),
            message: "Hi".to_string(),
            priority: 1,
            created_at: Utc::now(),
            attempts: 0,
        };
        let event = StatusEvent::success(&job);
        let row = StatusRow::from_event(&event);

        assert_eq!(row.id, job.id.to_string());
        assert_eq!(row.customer_id, 42);
        assert_eq!(row.status, "success");
        assert_eq!(row.created_at, event.created_at);
        assert!(row.timestamp >= row.created_at);
        assert_eq!(event.status, StatusKind::Success);
    }
}
