//! Dead-letter persistence for events that could not be published.
//!
//! Append-only: rows land in `kafka_dlq` when the accepted producer exhausts
//! its retries or a bounded channel overflows. Replay is an out-of-band
//! operational concern; no reader lives in this crate.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

use crate::domain::KeyedMessage;

/// Statement timeout for the insert. The DLQ sits on the request path's
/// overflow branch, so it must stay short.
const INSERT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum DlqError {
    #[error("dlq insert timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Append-only store over the `kafka_dlq` table.
#[derive(Clone)]
pub struct DlqStore {
    db: PgPool,
}

impl DlqStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Persist an unpublishable record with its attempt count.
    pub async fn insert(&self, msg: &KeyedMessage) -> Result<(), DlqError> {
        let query = sqlx::query(
            "INSERT INTO kafka_dlq (topic, key, payload, attempt_count, priority, last_attempt_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&msg.topic)
        .bind(&msg.key)
        .bind(&msg.payload)
        .bind(msg.attempts)
        .bind(msg.priority)
        .bind(Utc::now());

        tokio::time::timeout(INSERT_TIMEOUT, query.execute(&self.db))
            .await
            .map_err(|_| DlqError::Timeout)??;

        debug!(
            topic = %msg.topic,
            key = %msg.key,
            attempts = msg.attempts,
            "record spilled to dlq"
        );

        Ok(())
    }
}
