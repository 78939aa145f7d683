//! Balance cache and write-back reconciliation.
//!
//! The cache holds the authoritative in-flight balance per customer as an
//! INT64 counter under `balance:<customerID>`. Debits run server-side as a
//! compare-and-decrement script, so concurrent requests for one customer are
//! serialised by the cache in a single round trip. Every successful debit
//! queues a [`BalanceUpdate`]; the reconciler flushes those to the relational
//! store in batches. Billing is never rolled back on reconciliation failure.

mod reconciler;

pub use reconciler::Reconciler;

use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::BalanceConfig;
use crate::domain::BalanceUpdate;

/// Compare-and-decrement, serialised by the cache. Returns the new balance,
/// or -1 when the balance cannot cover the deduction. A missing key counts
/// as a zero balance.
const DEDUCT_SCRIPT: &str = r#"
local key = KEYS[1]
local deduction = tonumber(ARGV[1])
local balance = tonumber(redis.call('GET', key) or 0)

if balance >= deduction then
    redis.call('DECRBY', key, deduction)
    return balance - deduction
else
    return -1
end
"#;

/// Pipeline batch size for the startup cache load.
const BOOTSTRAP_BATCH: usize = 1_000;

#[derive(Debug, Error)]
pub enum BalanceError {
    /// Sentinel: the cached balance cannot cover one SMS. Never retried.
    #[error("insufficient balance")]
    InsufficientFunds,

    #[error("balance cache unavailable: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("balance write timed out")]
    Timeout,
}

/// Cache key for a customer's balance counter.
pub fn balance_key(customer_id: i64) -> String {
    format!("balance:{customer_id}")
}

/// Atomic debit against the cached balance plus deferred persistence.
pub struct BalanceService {
    redis: ConnectionManager,
    db: PgPool,
    cost: i64,
    deduct: redis::Script,
    pending: mpsc::Sender<BalanceUpdate>,
}

impl BalanceService {
    /// Create the service and its reconciler. The reconciler must be
    /// `start`ed for queued updates to reach the relational store.
    pub fn new(
        redis: ConnectionManager,
        db: PgPool,
        cfg: &BalanceConfig,
    ) -> (Arc<Self>, Reconciler) {
        let (tx, rx) = mpsc::channel(cfg.queue_size);

        let service = Arc::new(Self {
            redis: redis.clone(),
            db: db.clone(),
            cost: cfg.sms_cost,
            deduct: redis::Script::new(DEDUCT_SCRIPT),
            pending: tx,
        });

        let reconciler = Reconciler::new(redis, db, cfg.clone(), rx);

        (service, reconciler)
    }

    /// Load every customer balance from the relational store into the cache.
    ///
    /// After this returns, the cache is the source of truth for balances
    /// until shutdown. Returns the number of customers loaded.
    pub async fn initialize_cache(&self) -> Result<usize, BalanceError> {
        info!("initializing balance cache from database");

        let rows: Vec<(i64, i64)> =
            sqlx::query_as("SELECT customer_id, balance_bigint FROM balances")
                .fetch_all(&self.db)
                .await?;

        let mut conn = self.redis.clone();
        for chunk in rows.chunks(BOOTSTRAP_BATCH) {
            let mut pipe = redis::pipe();
            for (customer_id, balance) in chunk {
                pipe.set(balance_key(*customer_id), *balance).ignore();
            }
            pipe.query_async::<()>(&mut conn).await?;
        }

        info!(customers = rows.len(), "balance cache initialized");
        Ok(rows.len())
    }

    /// Atomically debit one SMS from the customer's cached balance and queue
    /// the reconciliation record. Returns the freshly assigned message ID.
    ///
    /// If the reconciliation channel is full, the update is written in its
    /// own small transaction off the request path instead of blocking.
    pub async fn debit_and_queue(
        &self,
        customer_id: i64,
        message: &str,
        to: &str,
    ) -> Result<Uuid, BalanceError> {
        let key = balance_key(customer_id);
        let mut conn = self.redis.clone();

        let new_balance: i64 = self
            .deduct
            .key(&key)
            .arg(self.cost)
            .invoke_async(&mut conn)
            .await?;

        if new_balance < 0 {
            return Err(BalanceError::InsufficientFunds);
        }

        let update = BalanceUpdate {
            message_id: Uuid::new_v4(),
            customer_id,
            to_number: to.to_string(),
            body: message.to_string(),
            created_at: chrono::Utc::now(),
        };
        let message_id = update.message_id;

        match self.pending.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(update)) => {
                warn!(
                    customer_id,
                    "reconciliation queue full, writing update inline"
                );
                let db = self.db.clone();
                let redis = self.redis.clone();
                tokio::spawn(async move {
                    if let Err(e) = reconciler::write_single(&db, redis, &update).await {
                        error!(
                            customer_id = update.customer_id,
                            message_id = %update.message_id,
                            error = %e,
                            "inline balance write failed"
                        );
                    }
                });
            }
            Err(TrySendError::Closed(update)) => {
                // Shutdown race: the debit stands, so record it loudly.
                error!(
                    customer_id = update.customer_id,
                    message_id = %update.message_id,
                    "reconciliation channel closed, update lost"
                );
            }
        }

        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_key_format() {
        assert_eq!(balance_key(42), "balance:42");
        assert_eq!(balance_key(0), "balance:0");
    }

    #[test]
    fn test_insufficient_funds_message() {
        // The HTTP layer surfaces this text verbatim in the 402 body.
        let err = BalanceError::InsufficientFunds;
        assert_eq!(err.to_string(), "insufficient balance");
    }

    #[test]
    fn test_deduct_script_shape() {
        // The script must decrement and return the new balance, or return
        // the -1 sentinel without touching the key.
        assert!(DEDUCT_SCRIPT.contains("DECRBY"));
        assert!(DEDUCT_SCRIPT.contains("return -1"));
    }
}
