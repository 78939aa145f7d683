//! Batched write-back of balance updates to the relational store.
//!
//! A pool of writers drains the reconciliation channel. Each writer keeps a
//! local batch and flushes on the first of: batch full, timer tick, shutdown.
//! A flush is one transaction: bulk-insert the per-message log rows, then
//! resync each touched customer's relational balance to the cached value.
//! A failed flush is logged and dropped; the cache stays authoritative and
//! the next flush for the same customer converges the stored balance.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::BalanceConfig;
use crate::domain::BalanceUpdate;

use super::{balance_key, BalanceError};

/// Rows per INSERT statement inside a flush transaction.
const INSERT_CHUNK: usize = 500;

/// Timeout for the inline single-update fallback transaction.
const SINGLE_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

type SharedReceiver = Arc<Mutex<mpsc::Receiver<BalanceUpdate>>>;

/// Writer pool draining the reconciliation channel.
pub struct Reconciler {
    redis: ConnectionManager,
    db: PgPool,
    cfg: BalanceConfig,
    rx: SharedReceiver,
    handles: Vec<JoinHandle<()>>,
}

impl Reconciler {
    pub(super) fn new(
        redis: ConnectionManager,
        db: PgPool,
        cfg: BalanceConfig,
        rx: mpsc::Receiver<BalanceUpdate>,
    ) -> Self {
        Self {
            redis,
            db,
            cfg,
            rx: Arc::new(Mutex::new(rx)),
            handles: Vec::new(),
        }
    }

    /// Spawn the writer pool. Writers run until `cancel` fires, then drain
    /// the channel completely and flush their residual batches.
    pub fn start(&mut self, cancel: CancellationToken) {
        for worker in 0..self.cfg.writers {
            let writer = Writer {
                worker,
                redis: self.redis.clone(),
                db: self.db.clone(),
                cfg: self.cfg.clone(),
                rx: self.rx.clone(),
            };
            let cancel = cancel.clone();
            self.handles.push(tokio::spawn(writer.run(cancel)));
        }

        info!(writers = self.cfg.writers, "balance writer pool started");
    }

    /// Wait for every writer to finish its shutdown drain.
    pub async fn stop(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "balance writer panicked");
            }
        }
        info!("balance writer pool stopped");
    }
}

struct Writer {
    worker: usize,
    redis: ConnectionManager,
    db: PgPool,
    cfg: BalanceConfig,
    rx: SharedReceiver,
}

impl Writer {
    async fn run(self, cancel: CancellationToken) {
        let mut batch: Vec<BalanceUpdate> = Vec::with_capacity(self.cfg.batch_size);
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.cfg.flush_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(worker = self.worker, "balance writer started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.drain(&mut batch).await;
                    info!(worker = self.worker, "balance writer stopped");
                    return;
                }

                received = Self::recv(&self.rx) => match received {
                    Some(update) => {
                        batch.push(update);
                        if batch.len() >= self.cfg.batch_size {
                            self.flush(&mut batch).await;
                        }
                    }
                    None => {
                        self.flush(&mut batch).await;
                        info!(worker = self.worker, "balance channel closed, writer exiting");
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

    /// Receive one update; the lock is held only for the duration of the
    /// recv so writers take turns pulling from the shared channel.
    async fn recv(rx: &SharedReceiver) -> Option<BalanceUpdate> {
        rx.lock().await.recv().await
    }

    /// Shutdown path: pull everything still queued, flushing full batches as
    /// they fill, then flush the remainder.
    async fn drain(&self, batch: &mut Vec<BalanceUpdate>) {
        info!(worker = self.worker, "flushing remaining balance updates");

        loop {
            let next = { self.rx.lock().await.try_recv() };
            match next {
                Ok(update) => {
                    batch.push(update);
                    if batch.len() >= self.cfg.batch_size {
                        self.flush(batch).await;
                    }
                }
                Err(_) => break,
            }
        }

        self.flush(batch).await;
    }

    async fn flush(&self, batch: &mut Vec<BalanceUpdate>) {
        if batch.is_empty() {
            return;
        }

        let started = Instant::now();
        let timeout = Duration::from_millis(self.cfg.flush_timeout_ms);

        match tokio::time::timeout(timeout, self.write_batch(batch)).await {
            Ok(Ok(())) => {
                info!(
                    worker = self.worker,
                    records = batch.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "balance batch flushed"
                );
            }
            Ok(Err(e)) => {
                error!(
                    worker = self.worker,
                    records = batch.len(),
                    error = %e,
                    "balance batch write failed, batch dropped"
                );
            }
            Err(_) => {
                error!(
                    worker = self.worker,
                    records = batch.len(),
                    "balance batch flush timed out, batch dropped"
                );
            }
        }

        batch.clear();
    }

    async fn write_batch(&self, batch: &[BalanceUpdate]) -> Result<(), BalanceError> {
        let mut tx = self.db.begin().await?;

        for chunk in batch.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO sms_logs (message_id, customer_id, to_number, body, created_at) ",
            );
            qb.push_values(chunk, |mut row, update| {
                row.push_bind(update.message_id)
                    .push_bind(update.customer_id)
                    .push_bind(&update.to_number)
                    .push_bind(&update.body)
                    .push_bind(update.created_at);
            });
            qb.build().execute(&mut *tx).await?;
        }

        // The cached counter is the source of truth; copy it into the
        // relational store for each customer touched by this batch.
        let mut conn = self.redis.clone();
        for customer_id in distinct_customers(batch) {
            let cached: i64 = match conn.get(balance_key(customer_id)).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        customer_id,
                        error = %e,
                        "cache read failed, skipping balance sync for customer"
                    );
                    continue;
                }
            };

            sqlx::query("UPDATE balances SET balance_bigint = $1 WHERE customer_id = $2")
                .bind(cached)
                .bind(customer_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// The customers touched by a batch, each synced once per flush.
fn distinct_customers(batch: &[BalanceUpdate]) -> HashSet<i64> {
    batch.iter().map(|update| update.customer_id).collect()
}

/// Fallback for a saturated channel: persist one update in its own short
/// transaction. Runs off the request path.
pub(super) async fn write_single(
    db: &PgPool,
    redis: ConnectionManager,
    update: &BalanceUpdate,
) -> Result<(), BalanceError> {
    let work = async {
        let mut tx = db.begin().await?;

        sqlx::query(
            "INSERT INTO sms_logs (message_id, customer_id, to_number, body, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(update.message_id)
        .bind(update.customer_id)
        .bind(&update.to_number)
        .bind(&update.body)
        .bind(update.created_at)
        .execute(&mut *tx)
        .await?;

        let mut conn = redis;
        let cached: i64 = conn.get(balance_key(update.customer_id)).await?;

        sqlx::query("UPDATE balances SET balance_bigint = $1 WHERE customer_id = $2")
            .bind(cached)
            .bind(update.customer_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok::<(), BalanceError>(())
    };

    tokio::time::timeout(SINGLE_WRITE_TIMEOUT, work)
        .await
        .map_err(|_| BalanceError::Timeout)?
}
