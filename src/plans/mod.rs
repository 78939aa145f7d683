//! Plan/priority cache.
//!
//! The {API key → priority} mapping is published to the shared cache as JSON
//! at boot and held in memory behind a reader-preferring lock. A background
//! ticker re-reads the cached JSON and compares checksums; on mismatch (or a
//! missing key) the snapshot is rebuilt from the relational store and the
//! cache rewritten. The cache owns its ticker; there is no process-wide
//! mutable state.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::PlanConfig;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

struct Snapshot {
    priorities: BTreeMap<String, i32>,
    checksum: [u8; 32],
}

/// Eventually consistent view of plan priorities, refreshed on a ticker.
pub struct PlanCache {
    snapshot: RwLock<Snapshot>,
    cache_key: String,
}

impl PlanCache {
    /// Fetch all plans, publish the serialized snapshot to the shared cache,
    /// and return the in-memory view.
    pub async fn bootstrap(
        db: &PgPool,
        redis: &ConnectionManager,
        cfg: &PlanConfig,
    ) -> Result<Arc<Self>, PlanError> {
        let priorities = fetch_plans(db).await?;
        let (json, checksum) = serialize_snapshot(&priorities)?;

        let mut conn = redis.clone();
        conn.set::<_, _, ()>(&cfg.cache_key, json).await?;

        info!(plans = priorities.len(), key = %cfg.cache_key, "plan snapshot published");

        Ok(Arc::new(Self {
            snapshot: RwLock::new(Snapshot {
                priorities,
                checksum,
            }),
            cache_key: cfg.cache_key.clone(),
        }))
    }

    /// Look up the priority for an API key. `None` means the key is unknown
    /// as of the last successful refresh; callers reject the request.
    pub fn priority(&self, api_key: &str) -> Option<i32> {
        self.snapshot.read().unwrap().priorities.get(api_key).copied()
    }

    /// Checksum over the serialized snapshot.
    pub fn checksum(&self) -> [u8; 32] {
        self.snapshot.read().unwrap().checksum
    }

    /// Spawn the background refresher. Runs until cancellation; refresh
    /// errors are logged and the stale snapshot stays in service.
    pub fn spawn_refresher(
        self: &Arc<Self>,
        db: PgPool,
        redis: ConnectionManager,
        cfg: &PlanConfig,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        let interval = Duration::from_secs(cfg.refresh_interval_secs);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The bootstrap already published a fresh snapshot.
            ticker.tick().await;

            info!(interval_secs = interval.as_secs(), "plan refresher started");

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        info!("plan refresher stopped");
                        return;
                    }

                    _ = ticker.tick() => {
                        match cache.refresh(&db, &redis).await {
                            Ok(true) => info!("plan snapshot refreshed"),
                            Ok(false) => {}
                            Err(e) => warn!(error = %e, "plan refresh failed, keeping snapshot"),
                        }
                    }
                }
            }
        })
    }

    /// Compare the cached JSON's checksum to ours; rebuild from the
    /// relational store when they diverge or the key is gone. Returns
    /// whether the snapshot changed.
    async fn refresh(
        &self,
        db: &PgPool,
        redis: &ConnectionManager,
    ) -> Result<bool, PlanError> {
        let mut conn = redis.clone();
        let cached: Option<String> = conn.get(&self.cache_key).await?;

        let unchanged = cached
            .map(|json| digest(json.as_bytes()) == self.checksum())
            .unwrap_or(false);
        if unchanged {
            return Ok(false);
        }

        let priorities = fetch_plans(db).await?;
        let (json, checksum) = serialize_snapshot(&priorities)?;
        conn.set::<_, _, ()>(&self.cache_key, json).await?;

        let mut snapshot = self.snapshot.write().unwrap();
        snapshot.priorities = priorities;
        snapshot.checksum = checksum;

        Ok(true)
    }

    #[cfg(test)]
    fn with_priorities(priorities: BTreeMap<String, i32>) -> Self {
        let (_, checksum) = serialize_snapshot(&priorities).unwrap();
        Self {
            snapshot: RwLock::new(Snapshot {
                priorities,
                checksum,
            }),
            cache_key: "test:plans".to_string(),
        }
    }
}

async fn fetch_plans(db: &PgPool) -> Result<BTreeMap<String, i32>, sqlx::Error> {
    let rows: Vec<(String, i32)> = sqlx::query_as("SELECT api_key, priority FROM plans")
        .fetch_all(db)
        .await?;

    Ok(rows.into_iter().collect())
}

/// Serialize the mapping and compute its checksum. The ordered map keeps the
/// serialization (and therefore the checksum) stable across processes.
fn serialize_snapshot(
    priorities: &BTreeMap<String, i32>,
) -> Result<(String, [u8; 32]), serde_json::Error> {
    let json = serde_json::to_string(priorities)?;
    let checksum = digest(json.as_bytes());
    Ok((json, checksum))
}

fn digest(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}
