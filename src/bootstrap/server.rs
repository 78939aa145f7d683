//! The `server` command: HTTP ingress, balance service, accepted producer,
//! plan cache.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::api::{self, ApiState, IdempotencyGuard};
use crate::balance::BalanceService;
use crate::config::Config;
use crate::dlq::DlqStore;
use crate::infra;
use crate::plans::PlanCache;
use crate::producer::AcceptedProducer;
use crate::status::AnalyticsStore;

use super::shutdown_token;

pub async fn run(config: Config) -> Result<()> {
    let cancel = shutdown_token();

    let db = infra::connect_postgres(&config.postgres)
        .await
        .context("failed to connect to postgres")?;
    let redis = infra::connect_redis(&config.redis)
        .await
        .context("failed to connect to redis")?;
    let clickhouse = infra::new_clickhouse(&config.clickhouse);
    let kafka = infra::new_producer(&config.kafka).context("failed to create kafka producer")?;

    let dlq = Arc::new(DlqStore::new(db.clone()));

    let (balance, mut reconciler) =
        BalanceService::new(redis.clone(), db.clone(), &config.balance);
    balance
        .initialize_cache()
        .await
        .context("failed to initialize balance cache")?;
    reconciler.start(cancel.clone());

    let plans = PlanCache::bootstrap(&db, &redis, &config.plans)
        .await
        .context("failed to bootstrap plan cache")?;
    let refresher = plans.spawn_refresher(db.clone(), redis.clone(), &config.plans, cancel.clone());

    let (producer, mut producer_pool) = AcceptedProducer::new(kafka, dlq, &config.producer);
    producer_pool.start(cancel.clone());

    let analytics = Arc::new(AnalyticsStore::new(clickhouse));

    let idempotency = if config.http.idempotency_enabled {
        IdempotencyGuard::new(
            redis.clone(),
            Duration::from_secs(config.http.idempotency_ttl_secs),
        )
    } else {
        IdempotencyGuard::disabled()
    };

    let state = ApiState {
        plans,
        balance,
        producer,
        analytics,
        idempotency: Arc::new(idempotency),
        accepted_topic: config.kafka.accepted_topic.clone(),
    };

    let served = api::serve(state, config.http.port, cancel.clone()).await;

    // Stop accepting work, then drain: producer channel through the bounded
    // retry path, reconciliation channel fully.
    cancel.cancel();
    info!("draining pipelines");
    producer_pool.stop().await;
    reconciler.stop().await;
    let _ = refresher.await;

    served?;
    info!("server shut down cleanly");
    Ok(())
}
