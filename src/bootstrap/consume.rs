//! The `consume` command: accepted-topic consumers, fair scheduler, dispatch
//! worker pool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::consumer::AcceptedConsumer;
use crate::dispatch::{SmsProvider, StubProvider, WorkerPool};
use crate::infra;
use crate::scheduler::FairScheduler;
use crate::status::{KafkaStatusSink, StatusSink};

use super::shutdown_token;

pub async fn run(config: Config) -> Result<()> {
    let cancel = shutdown_token();

    let kafka = infra::new_producer(&config.kafka).context("failed to create kafka producer")?;
    let status: Arc<dyn StatusSink> = Arc::new(KafkaStatusSink::new(
        kafka,
        &config.kafka.status_topic,
        Duration::from_millis(config.producer.write_timeout_ms),
    ));

    let scheduler = Arc::new(FairScheduler::new());
    let provider: Arc<dyn SmsProvider> = Arc::new(StubProvider::new(&config.provider));

    let mut pool = WorkerPool::new(
        scheduler.clone(),
        provider,
        status.clone(),
        config.dispatch.clone(),
    );
    pool.start(cancel.clone());

    let consumer = AcceptedConsumer::start(
        &config.kafka,
        config.dispatch.workers,
        scheduler,
        status,
        cancel.clone(),
    )
    .context("failed to start accepted consumer")?;

    cancel.cancelled().await;

    info!("shutting down consume pipeline");
    consumer.stop().await;
    pool.stop().await;

    Ok(())
}
