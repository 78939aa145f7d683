//! The `consume-status` command: status-topic readers feeding the analytics
//! store.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::infra;
use crate::status::{AnalyticsStore, StatusPipeline};

use super::shutdown_token;

pub async fn run(config: Config) -> Result<()> {
    let cancel = shutdown_token();

    let clickhouse = infra::new_clickhouse(&config.clickhouse);
    let store = Arc::new(AnalyticsStore::new(clickhouse));

    let pipeline = StatusPipeline::start(&config.kafka, &config.status, store, cancel.clone())
        .context("failed to start status pipeline")?;

    cancel.cancelled().await;

    info!("shutting down status pipeline");
    pipeline.stop().await;

    Ok(())
}
