//! The `migrate` command: apply or revert both store schemas.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::infra;

pub async fn run(config: Config, direction: &str) -> Result<()> {
    let db = infra::connect_postgres(&config.postgres)
        .await
        .context("failed to connect to postgres")?;
    let clickhouse = infra::new_clickhouse(&config.clickhouse);

    match direction {
        "up" => {
            infra::postgres_up(&db)
                .await
                .context("postgres migration failed")?;
            infra::clickhouse_up(&clickhouse)
                .await
                .context("clickhouse migration failed")?;
        }
        "down" => {
            infra::clickhouse_down(&clickhouse)
                .await
                .context("clickhouse migration failed")?;
            infra::postgres_down(&db)
                .await
                .context("postgres migration failed")?;
        }
        other => anyhow::bail!("unknown migration direction: {other}"),
    }

    Ok(())
}
