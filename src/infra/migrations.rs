//! Embedded schema migrations for the relational and analytics stores.
//!
//! Schemas are compiled into the binary and applied by the `migrate`
//! subcommand. Statements are idempotent (`IF [NOT] EXISTS`), so re-running
//! `up` against a migrated database is safe.

use clickhouse::Client;
use sqlx::PgPool;
use tracing::info;

const POSTGRES_UP: &str = include_str!("../../migrations/postgres/0001_init.up.sql");
const POSTGRES_DOWN: &str = include_str!("../../migrations/postgres/0001_init.down.sql");
const CLICKHOUSE_UP: &str = include_str!("../../migrations/clickhouse/0001_status_log.up.sql");
const CLICKHOUSE_DOWN: &str = include_str!("../../migrations/clickhouse/0001_status_log.down.sql");

/// Create the Postgres tables (balances, plans, sms_logs, kafka_dlq).
pub async fn postgres_up(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(POSTGRES_UP).execute(pool).await?;
    info!("postgres schema applied");
    Ok(())
}

/// Drop the Postgres tables.
pub async fn postgres_down(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(POSTGRES_DOWN).execute(pool).await?;
    info!("postgres schema reverted");
    Ok(())
}

/// Create the ClickHouse status table.
pub async fn clickhouse_up(client: &Client) -> Result<(), clickhouse::error::Error> {
    client.query(CLICKHOUSE_UP.trim()).execute().await?;
    info!("clickhouse schema applied");
    Ok(())
}

/// Drop the ClickHouse status table.
pub async fn clickhouse_down(client: &Client) -> Result<(), clickhouse::error::Error> {
    client.query(CLICKHOUSE_DOWN.trim()).execute().await?;
    info!("clickhouse schema reverted");
    Ok(())
}
