use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::PostgresConfig;

/// Open a Postgres pool and verify connectivity.
pub async fn connect_postgres(cfg: &PostgresConfig) -> Result<PgPool, sqlx::Error> {
    let url = format!(
        "postgres://{}:{}@{}:{}/{}",
        cfg.username, cfg.password, cfg.host, cfg.port, cfg.database
    );

    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect(&url)
        .await?;

    info!(
        host = %cfg.host,
        port = cfg.port,
        database = %cfg.database,
        "connected to postgres"
    );

    Ok(pool)
}
