use clickhouse::Client;
use tracing::info;

use crate::config::ClickHouseConfig;

/// Build a ClickHouse client over the HTTP interface.
pub fn new_clickhouse(cfg: &ClickHouseConfig) -> Client {
    info!(
        host = %cfg.host,
        port = cfg.port,
        database = %cfg.database,
        "configuring clickhouse client"
    );

    Client::default()
        .with_url(format!("http://{}:{}", cfg.host, cfg.port))
        .with_user(&cfg.username)
        .with_password(&cfg.password)
        .with_database(&cfg.database)
}
