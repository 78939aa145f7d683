use redis::aio::ConnectionManager;
use tracing::info;

use crate::config::RedisConfig;

/// Open a reconnecting Redis connection and verify it with a PING.
pub async fn connect_redis(cfg: &RedisConfig) -> Result<ConnectionManager, redis::RedisError> {
    let url = match &cfg.password {
        Some(password) => format!(
            "redis://:{}@{}:{}/{}",
            password, cfg.host, cfg.port, cfg.database
        ),
        None => format!("redis://{}:{}/{}", cfg.host, cfg.port, cfg.database),
    };

    let client = redis::Client::open(url)?;
    let mut manager = ConnectionManager::new(client).await?;

    redis::cmd("PING").query_async::<()>(&mut manager).await?;

    info!(
        host = %cfg.host,
        port = cfg.port,
        database = cfg.database,
        "connected to redis"
    );

    Ok(manager)
}
