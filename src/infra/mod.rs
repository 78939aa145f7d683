//! Constructors for the external stores the gateway depends on.

mod clickhouse;
mod kafka;
mod migrations;
mod postgres;
mod redis;

pub use self::clickhouse::new_clickhouse;
pub use self::kafka::{new_consumer, new_producer};
pub use self::migrations::{clickhouse_down, clickhouse_up, postgres_down, postgres_up};
pub use self::postgres::connect_postgres;
pub use self::redis::connect_redis;
