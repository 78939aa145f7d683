mod loader;
mod types;

pub use types::{
    BalanceConfig, ClickHouseConfig, Config, DispatchConfig, HttpConfig, KafkaConfig, PlanConfig,
    PostgresConfig, ProducerConfig, ProviderConfig, RedisConfig, StatusConfig, TelemetryConfig,
};
