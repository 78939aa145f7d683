use serde::{Deserialize, Serialize};

/// Root configuration for smsgwd
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP ingress settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Relational store of record
    pub postgres: PostgresConfig,

    /// Shared cache (balances, plan snapshot)
    pub redis: RedisConfig,

    /// Analytics store for status events
    pub clickhouse: ClickHouseConfig,

    /// Event log
    pub kafka: KafkaConfig,

    /// Balance service and reconciler
    #[serde(default)]
    pub balance: BalanceConfig,

    /// Accepted-event producer
    #[serde(default)]
    pub producer: ProducerConfig,

    /// Dispatch worker pool and accepted consumers
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Status pipeline
    #[serde(default)]
    pub status: StatusConfig,

    /// Plan/priority cache
    #[serde(default)]
    pub plans: PlanConfig,

    /// Stub provider behaviour
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Logging
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// HTTP ingress configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bind port
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Suppress repeated sends of the same (customer, phone, body)
    #[serde(default)]
    pub idempotency_enabled: bool,

    /// How long a send fingerprint suppresses duplicates, in seconds
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            idempotency_enabled: false,
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_idempotency_ttl_secs() -> u64 {
    3_600
}

/// Postgres connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_pool_size() -> u32 {
    16
}

/// Redis connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: i64,
}

fn default_redis_port() -> u16 {
    6379
}

/// ClickHouse connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    pub host: String,
    #[serde(default = "default_clickhouse_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

fn default_clickhouse_port() -> u16 {
    8123
}

/// Kafka settings shared by producers and consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Comma-separated broker list, e.g. "kafka-1:9092,kafka-2:9092"
    pub brokers: String,

    /// Topic for admitted sends
    #[serde(default = "default_accepted_topic")]
    pub accepted_topic: String,

    /// Topic for lifecycle status events
    #[serde(default = "default_status_topic")]
    pub status_topic: String,

    /// Consumer group for the accepted topic
    #[serde(default = "default_accepted_group")]
    pub accepted_group: String,

    /// Consumer group for the status topic
    #[serde(default = "default_status_group")]
    pub status_group: String,
}

fn default_accepted_topic() -> String {
    "sms.accepted".to_string()
}

fn default_status_topic() -> String {
    "sms.status".to_string()
}

fn default_accepted_group() -> String {
    "smsgwd-accepted".to_string()
}

fn default_status_group() -> String {
    "smsgwd-status".to_string()
}

/// Balance service tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceConfig {
    /// Cost of a single SMS in the smallest billing unit
    #[serde(default = "default_sms_cost")]
    pub sms_cost: i64,

    /// Reconciliation channel capacity
    #[serde(default = "default_balance_queue")]
    pub queue_size: usize,

    /// Parallel batch writers
    #[serde(default = "default_balance_writers")]
    pub writers: usize,

    /// Flush when a writer's local batch reaches this size
    #[serde(default = "default_balance_batch")]
    pub batch_size: usize,

    /// Periodic flush interval in milliseconds
    #[serde(default = "default_balance_flush_ms")]
    pub flush_interval_ms: u64,

    /// Batch flush transaction timeout in milliseconds
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            sms_cost: default_sms_cost(),
            queue_size: default_balance_queue(),
            writers: default_balance_writers(),
            batch_size: default_balance_batch(),
            flush_interval_ms: default_balance_flush_ms(),
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

fn default_sms_cost() -> i64 {
    10
}

fn default_balance_queue() -> usize {
    100_000
}

fn default_balance_writers() -> usize {
    6
}

fn default_balance_batch() -> usize {
    500
}

fn default_balance_flush_ms() -> u64 {
    800
}

fn default_flush_timeout_ms() -> u64 {
    30_000
}

/// Accepted-event producer tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// In-memory channel capacity
    #[serde(default = "default_producer_queue")]
    pub queue_size: usize,

    /// Parallel producer workers
    #[serde(default = "default_producer_workers")]
    pub workers: usize,

    /// Attempts per record before spilling to the DLQ
    #[serde(default = "default_producer_retries")]
    pub retries: u32,

    /// Backoff base in milliseconds; delay is base x attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Per-write timeout in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            queue_size: default_producer_queue(),
            workers: default_producer_workers(),
            retries: default_producer_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

fn default_producer_queue() -> usize {
    100_000
}

fn default_producer_workers() -> usize {
    50
}

fn default_producer_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

/// Dispatch worker pool and accepted-consumer tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Worker pool size; also the accepted reader count
    #[serde(default = "default_dispatch_workers")]
    pub workers: usize,

    /// Provider attempts per job before a terminal `failed` status
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Idle wait floor in milliseconds when no customer is selectable
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_dispatch_workers(),
            max_attempts: default_max_attempts(),
            idle_wait_ms: default_idle_wait_ms(),
        }
    }
}

fn default_dispatch_workers() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_idle_wait_ms() -> u64 {
    100
}

/// Status pipeline tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Parallel status readers
    #[serde(default = "default_status_readers")]
    pub readers: usize,

    /// Parallel batch writers
    #[serde(default = "default_status_writers")]
    pub writers: usize,

    /// Decoded-event channel capacity
    #[serde(default = "default_status_channel")]
    pub channel_size: usize,

    /// Flush when a writer's local batch reaches this size
    #[serde(default = "default_status_batch")]
    pub batch_size: usize,

    /// Periodic flush interval in milliseconds
    #[serde(default = "default_status_flush_ms")]
    pub flush_interval_ms: u64,

    /// Per-insert timeout in milliseconds
    #[serde(default = "default_insert_timeout_ms")]
    pub insert_timeout_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            readers: default_status_readers(),
            writers: default_status_writers(),
            channel_size: default_status_channel(),
            batch_size: default_status_batch(),
            flush_interval_ms: default_status_flush_ms(),
            insert_timeout_ms: default_insert_timeout_ms(),
        }
    }
}

fn default_status_readers() -> usize {
    4
}

fn default_status_writers() -> usize {
    4
}

fn default_status_channel() -> usize {
    1_000
}

fn default_status_batch() -> usize {
    100
}

fn default_status_flush_ms() -> u64 {
    1_000
}

fn default_insert_timeout_ms() -> u64 {
    5_000
}

/// Plan/priority cache tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Snapshot refresh interval in seconds
    #[serde(default = "default_plan_refresh_secs")]
    pub refresh_interval_secs: u64,

    /// Shared-cache key holding the serialized snapshot
    #[serde(default = "default_plan_cache_key")]
    pub cache_key: String,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_plan_refresh_secs(),
            cache_key: default_plan_cache_key(),
        }
    }
}

fn default_plan_refresh_secs() -> u64 {
    300
}

fn default_plan_cache_key() -> String {
    "arvan:plans".to_string()
}

/// Stub provider behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Simulated latency in milliseconds (0 = none)
    #[serde(default)]
    pub latency_ms: u64,

    /// Fraction of sends that fail transiently (0.0 - 1.0)
    #[serde(default)]
    pub failure_ratio: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            failure_ratio: 0.0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g. "info", "smsgwd=debug")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON logs instead of the pretty format
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
