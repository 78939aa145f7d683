use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::types::Config;

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.kafka.brokers.trim().is_empty() {
            anyhow::bail!("kafka.brokers must not be empty");
        }

        if self.kafka.accepted_topic == self.kafka.status_topic {
            anyhow::bail!("kafka accepted and status topics must differ");
        }

        if self.balance.sms_cost <= 0 {
            anyhow::bail!("balance.sms_cost must be positive");
        }

        if self.balance.writers == 0 || self.producer.workers == 0 {
            anyhow::bail!("worker pool sizes must be at least 1");
        }

        if self.dispatch.workers == 0 || self.dispatch.max_attempts == 0 {
            anyhow::bail!("dispatch.workers and dispatch.max_attempts must be at least 1");
        }

        if self.status.readers == 0 || self.status.writers == 0 || self.status.batch_size == 0 {
            anyhow::bail!("status pipeline sizes must be at least 1");
        }

        if !(0.0..=1.0).contains(&self.provider.failure_ratio) {
            anyhow::bail!("provider.failure_ratio must be between 0.0 and 1.0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
postgres:
  host: localhost
  username: gateway
  password: secret
  database: gateway

redis:
  host: localhost

clickhouse:
  host: localhost
  username: default
  password: ""
  database: gateway

kafka:
  brokers: "localhost:9092"
"#;

    #[test]
    fn test_minimal_config() {
        let config = Config::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.http.port, 8080);
        assert_eq!(config.balance.sms_cost, 10);
        assert_eq!(config.balance.queue_size, 100_000);
        assert_eq!(config.producer.workers, 50);
        assert_eq!(config.kafka.accepted_topic, "sms.accepted");
        assert_eq!(config.kafka.status_topic, "sms.status");
        assert_eq!(config.plans.cache_key, "arvan:plans");
    }

    #[test]
    fn test_overrides() {
        let yaml = format!(
            "{MINIMAL}
balance:
  sms_cost: 25
  writers: 2
dispatch:
  workers: 3
  max_attempts: 5
"
        );

        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.balance.sms_cost, 25);
        assert_eq!(config.balance.writers, 2);
        assert_eq!(config.dispatch.workers, 3);
        assert_eq!(config.dispatch.max_attempts, 5);
    }

    #[test]
    fn test_empty_brokers_rejected() {
        let yaml = MINIMAL.replace("\"localhost:9092\"", "\"\"");
        let result = Config::from_yaml(&yaml);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("kafka.brokers"));
    }

    #[test]
    fn test_same_topic_rejected() {
        let yaml = format!(
            "{MINIMAL}
  accepted_topic: sms.events
  status_topic: sms.events
"
        );
        // indentation places the overrides under kafka
        let result = Config::from_yaml(&yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_cost_rejected() {
        let yaml = format!(
            "{MINIMAL}
balance:
  sms_cost: 0
"
        );
        let result = Config::from_yaml(&yaml);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("sms_cost"));
    }

    #[test]
    fn test_failure_ratio_bounds() {
        let yaml = format!(
            "{MINIMAL}
provider:
  failure_ratio: 1.5
"
        );
        let result = Config::from_yaml(&yaml);

        assert!(result.is_err());
    }
}
