//! SMS provider abstraction.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::domain::Job;

/// Provider failures split by retryability. Transient failures re-enter the
/// customer's FIFO; permanent ones terminate the job with a `failed` status.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("permanent provider failure: {0}")]
    Permanent(String),
}

/// The upstream SMS carrier.
#[async_trait]
pub trait SmsProvider: Send + Sync {
    /// Deliver one message. At-least-once: callers may retry transient
    /// failures with the same job.
    async fn send(&self, job: &Job) -> Result<(), ProviderError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Simulated provider with configurable latency and transient failure ratio.
/// The defaults (no latency, no failures) keep behaviour deterministic.
pub struct StubProvider {
    latency: Duration,
    failure_ratio: f64,
}

impl StubProvider {
    pub fn new(cfg: &ProviderConfig) -> Self {
        Self {
            latency: Duration::from_millis(cfg.latency_ms),
            failure_ratio: cfg.failure_ratio,
        }
    }
}

#[async_trait]
impl SmsProvider for StubProvider {
    async fn send(&self, job: &Job) -> Result<(), ProviderError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.failure_ratio > 0.0 && rand::thread_rng().gen::<f64>() < self.failure_ratio {
            return Err(ProviderError::Transient(format!(
                "simulated failure for job {}",
                job.id
            )));
        }

        debug!(job_id = %job.id, phone = %job.phone, "sms sent");
        Ok(())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_job() -> Job {
        Job {
            id: Uuid::new_v4(),
            customer_id: 1,
            phone: "+12025550100".to_string(),
            message: "Hi".to_string(),
            priority: 0,
            created_at: Utc::now(),
            attempts: 0,
        }
    }

    #[tokio::test]
    async fn test_stub_default_always_succeeds() {
        let provider = StubProvider::new(&ProviderConfig::default());

        for _ in 0..100 {
            assert!(provider.send(&test_job()).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_stub_full_failure_ratio_always_fails() {
        let provider = StubProvider::new(&ProviderConfig {
            latency_ms: 0,
            failure_ratio: 1.0,
        });

        let err = provider.send(&test_job()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transient(_)));
    }
}
