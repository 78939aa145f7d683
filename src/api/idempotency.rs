//! Duplicate-send suppression.
//!
//! A send is fingerprinted by (customer, phone, body). The first request
//! claims the fingerprint in the shared cache with a TTL; repeats inside the
//! window are acknowledged with 202 without debiting or publishing. Off by
//! default: retried deliveries of distinct sends with identical text are
//! legitimate traffic for some customers.

use std::time::Duration;

use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Guard consulted by the send handler before billing.
pub struct IdempotencyGuard {
    redis: Option<ConnectionManager>,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(redis: ConnectionManager, ttl: Duration) -> Self {
        Self {
            redis: Some(redis),
            ttl,
        }
    }

    /// A guard that admits everything.
    pub fn disabled() -> Self {
        Self {
            redis: None,
            ttl: Duration::ZERO,
        }
    }

    /// Claim the fingerprint for this send. Returns `true` when an earlier
    /// request already claimed it, i.e. this one is a duplicate.
    ///
    /// Cache failures fail open: suppressing a billing-protected duplicate
    /// is not worth rejecting live traffic.
    pub async fn is_duplicate(&self, customer_id: i64, phone: &str, message: &str) -> bool {
        let Some(redis) = &self.redis else {
            return false;
        };

        let key = fingerprint_key(customer_id, phone, message);
        let mut conn = redis.clone();

        // SET NX EX: one round trip to both test and claim.
        let claimed: Result<Option<String>, redis::RedisError> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await;

        match claimed {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(e) => {
                warn!(customer_id, error = %e, "idempotency check failed, admitting send");
                false
            }
        }
    }
}

fn fingerprint_key(customer_id: i64, phone: &str, message: &str) -> String {
    use std::fmt::Write;

    let mut hasher = Sha256::new();
    hasher.update(customer_id.to_string());
    hasher.update(b":");
    hasher.update(phone);
    hasher.update(b":");
    hasher.update(message);

    let digest = hasher.finalize();
    let mut key = String::with_capacity("idem:".len() + digest.len() * 2);
    key.push_str("idem:");
    for byte in digest {
        let _ = write!(key, "{byte:02x}");
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(
            fingerprint_key(42, "+12025550100", "Hi"),
            fingerprint_key(42, "+12025550100", "Hi")
        );
    }

    #[test]
    fn test_fingerprint_separates_customers() {
        // The same text from two customers must never collide.
        assert_ne!(
            fingerprint_key(1, "+12025550100", "Hi"),
            fingerprint_key(2, "+12025550100", "Hi")
        );
    }

    #[test]
    fn test_fingerprint_field_boundaries() {
        // Moving a character across the phone/message boundary changes the key.
        assert_ne!(
            fingerprint_key(1, "+1202555010", "0Hi"),
            fingerprint_key(1, "+12025550100", "Hi")
        );
    }

    #[tokio::test]
    async fn test_disabled_guard_admits_everything() {
        let guard = IdempotencyGuard::disabled();

        assert!(!guard.is_duplicate(1, "+12025550100", "Hi").await);
        assert!(!guard.is_duplicate(1, "+12025550100", "Hi").await);
    }
}
