//! Retry logic for transient database errors.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::DbError;

/// Exponential backoff settings.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Fails on the first error.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed).
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Returns true for errors that may succeed if the operation is repeated.
pub fn is_transient_error(error: &DbError) -> bool {
    let mentions = |msg: &str, needles: &[&str]| {
        let msg = msg.to_lowercase();
        needles.iter().any(|n| msg.contains(n))
    };

    match error {
        DbError::PoolExhausted => true,
        DbError::Connection(msg) => mentions(
            msg,
            &["timeout", "connection refused", "connection reset", "broken pipe"],
        ),
        DbError::Transaction(msg) | DbError::Query(msg) => {
            mentions(msg, &["deadlock", "busy", "database is locked", "timeout"])
        }
        DbError::NotFound { .. }
        | DbError::Constraint(_)
        | DbError::Serialization(_)
        | DbError::Migration(_)
        | DbError::Configuration(_)
        | DbError::AccessDenied { .. } => false,
    }
}

/// Runs `f`, retrying transient failures with exponential backoff.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    f: F,
) -> Result<T, DbError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(operation = %operation_name, attempts = attempt + 1, "Succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if is_transient_error(&e) && attempt < config.max_retries => {
                let delay = config.delay_for(attempt);
                warn!(
                    operation = %operation_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient database error, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
