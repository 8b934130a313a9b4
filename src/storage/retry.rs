use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io;
use std::time::Duration;
use tracing::warn;

/// Backoff strategies between store retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Linear,
    Exponential,
    Constant,
}

/// Bounded retry for history store I/O
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u8,
    pub base_delay_ms: u64,
    pub backoff_strategy: BackoffStrategy,
    /// Upper bound on a single attempt before it counts as timed out
    pub attempt_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 50,
            backoff_strategy: BackoffStrategy::Exponential,
            attempt_timeout_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that gives up after the first failure.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, attempt: u8) -> Duration {
        let base = Duration::from_millis(self.base_delay_ms);
        match self.backoff_strategy {
            BackoffStrategy::Linear => base * (u32::from(attempt) + 1),
            BackoffStrategy::Exponential => base * 2u32.saturating_pow(u32::from(attempt)),
            BackoffStrategy::Constant => base,
        }
    }

    /// Run `op`, retrying transient failures with backoff.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> io::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = io::Result<T>>,
    {
        let timeout = Duration::from_millis(self.attempt_timeout_ms);
        let mut attempt = 0u8;

        loop {
            let result = match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{} timed out after {:?}", operation, timeout),
                )),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
