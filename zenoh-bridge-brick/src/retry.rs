//! Fixed-backoff retry policy for local-bus operations.
//!
//! Loss of local-bus connectivity is always recoverable, so the operations
//! that depend on it (connect, enumerate) are retried forever at a fixed
//! pace instead of surfacing an error.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Unbounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    backoff: Duration,
}

impl RetryPolicy {
    pub const fn fixed(backoff: Duration) -> Self {
        Self { backoff }
    }

    /// Run `op` until it succeeds, sleeping between attempts. Never returns
    /// an error; each failure is logged with the attempt count.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return value,
                Err(e) => {
                    warn!(what, attempt, error = %e, "operation failed, retrying");
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_returns_value_on_first_success() {
        let policy = RetryPolicy::fixed(Duration::from_millis(1));
        let value = policy
            .run("noop", || async { Ok::<_, std::io::Error>(7) })
            .await;
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::fixed(Duration::from_millis(1));
        let attempts = AtomicU32::new(0);

        let value = policy
            .run("flaky", || async {
                if attempts.fetch_add(1, Ordering::Relaxed) < 3 {
                    Err("not yet")
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(value, 42);
        assert_eq!(attempts.load(Ordering::Relaxed), 4);
    }
}
