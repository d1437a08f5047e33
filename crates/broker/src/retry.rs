// SPDX-License-Identifier: MIT

//! Jittered-backoff retry wrapper for transient `Sss` failures.
//!
//! Every `Sss` call the broker makes goes through [`with_retry`]
//! rather than being awaited directly — a momentary connection
//! hiccup against the store should not surface as a job-level error
//! if a retry a few milliseconds later would have succeeded.

use std::future::Future;
use std::time::Duration;

use jobmesh_store::StoreError;
use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 4, base_delay: Duration::from_millis(20), max_delay: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis().saturating_mul(1u128 << attempt.min(16));
        let capped = exp.min(self.max_delay.as_millis());
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered as u64)
    }
}

pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < policy.max_attempts && is_transient(&err) => {
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn is_transient(err: &StoreError) -> bool {
    matches!(err, StoreError::Connection(_) | StoreError::MatcherContention { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let policy = RetryPolicy { max_attempts: 5, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5) };
        let attempts = AtomicU32::new(0);
        let result = with_retry(&policy, || {
            let count = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(StoreError::Connection("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let attempts = AtomicU32::new(0);
        let result: Result<(), StoreError> = with_retry(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Command("bad arguments".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5) };
        let attempts = AtomicU32::new(0);
        let result: Result<(), StoreError> = with_retry(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Connection("down".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
