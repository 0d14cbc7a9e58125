/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Bounded retry with linear backoff for consumer side calls.

use std::future::Future;
use std::time::Duration;

use tracing::error;

use crate::error::ConsumerError;
use crate::metrics;

/// Base step of the linear backoff.
const BACKOFF_STEP: Duration = Duration::from_millis(300);

/// Retry tuning. A max of `-1` retries forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    pub operation_max_retries: i64,
    pub backoff_factor: u32,
    pub max_backoff: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            operation_max_retries: 3,
            backoff_factor: 5,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryOptions {
    /// Delay after the `attempts`-th consecutive failure.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let step = BACKOFF_STEP.saturating_mul(self.backoff_factor.saturating_mul(attempts));
        step.min(self.max_backoff)
    }

    fn allows(&self, attempts: u32) -> bool {
        self.operation_max_retries < 0 || i64::from(attempts) < self.operation_max_retries
    }
}

/// Runs `operation` until it succeeds or the attempt budget is spent.
///
/// Returns [`ConsumerError::MaxRetries`] carrying the last failure once the
/// budget is exhausted.
pub async fn retry<T, F, Fut>(
    options: &RetryOptions,
    label: &str,
    mut operation: F,
) -> Result<T, ConsumerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConsumerError>>,
{
    let mut attempts: u32 = 0;
    let mut last_error = None;

    while options.allows(attempts) {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                metrics::record_consumer_error("retry");
                error!(label, "request failed: {}", err);
                attempts += 1;
                last_error = Some(err);
                if options.allows(attempts) {
                    let backoff = options.backoff(attempts);
                    error!(label, ?backoff, "retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    let last = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempts allowed".to_string());
    error!(label, attempts, "Error processing request (max attempts reached): {}", last);
    Err(ConsumerError::MaxRetries(format!("{}: {}", label, last)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max: i64) -> RetryOptions {
        RetryOptions {
            operation_max_retries: max,
            backoff_factor: 0,
            max_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_is_linear_and_capped() {
        let options = RetryOptions {
            operation_max_retries: 10,
            backoff_factor: 5,
            max_backoff: Duration::from_secs(3),
        };
        assert_eq!(options.backoff(1), Duration::from_millis(1500));
        assert_eq!(options.backoff(2), Duration::from_secs(3));
        assert_eq!(options.backoff(7), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result = retry(&fast(3), "op", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ConsumerError::Authorizer("unavailable".to_string()))
            } else {
                Ok("token")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "token");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fast(2), "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ConsumerError::Authorizer("unavailable".to_string()))
        })
        .await;
        assert!(matches!(result, Err(ConsumerError::MaxRetries(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unbounded_keeps_trying() {
        let calls = AtomicU32::new(0);
        let result = retry(&fast(-1), "op", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 20 {
                Err(ConsumerError::Authorizer("unavailable".to_string()))
            } else {
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 21);
    }
}
