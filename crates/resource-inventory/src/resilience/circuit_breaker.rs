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

//! Consecutive-failure circuit breaker.
//!
//! Closed lets every call through and counts consecutive failures. Reaching
//! the threshold opens the breaker, which rejects calls until the cool-down
//! elapses. The first call after that runs as a half-open trial; concurrent
//! callers are rejected while it is in flight. A successful trial closes the
//! breaker and a failed one reopens it.
//!
//! Every state change starts a new generation. A call that began in an older
//! generation does not affect the current state when it finishes.

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

/// Default consecutive failures that open the breaker.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default time the breaker stays open before allowing a trial call.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker is open")]
    Open,

    /// A half-open trial call is already in flight.
    #[error("too many requests")]
    TooManyRequests,

    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Whether the call was rejected without running.
    pub fn is_rejected(&self) -> bool {
        matches!(self, BreakerError::Open | BreakerError::TooManyRequests)
    }
}

/// Breaker tuning.
///
/// ```rust,ignore
/// let config = CircuitBreakerConfig::builder()
///     .failure_threshold(3)
///     .cooldown(Duration::from_secs(60))
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfigBuilder::default().build()
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self {
            config: CircuitBreakerConfig {
                failure_threshold: DEFAULT_FAILURE_THRESHOLD,
                cooldown: DEFAULT_COOLDOWN,
            },
        }
    }
}

impl CircuitBreakerConfigBuilder {
    /// Sets the consecutive failures that open the breaker. Zero is treated as one.
    pub fn failure_threshold(mut self, value: u32) -> Self {
        self.config.failure_threshold = value.max(1);
        self
    }

    pub fn cooldown(mut self, value: Duration) -> Self {
        self.config.cooldown = value;
        self
    }

    pub fn build(self) -> CircuitBreakerConfig {
        self.config
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    generation: u64,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// A process-wide breaker shared by reference between requests.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

/// Admission for one call. Dropping it unfinished counts as a failure so an
/// abandoned half-open trial cannot wedge the breaker.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    finished: bool,
}

impl Permit<'_> {
    fn finish(mut self, success: bool) {
        self.finished = true;
        self.breaker.after_call(self.generation, success);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker.after_call(self.generation, false);
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                generation: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, moving an expired open breaker to half-open.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Runs `operation` if the breaker admits it and records the outcome.
    pub async fn execute<T, E, F>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let permit = self.before_call::<E>()?;
        match operation.await {
            Ok(value) => {
                permit.finish(true);
                Ok(value)
            }
            Err(err) => {
                permit.finish(false);
                Err(BreakerError::Inner(err))
            }
        }
    }

    fn before_call<E>(&self) -> Result<Permit<'_>, BreakerError<E>> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, Instant::now());

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::Open => return Err(BreakerError::Open),
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(BreakerError::TooManyRequests);
                }
                inner.trial_in_flight = true;
            }
        }

        Ok(Permit {
            breaker: self,
            generation: inner.generation,
            finished: false,
        })
    }

    fn after_call(&self, generation: u64, success: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);

        if inner.generation != generation {
            return;
        }

        match (inner.state, success) {
            (CircuitState::Closed, true) => inner.consecutive_failures = 0,
            (CircuitState::Closed, false) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
            (CircuitState::HalfOpen, true) => {
                self.transition(&mut inner, CircuitState::Closed, now);
            }
            (CircuitState::HalfOpen, false) => {
                self.transition(&mut inner, CircuitState::Open, now);
            }
            (CircuitState::Open, _) => {}
        }
    }

    fn refresh(&self, inner: &mut BreakerState, now: Instant) {
        if inner.state == CircuitState::Open
            && inner
                .opened_at
                .is_some_and(|opened| now.duration_since(opened) >= self.config.cooldown)
        {
            self.transition(inner, CircuitState::HalfOpen, now);
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.trial_in_flight = false;
        inner.consecutive_failures = 0;
        inner.opened_at = (to == CircuitState::Open).then_some(now);

        match to {
            CircuitState::Open => warn!(breaker = %self.name, %from, %to, "Circuit breaker state changed"),
            _ => info!(breaker = %self.name, %from, %to, "Circuit breaker state changed"),
        }
    }
}
