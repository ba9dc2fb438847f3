// Copyright (c) 2025 - Cowboy AI, Inc.
//! Circuit Breaker
//!
//! Guards the read-after-write wait. After `failure_threshold` consecutive
//! failures the breaker opens and rejects calls without running them; once
//! `open_timeout` has elapsed a single probe is let through (half-open),
//! and `success_threshold` consecutive probe successes close it again.
//!
//! ```text
//! Closed ──failures ≥ threshold──▶ Open ──open_timeout──▶ HalfOpen
//!   ▲                                ▲                       │
//!   └──────── successes ≥ threshold ─┼───────────────────────┤
//!                                    └──────── failure ──────┘
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::errors::{InventoryError, InventoryResult};

/// Breaker thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it
    pub success_threshold: u32,
    /// Time spent open before a probe is allowed
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, moving Open to HalfOpen once the timeout has passed
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    fn refresh(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open {
            let elapsed = inner
                .opened_at
                .map(|at| at.elapsed() >= self.config.open_timeout)
                .unwrap_or(true);
            if elapsed {
                debug!(breaker = self.name, "circuit half-open");
                inner.state = CircuitState::HalfOpen;
                inner.successes = 0;
                inner.probe_in_flight = false;
            }
        }
    }

    /// Admit a call or reject it with [`InventoryError::CircuitOpen`]
    pub fn try_acquire(&self) -> InventoryResult<()> {
        self.admit().map(|_| ())
    }

    /// Admit a call; `true` when it is the half-open probe
    fn admit(&self) -> InventoryResult<bool> {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => Err(InventoryError::CircuitOpen(CircuitState::Open.as_str())),
            CircuitState::HalfOpen if inner.probe_in_flight => {
                Err(InventoryError::CircuitOpen(CircuitState::HalfOpen.as_str()))
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = true;
                Ok(true)
            }
        }
    }

    /// Give back a probe slot whose call never finished
    fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && inner.probe_in_flight {
            debug!(breaker = self.name, "probe abandoned");
            inner.probe_in_flight = false;
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.failures = 0,
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    info!(breaker = self.name, "circuit closed");
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    info!(breaker = self.name, failures = inner.failures, "circuit opened");
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                debug!(breaker = self.name, "probe failed, circuit reopened");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                inner.successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Run `f` if admitted and record its outcome
    pub async fn call<T, F, Fut>(&self, f: F) -> InventoryResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = InventoryResult<T>>,
    {
        let probe = self.admit()?;
        let mut pending = PendingCall {
            breaker: self,
            probe,
            finished: false,
        };
        let result = f().await;
        pending.finished = true;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }
}

/// Releases the half-open probe when a call is dropped before it finishes
struct PendingCall<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    finished: bool,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if self.probe && !self.finished {
            self.breaker.release_probe();
        }
    }
}
