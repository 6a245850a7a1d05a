//! A generic circuit breaker guarding unreliable async operations.
//!
//! `closed` → `open` → `half_open` → `closed`, exactly as a textbook
//! breaker: count failures while closed, fast-fail while open, admit one
//! probe per recovery window while half-open.

#![deny(unsafe_code)]

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// Breaker configuration. Defaults match the values the rest of the
/// corpus uses for its own retry/backoff knobs: a handful of failures,
/// tens of seconds to recover, single-digit-second operation timeouts.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures (while closed) before tripping to `open`.
    pub failure_threshold: u32,
    /// Time `open` must hold before admitting a `half_open` probe.
    pub recovery_timeout: Duration,
    /// Per-call timeout; a timeout counts as a failure.
    pub operation_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(10),
        }
    }
}

/// The breaker's current state, as observed by callers and the health
/// monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BreakerState {
    /// Calls pass through; failures are counted.
    Closed = 0,
    /// Calls fast-fail without invoking the operation.
    Open = 1,
    /// Exactly one probe call is admitted.
    HalfOpen = 2,
}

impl From<u8> for BreakerState {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// The outcome of a guarded call.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker is open (or a probe is already in flight during
    /// `half_open`); the operation was never invoked.
    #[error("circuit breaker is open")]
    BreakerOpen,
    /// The operation ran but exceeded `operation_timeout`.
    #[error("operation timed out")]
    Timeout,
    /// The operation ran and returned an error.
    #[error(transparent)]
    Operation(E),
}

/// A generic circuit breaker. Cheap to clone (all state lives behind
/// atomics/a mutex reached through `Arc` at the call site — callers
/// typically hold this inside an `Arc<CircuitBreaker>`).
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: AtomicU8,
    failure_count: AtomicU64,
    last_failure_at_ms: AtomicU64,
    probe_in_flight: Mutex<bool>,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    /// Construct a breaker in the `closed` state.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(BreakerState::Closed as u8),
            failure_count: AtomicU64::new(0),
            last_failure_at_ms: AtomicU64::new(0),
            probe_in_flight: Mutex::new(false),
            opened_at: Mutex::new(None),
        }
    }

    /// Current state, accounting for an elapsed recovery window (reading
    /// state never mutates it; the transition to `half_open` happens on
    /// the next `call`).
    #[must_use]
    pub fn state(&self) -> BreakerState {
        BreakerState::from(self.state.load(Ordering::Acquire))
    }

    /// Consecutive failures recorded since the last reset.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Acquire)
    }

    /// Milliseconds since UNIX epoch of the last recorded failure, or 0
    /// if none has occurred yet.
    #[must_use]
    pub fn last_failure_at(&self) -> u64 {
        self.last_failure_at_ms.load(Ordering::Acquire)
    }

    /// Guard `op` with the breaker: fast-fail if open, admit a single
    /// probe if half-open, otherwise run `op` under `operation_timeout`
    /// and record the outcome.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.admit_call() {
            return Err(BreakerError::BreakerOpen);
        }

        let result = tokio::time::timeout(self.config.operation_timeout, op()).await;

        match result {
            Ok(Ok(value)) => {
                self.on_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.on_failure();
                Err(BreakerError::Operation(e))
            }
            Err(_) => {
                self.on_failure();
                Err(BreakerError::Timeout)
            }
        }
    }

    /// Decide whether a call may proceed, transitioning `open` →
    /// `half_open` once the recovery window has elapsed and claiming the
    /// single half-open probe slot.
    fn admit_call(&self) -> bool {
        match self.state() {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = self
                    .opened_at
                    .lock()
                    .expect("breaker mutex poisoned")
                    .map_or(Duration::MAX, |at| at.elapsed());
                if elapsed < self.config.recovery_timeout {
                    return false;
                }
                self.state.store(BreakerState::HalfOpen as u8, Ordering::Release);
                debug!("circuit breaker: open -> half_open after recovery timeout");
                self.claim_probe_slot()
            }
            BreakerState::HalfOpen => self.claim_probe_slot(),
        }
    }

    fn claim_probe_slot(&self) -> bool {
        let mut in_flight = self.probe_in_flight.lock().expect("breaker mutex poisoned");
        if *in_flight {
            false
        } else {
            *in_flight = true;
            true
        }
    }

    fn on_success(&self) {
        let was_half_open = self.state() == BreakerState::HalfOpen;
        self.failure_count.store(0, Ordering::Release);
        self.state.store(BreakerState::Closed as u8, Ordering::Release);
        if was_half_open {
            *self.probe_in_flight.lock().expect("breaker mutex poisoned") = false;
            *self.opened_at.lock().expect("breaker mutex poisoned") = None;
            debug!("circuit breaker: half_open -> closed after successful probe");
        }
    }

    fn on_failure(&self) {
        self.last_failure_at_ms.store(superego_core::ids::now_ms(), Ordering::Release);
        let was_half_open = self.state() == BreakerState::HalfOpen;
        if was_half_open {
            *self.probe_in_flight.lock().expect("breaker mutex poisoned") = false;
            *self.opened_at.lock().expect("breaker mutex poisoned") = Some(Instant::now());
            self.state.store(BreakerState::Open as u8, Ordering::Release);
            warn!("circuit breaker: half_open probe failed, re-opening");
            return;
        }

        let count = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        if count >= u64::from(self.config.failure_threshold) {
            self.state.store(BreakerState::Open as u8, Ordering::Release);
            *self.opened_at.lock().expect("breaker mutex poisoned") = Some(Instant::now());
            warn!(failures = count, "circuit breaker: closed -> open, threshold reached");
        }
    }
}
