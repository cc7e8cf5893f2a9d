//! Consecutive-failure circuit breaker guarding the search read path.
//!
//! ```text
//! ┌─────────┐  failures >= threshold  ┌────────┐
//! │ CLOSED  │ ──────────────────────> │  OPEN  │
//! └─────────┘                         └────────┘
//!      ^                                   │
//!      │                                   │ open timeout elapsed
//!      │                                   v
//!      │      probe succeeds      ┌─────────────┐
//!      └───────────────────────── │ HALF-OPEN   │
//!                                 └─────────────┘
//!                                        │
//!                     probe fails        │
//!                     (back to OPEN) ────┘
//! ```
//!
//! ```rust,ignore
//! match breaker.try_acquire() {
//!     Some(permit) => {
//!         let result = backend.search(&cancel, &params).await;
//!         permit.record(result.is_ok());
//!     }
//!     None => { /* fail fast */ }
//! }
//! ```

use core_config::search::SearchConfig;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use strum::{Display, IntoStaticStr};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures in `closed` that open the circuit
    pub failure_threshold: u32,
    /// Time spent `open` before a probe is let through
    pub open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_timeout: Duration::from_secs(120),
        }
    }
}

impl From<&SearchConfig> for BreakerConfig {
    fn from(config: &SearchConfig) -> Self {
        Self {
            failure_threshold: config.breaker_failure_threshold.max(1),
            open_timeout: config.breaker_open_timeout,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Shared breaker; every state change happens under one lock.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// May the caller proceed? The permit must be settled with
    /// [`BreakerPermit::record`]; dropping it unsettled records nothing.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        let mut inner = self.lock();
        let probe = match inner.state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= self.config.open_timeout);
                if !elapsed {
                    return None;
                }
                self.transition(&mut inner, BreakerState::HalfOpen);
                inner.probe_in_flight = true;
                true
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    return None;
                }
                inner.probe_in_flight = true;
                true
            }
        };

        Some(BreakerPermit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    fn record(&self, probe: bool, success: bool) {
        let mut inner = self.lock();
        if probe {
            inner.probe_in_flight = false;
        }

        match (inner.state, success) {
            (BreakerState::Closed, true) => inner.consecutive_failures = 0,
            (BreakerState::Closed, false) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.trip(&mut inner);
                }
            }
            (BreakerState::HalfOpen, true) if probe => {
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                self.transition(&mut inner, BreakerState::Closed);
            }
            (BreakerState::HalfOpen, false) if probe => self.trip(&mut inner),
            // Outcomes of calls admitted before the circuit opened.
            _ => {}
        }
    }

    fn release_probe(&self) {
        self.lock().probe_in_flight = false;
    }

    fn trip(&self, inner: &mut Inner) {
        inner.opened_at = Some(Instant::now());
        self.transition(inner, BreakerState::Open);
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;

        warn!(
            breaker = self.name,
            from = %from,
            to = %to,
            failures = inner.consecutive_failures,
            "Circuit breaker state changed"
        );
        let label: &'static str = to.into();
        metrics::counter!("search_breaker_transitions_total", "to" => label).increment(1);
    }
}

/// Admission to one guarded call.
#[must_use = "record the outcome of the guarded call"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    pub fn record(mut self, success: bool) {
        self.settled = true;
        self.breaker.record(self.probe, success);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        // An abandoned probe lets the next caller probe instead.
        if !self.settled && self.probe {
            self.breaker.release_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(open_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "search",
            BreakerConfig {
                failure_threshold: 3,
                open_timeout,
            },
        )
    }

    fn fail(breaker: &CircuitBreaker, times: usize) {
        for _ in 0..times {
            breaker.try_acquire().unwrap().record(false);
        }
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let breaker = breaker(Duration::from_secs(120));

        fail(&breaker, 2);
        assert_eq!(breaker.state(), BreakerState::Closed);

        fail(&breaker, 1);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = breaker(Duration::from_secs(120));

        fail(&breaker, 2);
        breaker.try_acquire().unwrap().record(true);
        fail(&breaker, 2);

        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_single_probe_after_timeout() {
        let breaker = breaker(Duration::ZERO);
        fail(&breaker, 3);

        let probe = breaker.try_acquire().unwrap();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.try_acquire().is_none());

        probe.record(true);
        assert_eq!(breaker.state(), BreakerState::Closed);

        // Counter was reset by the successful probe.
        fail(&breaker, 2);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let breaker = breaker(Duration::from_millis(50));
        fail(&breaker, 3);
        std::thread::sleep(Duration::from_millis(60));

        breaker.try_acquire().unwrap().record(false);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[test]
    fn test_abandoned_probe_frees_the_slot() {
        let breaker = breaker(Duration::ZERO);
        fail(&breaker, 3);

        drop(breaker.try_acquire().unwrap());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.try_acquire().is_some());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(BreakerState::HalfOpen.to_string(), "half-open");
        assert_eq!(BreakerState::Closed.to_string(), "closed");
    }
}
