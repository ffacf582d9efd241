//! Circuit breaker guarding the downstream write path.
//!
//! One instance per downstream target, owned by the service state and
//! shared across all in-flight requests. Any write failure opens the
//! breaker for a cooldown; while open, writes are skipped without a
//! network call. The first check after the cooldown expires admits a
//! single probe request (half-open); a probe success fully closes the
//! breaker, a probe failure re-opens it. Admission is tracked by a
//! [`WritePermit`] so a handler cancelled mid-write (client disconnect)
//! re-arms the cooldown instead of leaving the probe slot occupied
//! forever.
//!
//! Failure diagnostics are throttled to at most one per
//! `error_print_interval` so a downstream outage cannot turn into a log
//! storm of its own.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open { until: Instant },
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    duration: Duration,
    error_interval: Duration,
    state: Mutex<State>,
    last_logged: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(duration: Duration, error_interval: Duration) -> Self {
        Self {
            duration,
            error_interval,
            state: Mutex::new(State::Closed),
            last_logged: Mutex::new(None),
        }
    }

    /// Permission for a write attempt right now, or `None` to skip it.
    ///
    /// An expired open breaker flips to half-open and admits exactly the
    /// calling request as the probe; concurrent requests keep being
    /// skipped until the probe's permit reports back or is dropped.
    pub fn allow_request(&self) -> Option<WritePermit<'_>> {
        let mut state = self.state.lock().unwrap();
        match *state {
            State::Closed => Some(WritePermit {
                breaker: self,
                probe: false,
                reported: false,
            }),
            State::Open { until } => {
                if Instant::now() >= until {
                    *state = State::HalfOpen;
                    Some(WritePermit {
                        breaker: self,
                        probe: true,
                        reported: false,
                    })
                } else {
                    None
                }
            }
            State::HalfOpen => None,
        }
    }

    /// Read-only open check for `/health`. Never transitions state, so
    /// probing the health endpoint cannot consume the half-open slot.
    pub fn is_open(&self) -> bool {
        match *self.state.lock().unwrap() {
            State::Closed => false,
            State::Open { until } => Instant::now() < until,
            State::HalfOpen => true,
        }
    }

    /// Record a downstream write failure: opens the breaker for the
    /// configured cooldown and emits a throttled diagnostic.
    pub fn record_failure(&self, error: &dyn std::fmt::Display) {
        let until = Instant::now() + self.duration;
        *self.state.lock().unwrap() = State::Open { until };

        if self.should_emit_diagnostic() {
            tracing::warn!(
                error = %error,
                pause_secs = self.duration.as_secs(),
                "downstream write failed, pausing writes"
            );
        }
    }

    /// Record a successful write, fully closing the breaker.
    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        if *state != State::Closed {
            *state = State::Closed;
            drop(state);
            tracing::info!("downstream connection restored, resuming writes");
        }
    }

    fn rearm(&self) {
        let until = Instant::now() + self.duration;
        *self.state.lock().unwrap() = State::Open { until };
    }

    /// Shared log throttle: true at most once per `error_print_interval`.
    /// Used by both failure recording and open-skip diagnostics.
    pub fn should_emit_diagnostic(&self) -> bool {
        let mut last = self.last_logged.lock().unwrap();
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.error_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Permission to attempt one downstream write.
///
/// Report the outcome with [`success`](Self::success) or
/// [`failure`](Self::failure). A probe permit dropped without a report
/// means the handler was cancelled mid-write; the drop re-arms the
/// cooldown so the half-open slot cannot stay occupied forever.
#[derive(Debug)]
pub struct WritePermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    reported: bool,
}

impl WritePermit<'_> {
    pub fn success(mut self) {
        self.reported = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self, error: &dyn std::fmt::Display) {
        self.reported = true;
        self.breaker.record_failure(error);
    }
}

impl Drop for WritePermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.reported {
            self.breaker.rearm();
            if self.breaker.should_emit_diagnostic() {
                tracing::warn!("probe cancelled before completion, keeping writes paused");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> &'static str {
        "connection refused"
    }

    #[test]
    fn starts_closed_and_allows_requests() {
        let breaker = CircuitBreaker::new(Duration::from_secs(60), Duration::from_secs(10));
        assert!(!breaker.is_open());
        assert!(breaker.allow_request().is_some());
    }

    #[test]
    fn failure_opens_for_the_cooldown() {
        let breaker = CircuitBreaker::new(Duration::from_secs(60), Duration::from_secs(10));
        breaker.record_failure(&failure());
        assert!(breaker.is_open());
        assert!(breaker.allow_request().is_none());
    }

    #[test]
    fn expired_breaker_admits_exactly_one_probe() {
        let breaker = CircuitBreaker::new(Duration::ZERO, Duration::from_secs(10));
        breaker.record_failure(&failure());

        // Cooldown of zero: first check flips to half-open and is the probe
        let probe = breaker.allow_request();
        assert!(probe.is_some());
        // Concurrent requests during the probe are still skipped
        assert!(breaker.allow_request().is_none());
        assert!(breaker.is_open());
        probe.unwrap().success();
    }

    #[test]
    fn probe_success_fully_closes() {
        let breaker = CircuitBreaker::new(Duration::ZERO, Duration::from_secs(10));
        breaker.record_failure(&failure());

        breaker.allow_request().unwrap().success();
        assert!(!breaker.is_open());
        assert!(breaker.allow_request().is_some());
        assert!(breaker.allow_request().is_some());
    }

    #[test]
    fn probe_failure_reopens() {
        let breaker = CircuitBreaker::new(Duration::from_secs(60), Duration::from_secs(10));
        breaker.record_failure(&failure());

        // Not expired yet: no probe
        assert!(breaker.allow_request().is_none());

        let breaker = CircuitBreaker::new(Duration::ZERO, Duration::from_secs(10));
        breaker.record_failure(&failure());
        breaker.allow_request().unwrap().failure(&failure());
        // Cooldown restarted; zero duration means the next check probes again
        let probe = breaker.allow_request();
        assert!(probe.is_some());
        assert!(breaker.allow_request().is_none());
    }

    #[test]
    fn cancelled_probe_rearms_the_cooldown() {
        let breaker = CircuitBreaker::new(Duration::ZERO, Duration::from_secs(10));
        breaker.record_failure(&failure());

        // A handler cancelled mid-write drops its permit without a report
        let probe = breaker.allow_request().unwrap();
        drop(probe);

        // Re-armed open, not wedged half-open: a fresh probe is admitted
        let probe = breaker.allow_request();
        assert!(probe.is_some());
        assert!(breaker.allow_request().is_none());
    }

    #[test]
    fn dropped_permit_in_closed_state_has_no_effect() {
        let breaker = CircuitBreaker::new(Duration::from_secs(60), Duration::from_secs(10));
        drop(breaker.allow_request().unwrap());
        assert!(!breaker.is_open());
        assert!(breaker.allow_request().is_some());
    }

    #[test]
    fn diagnostics_are_throttled() {
        let breaker = CircuitBreaker::new(Duration::from_secs(60), Duration::from_secs(10));
        assert!(breaker.should_emit_diagnostic());
        assert!(!breaker.should_emit_diagnostic());

        let breaker = CircuitBreaker::new(Duration::from_secs(60), Duration::ZERO);
        assert!(breaker.should_emit_diagnostic());
        assert!(breaker.should_emit_diagnostic());
    }
}
