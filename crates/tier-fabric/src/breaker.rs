//! Per-tier circuit breaker: closed/open/half-open, tripped by a rolling
//! error rate and reset after a cooldown window.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Tracks recent call outcomes for one tier and decides whether a call
/// should be attempted at all.
pub struct Breaker {
    failures: AtomicU32,
    attempts: AtomicU32,
    opened_at: AtomicU64,
    probe_in_flight: AtomicBool,
    error_threshold_pct: u8,
    min_attempts: u32,
    reset_after: Duration,
    call_timeout: Duration,
    epoch: Instant,
}

impl Breaker {
    pub fn new(error_threshold_pct: u8, min_attempts: u32, reset_after: Duration, call_timeout: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            probe_in_flight: AtomicBool::new(false),
            error_threshold_pct,
            min_attempts,
            reset_after,
            call_timeout,
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub fn state(&self) -> BreakerState {
        let opened_at = self.opened_at.load(Ordering::Acquire);
        if opened_at == 0 {
            return BreakerState::Closed;
        }
        if self.now_ms().saturating_sub(opened_at) >= self.reset_after.as_millis() as u64 {
            BreakerState::HalfOpen
        } else {
            BreakerState::Open
        }
    }

    /// Whether a call may proceed. Half-open lets exactly one concurrent
    /// probe through, guarded by `probe_in_flight` rather than the open
    /// timestamp so the probe's own outcome doesn't re-derive the state.
    pub fn allow(&self) -> bool {
        match self.state() {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => self
                .probe_in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
        }
    }

    pub fn record_success(&self) {
        if self.probe_in_flight.swap(false, Ordering::AcqRel) {
            self.reset();
            return;
        }
        self.bump(false);
    }

    pub fn record_failure(&self) {
        if self.probe_in_flight.swap(false, Ordering::AcqRel) {
            self.trip();
            return;
        }
        self.bump(true);
    }

    fn bump(&self, failed: bool) {
        let attempts = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        let failures = if failed {
            self.failures.fetch_add(1, Ordering::AcqRel) + 1
        } else {
            self.failures.load(Ordering::Acquire)
        };
        if attempts >= self.min_attempts {
            let pct = (failures as u64 * 100 / attempts as u64) as u8;
            if pct >= self.error_threshold_pct {
                self.trip();
            }
        }
    }

    fn trip(&self) {
        self.opened_at.store(self.now_ms().max(1), Ordering::Release);
    }

    fn reset(&self) {
        self.opened_at.store(0, Ordering::Release);
        self.attempts.store(0, Ordering::Release);
        self.failures.store(0, Ordering::Release);
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold() {
        let breaker = Breaker::new(50, 4, Duration::from_millis(50), Duration::from_secs(1));
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[tokio::test]
    async fn half_opens_after_reset_window() {
        let breaker = Breaker::new(50, 2, Duration::from_millis(20), Duration::from_secs(1));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.allow());
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
