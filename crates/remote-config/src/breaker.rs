//! Circuit breaker guarding the remote config fetch path. Same
//! closed/open/half-open state machine `tier-fabric` uses for its tiers;
//! kept as a separate small copy here since `remote-config` must not
//! depend on `tier-fabric` (the fabric reads sampling rates *from* this
//! crate, not the other way around).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

pub struct Breaker {
    failures: AtomicU32,
    attempts: AtomicU32,
    opened_at: AtomicU64,
    probe_in_flight: AtomicBool,
    error_threshold_pct: u8,
    min_attempts: u32,
    reset_after: Duration,
    epoch: Instant,
}

impl Breaker {
    pub fn new(error_threshold_pct: u8, min_attempts: u32, reset_after: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            probe_in_flight: AtomicBool::new(false),
            error_threshold_pct,
            min_attempts,
            reset_after,
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold() {
        let breaker = Breaker::new(50, 4, Duration::from_millis(50));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }
}
