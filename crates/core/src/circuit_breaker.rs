//! Circuit Breaker
//!
//! Per-printer failure gate. A breaker trips open after a burst of failures,
//! rejects calls until a reset timeout elapses, then probes recovery through a
//! half-open state that needs several consecutive successes to close again.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{PrintError, Result};

/// Breaker tuning
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failures within the monitoring window that trip the breaker open
    pub failure_threshold: u32,
    /// Failures older than this decay out of the count
    pub monitoring_window: Duration,
    /// How long an open breaker rejects before allowing a half-open probe
    pub reset_timeout: Duration,
    /// Consecutive half-open successes required to close
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            monitoring_window: Duration::from_secs(300),
            reset_timeout: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

#[derive(Debug)]
struct Breaker {
    state: BreakerState,
    failures: VecDeque<Instant>,
    success_count: u32,
    next_attempt_at: Option<Instant>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failures: VecDeque::new(),
            success_count: 0,
            next_attempt_at: None,
        }
    }

    fn prune(&mut self, window: Duration) {
        let now = Instant::now();
        while let Some(front) = self.failures.front() {
            if now.duration_since(*front) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Gate a call. Performs the open -> half-open transition when the reset
    /// timeout has elapsed; an open breaker inside the timeout rejects.
    fn check(&mut self) -> std::result::Result<(), ()> {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => match self.next_attempt_at {
                Some(at) if Instant::now() >= at => {
                    self.state = BreakerState::HalfOpen;
                    self.success_count = 0;
                    Ok(())
                }
                _ => Err(()),
            },
        }
    }

    fn on_success(&mut self, config: &BreakerConfig) {
        match self.state {
            BreakerState::Closed => {
                self.failures.clear();
            }
            BreakerState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= config.success_threshold {
                    self.state = BreakerState::Closed;
                    self.failures.clear();
                    self.success_count = 0;
                    self.next_attempt_at = None;
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Returns true when this failure tripped the breaker open.
    fn on_failure(&mut self, config: &BreakerConfig) -> bool {
        match self.state {
            BreakerState::Closed => {
                self.failures.push_back(Instant::now());
                self.prune(config.monitoring_window);
                if self.failures.len() as u32 >= config.failure_threshold {
                    self.state = BreakerState::Open;
                    self.next_attempt_at = Some(Instant::now() + config.reset_timeout);
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                self.state = BreakerState::Open;
                self.success_count = 0;
                self.next_attempt_at = Some(Instant::now() + config.reset_timeout);
                true
            }
            BreakerState::Open => {
                self.failures.push_back(Instant::now());
                false
            }
        }
    }

    fn is_available(&self) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            // The next call will transition to half-open.
            BreakerState::Open => self
                .next_attempt_at
                .is_some_and(|at| Instant::now() >= at),
        }
    }
}

/// Per-printer breakers behind one handle.
///
/// Each breaker has its own lock; lookups take a shared read on the map and
/// breakers are created lazily on first contact with a printer.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<Mutex<Breaker>>>>,
    config: BreakerConfig,
    trips: AtomicU64,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            config,
            trips: AtomicU64::new(0),
        }
    }

    fn breaker(&self, printer: &str) -> Arc<Mutex<Breaker>> {
        if let Some(b) = self.breakers.read().get(printer) {
            return b.clone();
        }
        self.breakers
            .write()
            .entry(printer.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Breaker::new())))
            .clone()
    }

    /// Gate a printer interaction; rejects with [`PrintError::BreakerOpen`]
    /// while the breaker is open and inside its reset timeout.
    pub fn check(&self, printer: &str) -> Result<()> {
        let breaker = self.breaker(printer);
        let mut b = breaker.lock();
        let was = b.state;
        b.check()
            .map_err(|_| PrintError::BreakerOpen(printer.to_string()))?;
        if was == BreakerState::Open && b.state == BreakerState::HalfOpen {
            debug!("breaker for '{}' probing recovery (half-open)", printer);
        }
        Ok(())
    }

    pub fn record_success(&self, printer: &str) {
        let breaker = self.breaker(printer);
        let mut b = breaker.lock();
        let was = b.state;
        b.on_success(&self.config);
        if was == BreakerState::HalfOpen && b.state == BreakerState::Closed {
            debug!("breaker for '{}' closed after recovery", printer);
        }
    }

    pub fn record_failure(&self, printer: &str) {
        let breaker = self.breaker(printer);
        let tripped = breaker.lock().on_failure(&self.config);
        if tripped {
            self.trips.fetch_add(1, Ordering::Relaxed);
            warn!(
                "breaker for '{}' opened, rejecting for {:?}",
                printer, self.config.reset_timeout
            );
        }
    }

    /// True for closed and half-open breakers, and for open breakers whose
    /// reset timeout has elapsed (the next call will transition).
    pub fn is_available(&self, printer: &str) -> bool {
        match self.breakers.read().get(printer) {
            Some(b) => b.lock().is_available(),
            None => true,
        }
    }

    pub fn state(&self, printer: &str) -> BreakerState {
        match self.breakers.read().get(printer) {
            Some(b) => b.lock().state,
            None => BreakerState::Closed,
        }
    }

    /// Total number of closed/half-open -> open transitions since startup
    pub fn trip_count(&self) -> u64 {
        self.trips.load(Ordering::Relaxed)
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(threshold: u32, reset_ms: u64, successes: u32) -> BreakerRegistry {
        BreakerRegistry::new(BreakerConfig {
            failure_threshold: threshold,
            monitoring_window: Duration::from_secs(300),
            reset_timeout: Duration::from_millis(reset_ms),
            success_threshold: successes,
        })
    }

    #[test]
    fn stays_closed_below_threshold() {
        let r = registry(3, 60_000, 3);
        r.record_failure("P");
        r.record_failure("P");
        assert_eq!(r.state("P"), BreakerState::Closed);
        assert!(r.check("P").is_ok());
    }

    #[test]
    fn opens_at_exactly_threshold_failures() {
        let r = registry(3, 60_000, 3);
        for _ in 0..3 {
            r.record_failure("P");
        }
        assert_eq!(r.state("P"), BreakerState::Open);
        assert_eq!(r.trip_count(), 1);
        assert!(matches!(r.check("P"), Err(PrintError::BreakerOpen(p)) if p == "P"));
        assert!(!r.is_available("P"));
    }

    #[test]
    fn success_resets_closed_failure_count() {
        let r = registry(3, 60_000, 3);
        r.record_failure("P");
        r.record_failure("P");
        r.record_success("P");
        r.record_failure("P");
        r.record_failure("P");
        assert_eq!(r.state("P"), BreakerState::Closed);
    }

    #[test]
    fn transitions_to_half_open_after_reset_timeout() {
        let r = registry(1, 20, 2);
        r.record_failure("P");
        assert_eq!(r.state("P"), BreakerState::Open);
        std::thread::sleep(Duration::from_millis(30));
        assert!(r.is_available("P"));
        assert!(r.check("P").is_ok());
        assert_eq!(r.state("P"), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let r = registry(1, 10, 3);
        r.record_failure("P");
        std::thread::sleep(Duration::from_millis(20));
        r.check("P").unwrap();
        r.record_success("P");
        r.record_success("P");
        assert_eq!(r.state("P"), BreakerState::HalfOpen);
        r.record_success("P");
        assert_eq!(r.state("P"), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_with_new_deadline() {
        let r = registry(1, 10, 3);
        r.record_failure("P");
        std::thread::sleep(Duration::from_millis(20));
        r.check("P").unwrap();
        r.record_failure("P");
        assert_eq!(r.state("P"), BreakerState::Open);
        assert!(matches!(r.check("P"), Err(PrintError::BreakerOpen(_))));
        assert_eq!(r.trip_count(), 2);
    }

    #[test]
    fn breakers_are_isolated_per_printer() {
        let r = registry(1, 60_000, 3);
        r.record_failure("P1");
        assert_eq!(r.state("P1"), BreakerState::Open);
        assert_eq!(r.state("P2"), BreakerState::Closed);
        assert!(r.check("P2").is_ok());
    }

    #[test]
    fn unknown_printer_is_available() {
        let r = registry(1, 60_000, 3);
        assert!(r.is_available("never-seen"));
    }
}
