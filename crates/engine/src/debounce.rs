//! Keystroke debounce for re-filtering large record sets.
//!
//! Small sessions re-filter on every keystroke. Above the threshold each
//! keystroke pushes a single deadline forward; the host polls and
//! re-filters once the deadline passes. At most one deadline is armed.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refilter {
    /// Re-filter now
    Immediate,
    /// Wait for `poll` to fire
    Deferred,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    threshold: usize,
    delay: Duration,
    deadline: Option<Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(2000, Duration::from_millis(250))
    }
}

impl Debouncer {
    pub fn new(threshold: usize, delay: Duration) -> Self {
        Self {
            threshold,
            delay,
            deadline: None,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Register a keystroke. Any armed deadline is replaced.
    pub fn keystroke(&mut self, record_count: usize, now: Instant) -> Refilter {
        if record_count <= self.threshold || self.delay.is_zero() {
            self.deadline = None;
            return Refilter::Immediate;
        }
        self.deadline = Some(now + self.delay);
        Refilter::Deferred
    }

    /// True exactly once when the armed deadline has passed
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
