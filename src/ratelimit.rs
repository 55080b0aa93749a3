/// Dual sliding-window rate limiter for the NOAA CDO API.
///
/// The provider enforces two quotas: 5 requests per second and 10,000
/// requests per day. Each is tracked by a [`SlidingWindow`] holding the
/// timestamps of the most recent calls. The two windows react differently
/// when full:
///
/// - **short window**: sleep until the oldest entry leaves the span, then
///   record the call at its effective (post-sleep) time;
/// - **long window**: fail with [`QuotaExceeded`]; the caller persists the
///   ledger and ends the run. Sleeping most of a day is not an option.
///
/// All times are Unix epoch seconds as `f64`. [`RateLimiter::acquire`] must
/// be called exactly once per HTTP request, since capacity is counted in
/// entries rather than wall-clock rate.

use chrono::Utc;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

use crate::config::{RateLimitConfig, WindowConfig};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of time and blocking delay for the limiter.
pub trait Clock {
    /// Current time in epoch seconds.
    fn now(&self) -> f64;
    /// Blocks for `secs` seconds.
    fn sleep(&self, secs: f64);
}

/// Wall clock backed by `chrono::Utc` and `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }

    fn sleep(&self, secs: f64) {
        if secs > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(secs));
        }
    }
}

// ---------------------------------------------------------------------------
// Sliding window
// ---------------------------------------------------------------------------

/// Decision for a prospective call against one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Call may proceed now.
    Immediate,
    /// Window is full; the oldest entry leaves the span after this many seconds.
    Wait(f64),
}

/// Fixed-capacity FIFO of call timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct SlidingWindow {
    entries: VecDeque<f64>,
    max_entries: usize,
    span_secs: f64,
}

impl SlidingWindow {
    pub fn new(config: WindowConfig) -> Self {
        Self::with_entries(config, Vec::new())
    }

    /// Restores a window from persisted timestamps, keeping only the newest
    /// `max_entries`.
    pub fn with_entries(config: WindowConfig, entries: Vec<f64>) -> Self {
        let mut window = Self {
            entries: VecDeque::with_capacity(config.max_entries + 1),
            max_entries: config.max_entries,
            span_secs: config.span_secs,
        };
        for ts in entries {
            window.record(ts);
        }
        window
    }

    /// Checks whether a call at `now` fits without recording it.
    pub fn admit(&self, now: f64) -> Admission {
        if self.entries.len() < self.max_entries {
            return Admission::Immediate;
        }

        match self.entries.front() {
            Some(&oldest) if now - oldest < self.span_secs => {
                Admission::Wait(self.span_secs - (now - oldest))
            }
            _ => Admission::Immediate,
        }
    }

    /// Records a call and evicts the oldest entries beyond capacity.
    pub fn record(&mut self, ts: f64) {
        self.entries.push_back(ts);
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    /// Seconds between `now` and the oldest recorded call.
    pub fn elapsed_since_oldest(&self, now: f64) -> Option<f64> {
        self.entries.front().map(|oldest| now - oldest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Timestamps in insertion order, oldest first.
    pub fn entries(&self) -> Vec<f64> {
        self.entries.iter().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// Limiter
// ---------------------------------------------------------------------------

/// The long window is full: the daily quota is spent.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{calls} calls per day limit reached in {:.2} hours", .elapsed_secs / 3600.0)]
pub struct QuotaExceeded {
    pub calls: usize,
    pub elapsed_secs: f64,
}

/// Both provider windows, owned by the ingest run.
pub struct RateLimiter<C: Clock = SystemClock> {
    short: SlidingWindow,
    long: SlidingWindow,
    clock: C,
    slept_secs: f64,
}

impl RateLimiter<SystemClock> {
    /// Limiter on the wall clock, with the long window restored from the
    /// quota ledger.
    pub fn new(config: &RateLimitConfig, long_history: Vec<f64>) -> Self {
        Self::with_clock(config, long_history, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(config: &RateLimitConfig, long_history: Vec<f64>, clock: C) -> Self {
        Self {
            short: SlidingWindow::new(config.short),
            long: SlidingWindow::with_entries(config.long, long_history),
            clock,
            slept_secs: 0.0,
        }
    }

    /// Admits one request, sleeping if the burst window is full.
    ///
    /// # Errors
    /// [`QuotaExceeded`] when the daily window is full. Nothing is recorded
    /// in the daily window in that case, so the ledger keeps exactly
    /// `max_entries` calls.
    pub fn acquire(&mut self) -> Result<(), QuotaExceeded> {
        let now = self.clock.now();
        match self.short.admit(now) {
            Admission::Immediate => self.short.record(now),
            Admission::Wait(delay) => {
                log::debug!("Rate limit: sleeping {:.3}s", delay);
                self.clock.sleep(delay);
                self.slept_secs += delay;
                self.short.record(now + delay);
            }
        }

        let now = self.clock.now();
        match self.long.admit(now) {
            Admission::Immediate => {
                self.long.record(now);
                Ok(())
            }
            Admission::Wait(_) => Err(QuotaExceeded {
                calls: self.long.len(),
                elapsed_secs: self.long.elapsed_since_oldest(now).unwrap_or_default(),
            }),
        }
    }

    /// Long-window contents for the quota ledger.
    pub fn long_window(&self) -> &SlidingWindow {
        &self.long
    }

    pub fn short_window(&self) -> &SlidingWindow {
        &self.short
    }

    /// Calls still available in the daily window right now.
    pub fn remaining_daily(&self) -> usize {
        self.long.max_entries().saturating_sub(self.long.len())
    }

    /// Total time spent sleeping on the burst window.
    pub fn slept_secs(&self) -> f64 {
        self.slept_secs
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

// ---------------------------------------------------------------------------
// Test clock
// ---------------------------------------------------------------------------

/// Virtual clock: `sleep` advances time instantly.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ManualClock {
    now: std::cell::Cell<f64>,
    sleeps: std::cell::RefCell<Vec<f64>>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn starting_at(now: f64) -> Self {
        let clock = Self::default();
        clock.now.set(now);
        clock
    }

    pub(crate) fn advance(&self, secs: f64) {
        self.now.set(self.now.get() + secs);
    }

    pub(crate) fn sleeps(&self) -> Vec<f64> {
        self.sleeps.borrow().clone()
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn sleep(&self, secs: f64) {
        self.sleeps.borrow_mut().push(secs);
        self.advance(secs);
    }
}
