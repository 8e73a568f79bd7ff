//! Periodic callback scheduling.
//!
//! The timer never sleeps or spawns on its own; it asks a [`Scheduler`] to
//! call it back every period until the callback returns `false`.

use std::cell::RefCell;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

/// Shortest period an accelerated scheduler will wait between calls.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Repeating callback. Returning `false` cancels it.
pub type Tick = Box<dyn FnMut() -> bool>;

pub trait Scheduler {
    /// Call `callback` every `period` until it returns `false`.
    fn every(&self, period: Duration, callback: Tick);
}

/// Runs callbacks on the current tokio `LocalSet`.
///
/// `every` uses `tokio::task::spawn_local` and panics when called outside a
/// `LocalSet`.
#[derive(Debug, Clone, Copy)]
pub struct TokioScheduler {
    speedup: f64,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self { speedup: 1.0 }
    }

    /// Divide every requested period by `factor`. Factors below 1 and
    /// non-finite ones are ignored; periods never drop below [`MIN_PERIOD`].
    pub fn accelerated(factor: f64) -> Self {
        let speedup = if factor.is_finite() && factor > 1.0 {
            factor
        } else {
            1.0
        };
        Self { speedup }
    }

    pub fn speedup(&self) -> f64 {
        self.speedup
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn every(&self, period: Duration, mut callback: Tick) {
        let period = period.div_f64(self.speedup).max(MIN_PERIOD);
        tokio::task::spawn_local(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !callback() {
                    trace!("periodic callback cancelled itself");
                    break;
                }
            }
        });
    }
}

/// Scheduler driven by hand: each [`fire`](ManualScheduler::fire) runs every
/// pending callback once.
///
/// Useful in tests and for hosts whose own loop owns the clock.
#[derive(Default)]
pub struct ManualScheduler {
    pending: RefCell<Vec<Tick>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one round. Callbacks that return `false` are dropped; callbacks
    /// registered during the round first run on the next one. Returns the
    /// number of callbacks still pending.
    pub fn fire(&self) -> usize {
        let due = std::mem::take(&mut *self.pending.borrow_mut());
        let mut alive: Vec<Tick> = Vec::with_capacity(due.len());
        for mut callback in due {
            if callback() {
                alive.push(callback);
            }
        }

        let mut pending = self.pending.borrow_mut();
        alive.append(&mut pending);
        *pending = alive;
        pending.len()
    }

    /// Fire `rounds` times.
    pub fn fire_n(&self, rounds: usize) -> usize {
        let mut left = self.pending();
        for _ in 0..rounds {
            left = self.fire();
        }
        left
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl Scheduler for ManualScheduler {
    fn every(&self, _period: Duration, callback: Tick) {
        self.pending.borrow_mut().push(callback);
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
