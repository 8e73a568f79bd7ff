//! Countdown timer.
//!
//! The timer counts whole seconds down from the duration given to `start`.
//! It does not own a thread or a clock: on start it registers a callback with
//! its [`Scheduler`], and each callback invocation is one tick.
//!
//! ## State Transitions
//!
//! ```text
//! Stopped -> Started -> (Started on tick) -> Finished -> Started
//!               |
//!               '--- stop() ---> Stopped
//! ```
//!
//! Every transition posts one event on the `timer` channel, tagged with the
//! resulting [`Signal`] and carrying a [`TimerPayload`].

use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::scheduler::Scheduler;
use crate::events::{channel, Bus, Channel, Payload, Signal};
use crate::fsm::{Machine, Source, Target, Transition};
use crate::observable::Observable;
use crate::state::State;

/// How often a running timer asks to be ticked.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot posted with every timer event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimerPayload {
    pub time_left: u64,
    pub duration: u64,
    pub ratio: f64,
}

/// Countdown engine.
pub struct Timer {
    state: Observable<State>,
    duration: Cell<u64>,
    time_left: Cell<u64>,
    /// Bumped on every start so callbacks from an earlier run retire.
    run: Cell<u64>,
    channel: Rc<Channel>,
    scheduler: Rc<dyn Scheduler>,
    this: Weak<Timer>,
}

impl Machine for Timer {
    type State = State;

    fn state(&self) -> State {
        self.state.get()
    }

    fn set_state(&self, state: State) {
        self.state.set(state);
    }
}

impl Timer {
    const START: Transition<Timer> = Transition::new(
        "timer.start",
        Target::To(State::Started),
        Source::Only(&[State::Stopped, State::Finished]),
        &[],
        Some(Timer::emit_started as fn(&Timer)),
    );

    const STOP: Transition<Timer> = Transition::new(
        "timer.stop",
        Target::To(State::Stopped),
        Source::Only(&[State::Started]),
        &[],
        Some(Timer::emit_stopped as fn(&Timer)),
    );

    const UPDATE: Transition<Timer> = Transition::new(
        "timer.update",
        Target::Unchanged,
        Source::Only(&[State::Started]),
        &[],
        Some(Timer::emit_changed as fn(&Timer)),
    );

    const END: Transition<Timer> = Transition::new(
        "timer.end",
        Target::To(State::Finished),
        Source::Only(&[State::Started]),
        &[],
        Some(Timer::emit_finished as fn(&Timer)),
    );

    pub fn new(bus: &Bus, scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        let timer = Rc::new_cyclic(|this| Self {
            state: Observable::new(State::Stopped),
            duration: Cell::new(0),
            time_left: Cell::new(0),
            run: Cell::new(0),
            channel: bus.signal(channel::TIMER),
            scheduler,
            this: this.clone(),
        });
        timer
            .state
            .observe(|old, new| debug!(from = %old, to = %new, "timer state changed"));
        timer
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> State {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == State::Started
    }

    pub fn duration(&self) -> u64 {
        self.duration.get()
    }

    pub fn time_left(&self) -> u64 {
        self.time_left.get()
    }

    /// Elapsed fraction of the current run, rounded to one decimal place
    /// with ties to even. Zero when no duration is set.
    pub fn ratio(&self) -> f64 {
        let duration = self.duration.get();
        if duration == 0 {
            return 0.0;
        }
        let ratio = 1.0 - self.time_left.get() as f64 / duration as f64;
        (ratio * 10.0).round_ties_even() / 10.0
    }

    pub fn payload(&self) -> TimerPayload {
        TimerPayload {
            time_left: self.time_left(),
            duration: self.duration(),
            ratio: self.ratio(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start counting down from `seconds`. Allowed from stopped or finished.
    pub fn start(&self, seconds: u64) -> bool {
        Self::START
            .run(self, |t| {
                t.duration.set(seconds);
                t.time_left.set(seconds);
                t.schedule();
                true
            })
            .unwrap_or(false)
    }

    /// Abort a running countdown and clear both counters.
    pub fn stop(&self) -> bool {
        Self::STOP
            .run(self, |t| {
                t.duration.set(0);
                t.time_left.set(0);
                true
            })
            .unwrap_or(false)
    }

    /// One tick. Returns whether the scheduler should keep calling.
    ///
    /// A tick that arrives after `stop` is ignored.
    pub fn tick(&self) -> bool {
        if !self.is_running() {
            return false;
        }

        if self.time_left.get() == 0 {
            self.end();
            return false;
        }

        Self::UPDATE
            .run(self, |t| {
                t.time_left.set(t.time_left.get() - 1);
                true
            })
            .unwrap_or(false)
    }

    fn end(&self) -> bool {
        Self::END.run(self, |_| true).unwrap_or(false)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn schedule(&self) {
        let run = self.run.get() + 1;
        self.run.set(run);

        let this = self.this.clone();
        self.scheduler.every(
            TICK_INTERVAL,
            Box::new(move || match this.upgrade() {
                Some(timer) if timer.run.get() == run => timer.tick(),
                _ => false,
            }),
        );
    }

    fn emit(&self, signal: Signal) {
        self.channel.send(signal, Payload::Timer(self.payload()));
    }

    fn emit_started(&self) {
        self.emit(Signal::Started);
    }

    fn emit_stopped(&self) {
        self.emit(Signal::Stopped);
    }

    fn emit_changed(&self) {
        self.emit(Signal::Changed);
    }

    fn emit_finished(&self) {
        self.emit(Signal::Finished);
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("state", &self.state())
            .field("duration", &self.duration())
            .field("time_left", &self.time_left())
            .finish()
    }
}

/// Render seconds as `MM:SS`.
pub fn format_time_left(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
