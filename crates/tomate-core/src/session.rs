//! Pomodoro session.
//!
//! A session owns one [`Timer`] and decides which interval comes next. It
//! listens for the timer's `finished` notification to close the current
//! interval, and answers questions on the `setting` channel about whether a
//! timer setting may change right now.
//!
//! ## Interval rotation
//!
//! - pomodoro → long break every `long_break_interval` completed pomodoros,
//!   short break otherwise
//! - any break → pomodoro

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::{ConfigError, Result};
use crate::events::{channel, Bus, Channel, Payload, Signal};
use crate::fsm::{Machine, Source, Target, Transition};
use crate::observable::Observable;
use crate::plugins::Subscriptions;
use crate::state::State;
use crate::storage::ConfigSource;
use crate::timer::Timer;

/// Section queried for every timer option.
pub const TIMER_SECTION: &str = "Timer";

/// Kind of interval.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    #[default]
    Pomodoro,
    ShortBreak,
    LongBreak,
}

impl SessionType {
    pub fn name(self) -> &'static str {
        match self {
            SessionType::Pomodoro => "pomodoro",
            SessionType::ShortBreak => "shortbreak",
            SessionType::LongBreak => "longbreak",
        }
    }

    /// Config option holding this interval's length in minutes.
    pub fn duration_option(self) -> String {
        format!("{}_duration", self.name())
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SessionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace([' ', '_', '-'], "").as_str() {
            "pomodoro" => Ok(SessionType::Pomodoro),
            "shortbreak" => Ok(SessionType::ShortBreak),
            "longbreak" => Ok(SessionType::LongBreak),
            other => Err(format!("unknown session type '{other}'")),
        }
    }
}

/// A pomodoro that ran to the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSession {
    pub session_type: SessionType,
    /// Seconds.
    pub duration: u64,
    pub finished_at: DateTime<Utc>,
}

/// Snapshot posted with every session event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub current: SessionType,
    pub count: usize,
    pub sessions: Vec<CompletedSession>,
    pub state: State,
    /// Length of the current interval in seconds.
    pub duration: u64,
    pub task_name: String,
}

pub struct Session {
    state: Observable<State>,
    current: Cell<SessionType>,
    history: RefCell<Vec<CompletedSession>>,
    task_name: RefCell<String>,
    timer: Rc<Timer>,
    config: Rc<dyn ConfigSource>,
    channel: Rc<Channel>,
    subscriptions: RefCell<Subscriptions>,
}

impl Machine for Session {
    type State = State;

    fn state(&self) -> State {
        self.state.get()
    }

    fn set_state(&self, state: State) {
        self.state.set(state);
    }
}

const IDLE: &[State] = &[State::Stopped, State::Finished];

impl Session {
    const START: Transition<Session> = Transition::new(
        "session.start",
        Target::To(State::Started),
        Source::Only(IDLE),
        &[],
        Some(Session::emit_started as fn(&Session)),
    );

    const STOP: Transition<Session> = Transition::new(
        "session.stop",
        Target::To(State::Stopped),
        Source::Only(&[State::Started]),
        &[Session::timer_is_running as fn(&Session) -> bool],
        Some(Session::emit_stopped as fn(&Session)),
    );

    const RESET: Transition<Session> = Transition::new(
        "session.reset",
        Target::Unchanged,
        Source::Only(IDLE),
        &[],
        Some(Session::emit_reset as fn(&Session)),
    );

    const END: Transition<Session> = Transition::new(
        "session.end",
        Target::To(State::Finished),
        Source::Only(&[State::Started]),
        &[Session::timer_is_not_running as fn(&Session) -> bool],
        Some(Session::emit_finished as fn(&Session)),
    );

    const CHANGE: Transition<Session> = Transition::new(
        "session.change",
        Target::Unchanged,
        Source::Only(IDLE),
        &[],
        Some(Session::emit_changed as fn(&Session)),
    );

    /// Build a session around `timer` and subscribe it to the bus.
    pub fn new(timer: Rc<Timer>, config: Rc<dyn ConfigSource>, bus: &Bus) -> Rc<Self> {
        let session = Rc::new(Self {
            state: Observable::new(State::Stopped),
            current: Cell::new(SessionType::Pomodoro),
            history: RefCell::new(Vec::new()),
            task_name: RefCell::new(String::new()),
            timer,
            config,
            channel: bus.signal(channel::SESSION),
            subscriptions: RefCell::new(Subscriptions::new()),
        });
        session
            .state
            .observe(|old, new| debug!(from = %old, to = %new, "session state changed"));
        Self::subscribe(&session, bus);
        session
    }

    fn subscribe(session: &Rc<Self>, bus: &Bus) {
        let mut subscriptions = session.subscriptions.borrow_mut();

        let weak: Weak<Session> = Rc::downgrade(session);
        let timer = bus.signal(channel::TIMER);
        let id = timer.connect(Some(Signal::Finished.into()), move |_| {
            if let Some(session) = weak.upgrade() {
                if let Err(e) = session.end() {
                    error!(error = %e, "failed to end session");
                }
            }
        });
        subscriptions.add(&timer, id);

        let weak: Weak<Session> = Rc::downgrade(session);
        let setting = bus.signal(channel::SETTING);
        let id = setting.connect_with_reply(Some("timer".into()), move |_| {
            let accepted = weak.upgrade().map_or(false, |session| session.change(None));
            Value::Bool(accepted)
        });
        subscriptions.add(&setting, id);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> State {
        self.state.get()
    }

    pub fn current(&self) -> SessionType {
        self.current.get()
    }

    /// Completed pomodoros since the last reset.
    pub fn count(&self) -> usize {
        self.history.borrow().len()
    }

    pub fn history(&self) -> Vec<CompletedSession> {
        self.history.borrow().clone()
    }

    pub fn task_name(&self) -> String {
        self.task_name.borrow().clone()
    }

    pub fn timer(&self) -> &Rc<Timer> {
        &self.timer
    }

    /// Length of the current interval in seconds.
    pub fn duration(&self) -> Result<u64> {
        let current = self.current();
        let option = current.duration_option();
        let minutes = self.config.get_int(TIMER_SECTION, &option)?;
        let seconds = u64::try_from(minutes)
            .ok()
            .and_then(|m| m.checked_mul(60))
            .ok_or_else(|| ConfigError::InvalidValue {
                key: option,
                message: format!("duration must be a non-negative number of minutes, got {minutes}"),
            })?;
        Ok(seconds)
    }

    pub fn status(&self) -> Result<SessionStatus> {
        let sessions = self.history();
        Ok(SessionStatus {
            current: self.current(),
            count: sessions.len(),
            sessions,
            state: self.state(),
            duration: self.duration()?,
            task_name: self.task_name(),
        })
    }

    fn timer_is_running(&self) -> bool {
        self.timer.is_running()
    }

    fn timer_is_not_running(&self) -> bool {
        !self.timer_is_running()
    }

    fn long_break_interval(&self) -> Result<u64> {
        let interval = self
            .config
            .get_int(TIMER_SECTION, "Long Break Interval")?;
        match u64::try_from(interval) {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidValue {
                key: "timer.long_break_interval".into(),
                message: format!("must be at least 1, got {interval}"),
            }
            .into()),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start the current interval. Allowed from stopped or finished.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval's duration cannot be read; nothing
    /// changes in that case.
    pub fn start(&self) -> Result<bool> {
        let started = Self::START.try_run(self, |s| {
            let duration = s.duration()?;
            Ok::<_, crate::error::CoreError>(s.timer.start(duration))
        })?;
        Ok(started.unwrap_or(false))
    }

    /// Interrupt the running interval.
    pub fn stop(&self) -> bool {
        Self::STOP.run(self, |s| s.timer.stop()).unwrap_or(false)
    }

    /// Forget every completed pomodoro.
    pub fn reset(&self) -> bool {
        Self::RESET
            .run(self, |s| {
                s.history.borrow_mut().clear();
                true
            })
            .unwrap_or(false)
    }

    /// Close the interval whose timer just finished and pick the next one.
    ///
    /// Normally called from the timer's `finished` notification.
    pub fn end(&self) -> Result<bool> {
        let ended = Self::END.try_run(self, |s| {
            let next = match s.current() {
                SessionType::Pomodoro => {
                    let interval = s.long_break_interval()?;
                    let duration = s.timer.duration();
                    let count = {
                        let mut history = s.history.borrow_mut();
                        history.push(CompletedSession {
                            session_type: SessionType::Pomodoro,
                            duration,
                            finished_at: Utc::now(),
                        });
                        history.len() as u64
                    };
                    if count % interval == 0 {
                        SessionType::LongBreak
                    } else {
                        SessionType::ShortBreak
                    }
                }
                SessionType::ShortBreak | SessionType::LongBreak => SessionType::Pomodoro,
            };
            s.current.set(next);
            Ok::<_, crate::error::CoreError>(true)
        })?;
        Ok(ended.unwrap_or(false))
    }

    /// Switch the interval type while idle. `None` selects a pomodoro.
    pub fn change(&self, session_type: Option<SessionType>) -> bool {
        Self::CHANGE
            .run(self, |s| {
                s.current.set(session_type.unwrap_or_default());
                true
            })
            .unwrap_or(false)
    }

    /// Store a task name. Ignored without notification while started.
    pub fn set_task_name(&self, name: impl Into<String>) -> bool {
        let name = name.into();
        Self::CHANGE
            .run(self, |s| {
                *s.task_name.borrow_mut() = name;
                true
            })
            .unwrap_or(false)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn emit(&self, signal: Signal) {
        match self.status() {
            Ok(status) => {
                self.channel.send(signal, Payload::Session(status));
            }
            Err(e) => error!(signal = ?signal, error = %e, "failed to build session status"),
        }
    }

    fn emit_started(&self) {
        info!(current = %self.current(), task = %self.task_name(), "session started");
        self.emit(Signal::Started);
    }

    fn emit_stopped(&self) {
        self.emit(Signal::Stopped);
    }

    fn emit_reset(&self) {
        self.emit(Signal::Reset);
    }

    fn emit_finished(&self) {
        info!(next = %self.current(), count = self.count(), "session finished");
        self.emit(Signal::Finished);
    }

    fn emit_changed(&self) {
        self.emit(Signal::Changed);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("current", &self.current())
            .field("count", &self.count())
            .field("task_name", &*self.task_name.borrow())
            .field("timer", &self.timer)
            .finish()
    }
}
