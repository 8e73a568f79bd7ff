//! # Tomate Core Library
//!
//! Business logic of the Tomate pomodoro timer: a countdown [`Timer`], the
//! [`Session`] that rotates between pomodoros and breaks, and the event bus
//! that connects them to each other and to whatever UI sits on top.
//!
//! ## Architecture
//!
//! - **Event bus**: named channels with synchronous, ordered delivery
//! - **State machines**: Timer and Session guard each operation with a
//!   declarative [`Transition`]; disallowed calls return `false`
//! - **Scheduler**: the timer is ticked through a [`Scheduler`] so hosts
//!   choose the clock (tokio, or manual ticks in tests)
//! - **Storage**: TOML-shaped configuration that announces every change
//!
//! Everything runs on one thread. Types use `Rc` and interior mutability and
//! are not `Send`.

pub mod app;
pub mod error;
pub mod events;
pub mod fsm;
pub mod observable;
pub mod plugins;
pub mod session;
pub mod state;
pub mod storage;
pub mod timer;

pub use app::Tomate;
pub use error::{ConfigError, CoreError};
pub use events::{Bus, Channel, Event, ListenerId, Payload, Sender, Signal};
pub use fsm::{Machine, Rejected, Source, Target, Transition};
pub use observable::Observable;
pub use plugins::{Plugin, PluginHost, Subscriptions};
pub use session::{CompletedSession, Session, SessionStatus, SessionType};
pub use state::State;
pub use storage::{Config, ConfigSource, SettingAction, SettingChange, SharedConfig};
pub use timer::{format_time_left, ManualScheduler, Scheduler, Timer, TimerPayload, TokioScheduler};
