mod engine;
mod scheduler;

pub use engine::{format_time_left, Timer, TimerPayload, TICK_INTERVAL};
pub use scheduler::{ManualScheduler, Scheduler, Tick, TokioScheduler, MIN_PERIOD};
