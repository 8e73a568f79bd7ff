//! Integration tests for the session/timer pair.
//!
//! Drives the full application wiring through a manual scheduler and checks
//! what reaches the bus.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;
use tomate_core::events::channel;
use tomate_core::{
    Config, Event, ManualScheduler, Payload, Sender, SessionType, Signal, State, Tomate,
};

struct Harness {
    app: Tomate,
    scheduler: Rc<ManualScheduler>,
    session_events: Rc<RefCell<Vec<Event>>>,
}

fn harness(toml: &str) -> Harness {
    let config = Config::from_toml_str(toml).unwrap();
    let scheduler = Rc::new(ManualScheduler::new());
    let app = Tomate::new(config, scheduler.clone());

    let session_events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&session_events);
    app.bus
        .signal(channel::SESSION)
        .connect(None, move |event| sink.borrow_mut().push(event.clone()));

    Harness {
        app,
        scheduler,
        session_events,
    }
}

/// Every interval lasts zero minutes, so the first tick finishes it.
fn instant() -> Harness {
    harness("[timer]\npomodoro_duration = 0\nshortbreak_duration = 0\nlongbreak_duration = 0\n")
}

fn last_sender(h: &Harness) -> Option<Sender> {
    h.session_events.borrow().last().map(|e| e.sender.clone())
}

#[test]
fn test_timer_finishing_ends_the_session() {
    let h = instant();
    assert!(h.app.session.start().unwrap());

    h.scheduler.fire();
    h.scheduler.fire();

    assert_eq!(h.app.timer.state(), State::Finished);
    assert_eq!(h.app.session.state(), State::Finished);
    assert_eq!(h.app.session.current(), SessionType::ShortBreak);
    assert_eq!(last_sender(&h), Some(Sender::Signal(Signal::Finished)));
}

#[test]
fn test_one_minute_pomodoro_counts_down() {
    let h = harness("[timer]\npomodoro_duration = 1\n");
    h.app.session.start().unwrap();

    h.scheduler.fire_n(60);
    assert_eq!(h.app.timer.time_left(), 0);
    assert_eq!(h.app.session.state(), State::Started);

    h.scheduler.fire();
    assert_eq!(h.app.session.state(), State::Finished);
    assert_eq!(h.app.session.count(), 1);
    assert_eq!(h.app.session.history()[0].duration, 60);
}

#[test]
fn test_fourth_pomodoro_goes_to_long_break() {
    let h = instant();
    let mut sequence = Vec::new();

    for _ in 0..8 {
        h.app.session.start().unwrap();
        h.scheduler.fire();
        sequence.push(h.app.session.current());
    }

    use SessionType::*;
    assert_eq!(
        sequence,
        vec![ShortBreak, Pomodoro, ShortBreak, Pomodoro, ShortBreak, Pomodoro, LongBreak, Pomodoro]
    );
    assert_eq!(h.app.session.count(), 4);
}

#[test]
fn test_setting_reply_depends_on_session_state() {
    let h = instant();

    let replies = h.app.bus.emit(channel::SETTING, "timer", Payload::None);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].1, Value::Bool(true));

    h.app.session.start().unwrap();
    let replies = h.app.bus.emit(channel::SETTING, "timer", Payload::None);
    assert_eq!(replies[0].1, Value::Bool(false));
}

#[test]
fn test_reset_after_three_pomodoros() {
    let h = instant();
    for _ in 0..3 {
        h.app.session.change(Some(SessionType::Pomodoro));
        h.app.session.start().unwrap();
        h.scheduler.fire();
    }
    assert_eq!(h.app.session.count(), 3);
    h.session_events.borrow_mut().clear();

    assert!(h.app.session.reset());

    let events = h.session_events.borrow();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sender, Sender::Signal(Signal::Reset));
    match &events[0].payload {
        Payload::Session(status) => {
            assert_eq!(status.count, 0);
            assert!(status.sessions.is_empty());
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn test_stop_fails_when_timer_already_stopped() {
    let h = instant();
    h.app.session.start().unwrap();
    h.app.timer.stop();

    assert!(!h.app.session.stop());
    assert_eq!(h.app.session.state(), State::Started);
}

#[test]
fn test_task_name_ignored_while_started() {
    let h = instant();
    h.app.session.set_task_name("inbox zero");
    h.app.session.start().unwrap();
    let posted = h.session_events.borrow().len();

    h.app.session.set_task_name("something else");

    assert_eq!(h.app.session.task_name(), "inbox zero");
    assert_eq!(h.session_events.borrow().len(), posted);
}

#[test]
fn test_listener_may_start_the_next_interval() {
    let h = instant();
    let session = Rc::downgrade(&h.app.session);
    h.app
        .bus
        .signal(channel::SESSION)
        .connect(Some(Signal::Finished.into()), move |_| {
            if let Some(session) = session.upgrade() {
                session.start().unwrap();
            }
        });

    h.app.session.start().unwrap();
    h.scheduler.fire();

    assert_eq!(h.app.session.state(), State::Started);
    assert_eq!(h.app.session.current(), SessionType::ShortBreak);
    assert_eq!(h.scheduler.pending(), 1);
}

#[test]
fn test_events_serialize_to_json() {
    let h = instant();
    h.app.session.set_task_name("docs");

    let json: Value =
        serde_json::from_str(&h.session_events.borrow()[0].to_json().unwrap()).unwrap();

    assert_eq!(json["channel"], "session");
    assert_eq!(json["sender"], "changed");
    assert_eq!(json["payload"]["kind"], "session");
    assert_eq!(json["payload"]["current"], "pomodoro");
    assert_eq!(json["payload"]["task_name"], "docs");
}
