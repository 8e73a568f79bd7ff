//! Named-channel event bus.
//!
//! Every state change in the system is announced on a [`Channel`]. Channels
//! are looked up by name on a [`Bus`] and created on first use. Sending is
//! synchronous: listeners run in connection order before `send` returns, and
//! their replies are collected so a sender can ask a question of whoever is
//! listening (the `setting` channel uses this to learn whether the session
//! accepts a change right now).
//!
//! Everything here is single-threaded (`Rc`/`RefCell`); the bus lives on the
//! same event loop that ticks the timer.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::Result;
use crate::session::SessionStatus;
use crate::storage::SettingChange;
use crate::timer::TimerPayload;

/// Well-known channel names.
pub mod channel {
    pub const TIMER: &str = "timer";
    pub const SESSION: &str = "session";
    pub const SETTING: &str = "setting";
}

/// Notification tag carried by timer and session events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Started,
    Stopped,
    Changed,
    Finished,
    Reset,
}

/// Sender tag of a send; listeners may filter on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sender {
    Signal(Signal),
    /// Configuration section name, used on the `setting` channel.
    Section(String),
}

impl From<Signal> for Sender {
    fn from(signal: Signal) -> Self {
        Sender::Signal(signal)
    }
}

impl From<&str> for Sender {
    fn from(section: &str) -> Self {
        Sender::Section(section.to_string())
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::Signal(signal) => write!(f, "{signal:?}"),
            Sender::Section(section) => f.write_str(section),
        }
    }
}

/// Data attached to a send.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Timer(TimerPayload),
    Session(SessionStatus),
    Setting(SettingChange),
    None,
}

/// What a listener receives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub channel: String,
    pub sender: Sender,
    pub payload: Payload,
}

impl Event {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Handle returned by `connect`, used to disconnect later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Callback = Rc<dyn Fn(&Event) -> Value>;

struct Receiver {
    id: ListenerId,
    filter: Option<Sender>,
    callback: Callback,
}

impl Receiver {
    fn accepts(&self, sender: &Sender) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter == sender)
    }
}

/// A named, many-listener notification topic.
pub struct Channel {
    name: String,
    receivers: RefCell<Vec<Receiver>>,
    next_id: Cell<u64>,
}

impl Channel {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            receivers: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connect a listener that does not reply. `filter = None` receives every send.
    pub fn connect<F>(&self, filter: Option<Sender>, listener: F) -> ListenerId
    where
        F: Fn(&Event) + 'static,
    {
        self.connect_with_reply(filter, move |event| {
            listener(event);
            Value::Null
        })
    }

    /// Connect a listener whose return value is collected by `send`.
    pub fn connect_with_reply<F>(&self, filter: Option<Sender>, listener: F) -> ListenerId
    where
        F: Fn(&Event) -> Value + 'static,
    {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        debug!(channel = %self.name, listener = %id, filter = ?filter, "connecting listener");

        self.receivers.borrow_mut().push(Receiver {
            id,
            filter,
            callback: Rc::new(listener),
        });
        id
    }

    /// Returns `false` if the listener was not connected.
    pub fn disconnect(&self, id: ListenerId) -> bool {
        let mut receivers = self.receivers.borrow_mut();
        let before = receivers.len();
        receivers.retain(|r| r.id != id);
        let removed = receivers.len() != before;
        if removed {
            debug!(channel = %self.name, listener = %id, "disconnected listener");
        }
        removed
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers.borrow().len()
    }

    /// Invoke every matching listener in connection order and collect replies.
    ///
    /// The listener list is snapshotted first, so listeners may connect,
    /// disconnect or send again while being called. A panicking listener
    /// unwinds to the caller and the rest of the snapshot is skipped.
    pub fn send(&self, sender: impl Into<Sender>, payload: Payload) -> Vec<(ListenerId, Value)> {
        let sender = sender.into();
        let matching: Vec<(ListenerId, Callback)> = self
            .receivers
            .borrow()
            .iter()
            .filter(|r| r.accepts(&sender))
            .map(|r| (r.id, Rc::clone(&r.callback)))
            .collect();

        trace!(channel = %self.name, sender = %sender, listeners = matching.len(), "send");

        if matching.is_empty() {
            return Vec::new();
        }

        let event = Event {
            channel: self.name.clone(),
            sender,
            payload,
        };

        matching
            .into_iter()
            .map(|(id, callback)| (id, callback(&event)))
            .collect()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

/// Registry of named channels.
#[derive(Debug, Default)]
pub struct Bus {
    channels: RefCell<HashMap<String, Rc<Channel>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the channel called `name`, creating it on first use.
    pub fn signal(&self, name: &str) -> Rc<Channel> {
        let mut channels = self.channels.borrow_mut();
        Rc::clone(
            channels
                .entry(name.to_string())
                .or_insert_with(|| Rc::new(Channel::new(name))),
        )
    }

    pub fn emit(
        &self,
        name: &str,
        sender: impl Into<Sender>,
        payload: Payload,
    ) -> Vec<(ListenerId, Value)> {
        self.signal(name).send(sender, payload)
    }

    /// Registered channel names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.borrow().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn recorder(channel: &Channel, filter: Option<Sender>) -> Rc<RefCell<Vec<Event>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        channel.connect(filter, move |event| sink.borrow_mut().push(event.clone()));
        seen
    }

    #[test]
    fn signal_returns_the_same_channel_for_the_same_name() {
        let bus = Bus::new();
        let a = bus.signal(channel::TIMER);
        let b = bus.signal(channel::TIMER);
        let c = bus.signal(channel::SESSION);

        assert!(Rc::ptr_eq(&a, &b));
        assert!(!Rc::ptr_eq(&a, &c));
        assert_eq!(bus.names(), vec!["session".to_string(), "timer".to_string()]);
    }

    #[test]
    fn send_without_listeners_is_a_noop() {
        let bus = Bus::new();
        let replies = bus.emit(channel::TIMER, Signal::Changed, Payload::None);
        assert!(replies.is_empty());
    }

    #[test]
    fn listeners_run_in_connection_order() {
        let bus = Bus::new();
        let ch = bus.signal("order");
        let order = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let order = Rc::clone(&order);
            ch.connect(None, move |_| order.borrow_mut().push(n));
        }

        ch.send(Signal::Started, Payload::None);

        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn replies_are_collected_per_listener() {
        let ch = Channel::new("setting");
        let first = ch.connect_with_reply(None, |_| Value::Bool(true));
        let second = ch.connect(None, |_| {});

        let replies = ch.send("timer", Payload::None);

        assert_eq!(replies, vec![(first, Value::Bool(true)), (second, Value::Null)]);
    }

    #[test]
    fn sender_filter_limits_delivery() {
        let ch = Channel::new("timer");
        let finished_only = recorder(&ch, Some(Signal::Finished.into()));
        let everything = recorder(&ch, None);

        ch.send(Signal::Changed, Payload::None);
        ch.send(Signal::Finished, Payload::None);

        assert_eq!(finished_only.borrow().len(), 1);
        assert_eq!(finished_only.borrow()[0].sender, Sender::Signal(Signal::Finished));
        assert_eq!(everything.borrow().len(), 2);
    }

    #[test]
    fn section_filter_matches_by_name() {
        let ch = Channel::new("setting");
        ch.connect_with_reply(Some("timer".into()), |_| Value::Bool(true));

        assert_eq!(ch.send("timer", Payload::None).len(), 1);
        assert!(ch.send("ui", Payload::None).is_empty());
    }

    #[test]
    fn disconnect_stops_delivery() {
        let ch = Channel::new("timer");
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        let id = ch.connect(None, move |_| counter.set(counter.get() + 1));

        ch.send(Signal::Changed, Payload::None);
        assert!(ch.disconnect(id));
        assert!(!ch.disconnect(id));
        ch.send(Signal::Changed, Payload::None);

        assert_eq!(seen.get(), 1);
        assert_eq!(ch.receiver_count(), 0);
    }

    #[test]
    fn listener_connected_during_send_runs_from_next_send() {
        let ch = Rc::new(Channel::new("timer"));
        let late_calls = Rc::new(Cell::new(0));
        let inner = Rc::clone(&ch);
        let calls = Rc::clone(&late_calls);
        let connected = Cell::new(false);
        ch.connect(None, move |_| {
            if !connected.replace(true) {
                let calls = Rc::clone(&calls);
                inner.connect(None, move |_| calls.set(calls.get() + 1));
            }
        });

        ch.send(Signal::Changed, Payload::None);
        assert_eq!(late_calls.get(), 0);
        ch.send(Signal::Changed, Payload::None);
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn panicking_listener_aborts_the_remaining_ones() {
        let ch = Channel::new("timer");
        let reached = Rc::new(Cell::new(false));
        let flag = Rc::clone(&reached);
        ch.connect(None, |_| panic!("listener failure"));
        ch.connect(None, move |_| flag.set(true));

        let outcome = catch_unwind(AssertUnwindSafe(|| ch.send(Signal::Changed, Payload::None)));

        assert!(outcome.is_err());
        assert!(!reached.get());
    }

    #[test]
    fn event_serializes_with_tagged_payload() {
        let event = Event {
            channel: channel::SETTING.to_string(),
            sender: "timer".into(),
            payload: Payload::None,
        };
        let json: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["sender"], "timer");
        assert_eq!(json["payload"]["kind"], "none");
    }
}
