//! Plugins and bus subscriptions.
//!
//! A plugin is anything that wants to react to bus notifications. It
//! connects its listeners through a [`Subscriptions`] guard owned by the
//! [`PluginHost`]; deactivating the plugin drops the guard, which
//! disconnects every listener it recorded.

use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::{debug, info};

use crate::events::{Bus, Channel, ListenerId};

/// Listeners connected on behalf of one owner.
///
/// Every recorded listener is disconnected when the guard is dropped.
#[derive(Debug, Default)]
pub struct Subscriptions {
    entries: Vec<(Rc<Channel>, ListenerId)>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, channel: &Rc<Channel>, id: ListenerId) {
        self.entries.push((Rc::clone(channel), id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns how many listeners were still connected.
    pub fn disconnect_all(&mut self) -> usize {
        self.entries
            .drain(..)
            .filter(|(channel, id)| channel.disconnect(*id))
            .count()
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

pub trait Plugin {
    /// Unique name; the host refuses a second plugin with the same one.
    fn name(&self) -> &str;

    /// Connect listeners. Record every `ListenerId` in `subscriptions`.
    fn connect(self: Rc<Self>, bus: &Bus, subscriptions: &mut Subscriptions);
}

struct Active {
    // Keeps the plugin alive for as long as its listeners are connected.
    _plugin: Rc<dyn Plugin>,
    subscriptions: Subscriptions,
}

/// Registry of activated plugins.
pub struct PluginHost {
    bus: Rc<Bus>,
    active: BTreeMap<String, Active>,
}

impl PluginHost {
    pub fn new(bus: Rc<Bus>) -> Self {
        Self {
            bus,
            active: BTreeMap::new(),
        }
    }

    /// Connect `plugin` to the bus. Returns `false` if a plugin with the
    /// same name is already active.
    pub fn activate(&mut self, plugin: Rc<dyn Plugin>) -> bool {
        let name = plugin.name().to_string();
        if self.active.contains_key(&name) {
            debug!(plugin = %name, "plugin already active");
            return false;
        }

        let mut subscriptions = Subscriptions::new();
        Rc::clone(&plugin).connect(&self.bus, &mut subscriptions);
        info!(plugin = %name, listeners = subscriptions.len(), "plugin activated");

        self.active.insert(
            name,
            Active {
                _plugin: plugin,
                subscriptions,
            },
        );
        true
    }

    /// Disconnect and drop a plugin. Returns `false` if it was not active.
    pub fn deactivate(&mut self, name: &str) -> bool {
        match self.active.remove(name) {
            Some(mut active) => {
                let disconnected = active.subscriptions.disconnect_all();
                info!(plugin = %name, listeners = disconnected, "plugin deactivated");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    /// Names of active plugins, sorted.
    pub fn active(&self) -> Vec<String> {
        self.active.keys().cloned().collect()
    }
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("active", &self.active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{channel, Payload, Signal};
    use std::cell::Cell;

    struct Counter {
        name: &'static str,
        seen: Cell<usize>,
    }

    impl Counter {
        fn new(name: &'static str) -> Rc<Self> {
            Rc::new(Self {
                name,
                seen: Cell::new(0),
            })
        }
    }

    impl Plugin for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn connect(self: Rc<Self>, bus: &Bus, subscriptions: &mut Subscriptions) {
            for name in [channel::TIMER, channel::SESSION] {
                let ch = bus.signal(name);
                let this = Rc::clone(&self);
                let id = ch.connect(None, move |_| this.seen.set(this.seen.get() + 1));
                subscriptions.add(&ch, id);
            }
        }
    }

    #[test]
    fn dropping_subscriptions_disconnects() {
        let bus = Bus::new();
        let ch = bus.signal(channel::TIMER);
        {
            let mut subscriptions = Subscriptions::new();
            subscriptions.add(&ch, ch.connect(None, |_| {}));
            subscriptions.add(&ch, ch.connect(None, |_| {}));
            assert_eq!(ch.receiver_count(), 2);
        }
        assert_eq!(ch.receiver_count(), 0);
    }

    #[test]
    fn disconnect_all_skips_already_removed_listeners() {
        let bus = Bus::new();
        let ch = bus.signal(channel::TIMER);
        let mut subscriptions = Subscriptions::new();
        let id = ch.connect(None, |_| {});
        subscriptions.add(&ch, id);
        subscriptions.add(&ch, ch.connect(None, |_| {}));
        ch.disconnect(id);

        assert_eq!(subscriptions.disconnect_all(), 1);
        assert!(subscriptions.is_empty());
    }

    #[test]
    fn activated_plugin_receives_events() {
        let bus = Rc::new(Bus::new());
        let mut host = PluginHost::new(Rc::clone(&bus));
        let counter = Counter::new("counter");

        assert!(host.activate(counter.clone()));
        bus.emit(channel::TIMER, Signal::Changed, Payload::None);
        bus.emit(channel::SESSION, Signal::Started, Payload::None);

        assert_eq!(counter.seen.get(), 2);
        assert!(host.is_active("counter"));
        assert_eq!(host.active(), vec!["counter".to_string()]);
    }

    #[test]
    fn duplicate_names_are_refused() {
        let bus = Rc::new(Bus::new());
        let mut host = PluginHost::new(Rc::clone(&bus));

        assert!(host.activate(Counter::new("counter")));
        assert!(!host.activate(Counter::new("counter")));
        assert_eq!(bus.signal(channel::TIMER).receiver_count(), 1);
    }

    #[test]
    fn deactivated_plugin_stops_receiving() {
        let bus = Rc::new(Bus::new());
        let mut host = PluginHost::new(Rc::clone(&bus));
        let counter = Counter::new("counter");
        host.activate(counter.clone());

        assert!(host.deactivate("counter"));
        assert!(!host.deactivate("counter"));
        bus.emit(channel::TIMER, Signal::Changed, Payload::None);

        assert_eq!(counter.seen.get(), 0);
        assert!(!host.is_active("counter"));
        assert_eq!(Rc::strong_count(&counter), 1);
    }
}
