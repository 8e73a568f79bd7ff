//! Application wiring.

use std::rc::Rc;

use crate::events::Bus;
use crate::plugins::PluginHost;
use crate::session::Session;
use crate::storage::{Config, SharedConfig};
use crate::timer::{Scheduler, Timer};

/// One bus, one configuration store, one timer owned by one session.
#[derive(Debug)]
pub struct Tomate {
    pub bus: Rc<Bus>,
    pub config: Rc<SharedConfig>,
    pub timer: Rc<Timer>,
    pub session: Rc<Session>,
    pub plugins: PluginHost,
}

impl Tomate {
    pub fn new(config: Config, scheduler: Rc<dyn Scheduler>) -> Self {
        let bus = Rc::new(Bus::new());
        let config = SharedConfig::new(config, &bus);
        let timer = Timer::new(&bus, scheduler);
        let session = Session::new(Rc::clone(&timer), config.clone(), &bus);
        let plugins = PluginHost::new(Rc::clone(&bus));

        Self {
            bus,
            config,
            timer,
            session,
            plugins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;
    use crate::timer::ManualScheduler;

    #[test]
    fn session_uses_the_shared_config() {
        let app = Tomate::new(Config::default(), Rc::new(ManualScheduler::new()));

        app.config.set("Timer", "Pomodoro Duration", "50").unwrap();
        app.session.start().unwrap();

        assert_eq!(app.timer.duration(), 50 * 60);
        assert_eq!(app.session.state(), State::Started);
    }

    #[test]
    fn timer_setting_is_refused_while_running() {
        let app = Tomate::new(Config::default(), Rc::new(ManualScheduler::new()));

        let replies = app.config.set("timer", "shortbreak_duration", "10").unwrap();
        assert_eq!(replies[0].1, serde_json::Value::Bool(true));

        app.session.start().unwrap();
        let replies = app.config.set("timer", "shortbreak_duration", "12").unwrap();
        assert_eq!(replies[0].1, serde_json::Value::Bool(false));
        assert_eq!(app.config.get("timer", "shortbreak_duration").as_deref(), Some("12"));
    }
}
