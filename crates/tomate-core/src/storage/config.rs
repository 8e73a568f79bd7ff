//! TOML-shaped application configuration.
//!
//! Options are addressed the way the rest of the application asks for them,
//! as a `(section, option)` pair such as `("Timer", "Long Break Interval")`.
//! Names are normalized (spaces become `_`, lowercase) and joined into a
//! dotted key, `timer.long_break_interval`.
//!
//! [`Config`] is the plain data. [`SharedConfig`] is the live store handed to
//! the session; writes through it are announced on the `setting` channel.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::events::{channel, Bus, Channel, ListenerId, Payload, Sender};

/// Read access to integer options.
pub trait ConfigSource {
    fn get_int(&self, section: &str, option: &str) -> Result<i64, ConfigError>;
}

/// Timer durations (minutes) and the long break cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_pomodoro_duration")]
    pub pomodoro_duration: u32,
    #[serde(default = "default_shortbreak_duration")]
    pub shortbreak_duration: u32,
    #[serde(default = "default_longbreak_duration")]
    pub longbreak_duration: u32,
    /// Every n-th completed pomodoro is followed by a long break.
    #[serde(default = "default_long_break_interval")]
    pub long_break_interval: u32,
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timer: TimerConfig,
}

// Default functions
fn default_pomodoro_duration() -> u32 {
    25
}
fn default_shortbreak_duration() -> u32 {
    5
}
fn default_longbreak_duration() -> u32 {
    15
}
fn default_long_break_interval() -> u32 {
    4
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            pomodoro_duration: default_pomodoro_duration(),
            shortbreak_duration: default_shortbreak_duration(),
            longbreak_duration: default_longbreak_duration(),
            long_break_interval: default_long_break_interval(),
        }
    }
}

/// `"Long Break Interval"` -> `"long_break_interval"`.
pub fn normalize(name: &str) -> String {
    name.trim().replace(' ', "_").to_lowercase()
}

impl Config {
    /// Dotted key for a `(section, option)` pair.
    pub fn key(section: &str, option: &str) -> String {
        format!("{}.{}", normalize(section), normalize(option))
    }

    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::MissingKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .trim()
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .trim()
                            .parse::<i64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("not a leaf option".into()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the session cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timer.long_break_interval == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timer.long_break_interval".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key. The value is parsed to the
    /// type of the existing option.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |e: serde_json::Error| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        };

        let mut json = serde_json::to_value(&*self).map_err(invalid)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(invalid)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Restore the default value of one option.
    pub fn reset(&mut self, key: &str) -> Result<(), ConfigError> {
        let default = Config::default()
            .get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
        self.set(key, &default)
    }

    /// Apply `key=value` overrides in order.
    pub fn apply_overrides<S: AsRef<str>>(&mut self, overrides: &[S]) -> Result<(), ConfigError> {
        for entry in overrides {
            let entry = entry.as_ref();
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::ParseFailed(format!("expected key=value, got '{entry}'")))?;
            self.set(key.trim(), value)?;
        }
        Ok(())
    }
}

impl ConfigSource for Config {
    fn get_int(&self, section: &str, option: &str) -> Result<i64, ConfigError> {
        let key = Config::key(section, option);
        let json = serde_json::to_value(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        let value = Self::get_json_value_by_path(&json, &key)
            .ok_or_else(|| ConfigError::MissingKey(key.clone()))?;
        value.as_i64().ok_or_else(|| ConfigError::InvalidValue {
            key,
            message: format!("expected an integer, found {value}"),
        })
    }
}

/// What happened to an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingAction {
    Set,
    Remove,
}

/// Payload of the `setting` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingChange {
    pub section: String,
    pub option: String,
    pub value: Option<String>,
    pub action: SettingAction,
}

/// Live configuration shared by the application.
///
/// Every successful write is posted on the `setting` channel with the
/// normalized section name as sender.
pub struct SharedConfig {
    config: RefCell<Config>,
    channel: Rc<Channel>,
}

impl SharedConfig {
    pub fn new(config: Config, bus: &Bus) -> Rc<Self> {
        Rc::new(Self {
            config: RefCell::new(config),
            channel: bus.signal(channel::SETTING),
        })
    }

    pub fn snapshot(&self) -> Config {
        self.config.borrow().clone()
    }

    pub fn get(&self, section: &str, option: &str) -> Option<String> {
        self.config.borrow().get(&Config::key(section, option))
    }

    /// Store a value and announce it. Returns the listeners' replies.
    pub fn set(
        &self,
        section: &str,
        option: &str,
        value: &str,
    ) -> Result<Vec<(ListenerId, serde_json::Value)>, ConfigError> {
        let (section, option) = (normalize(section), normalize(option));
        debug!(%section, %option, %value, "change setting");

        self.config
            .borrow_mut()
            .set(&format!("{section}.{option}"), value)?;

        Ok(self.announce(SettingChange {
            section,
            option,
            value: Some(value.to_string()),
            action: SettingAction::Set,
        }))
    }

    /// Restore an option's default and announce it.
    pub fn remove(
        &self,
        section: &str,
        option: &str,
    ) -> Result<Vec<(ListenerId, serde_json::Value)>, ConfigError> {
        let (section, option) = (normalize(section), normalize(option));
        debug!(%section, %option, "remove setting");

        self.config
            .borrow_mut()
            .reset(&format!("{section}.{option}"))?;

        Ok(self.announce(SettingChange {
            section,
            option,
            value: None,
            action: SettingAction::Remove,
        }))
    }

    fn announce(&self, change: SettingChange) -> Vec<(ListenerId, serde_json::Value)> {
        self.channel
            .send(Sender::Section(change.section.clone()), Payload::Setting(change))
    }
}

impl ConfigSource for SharedConfig {
    fn get_int(&self, section: &str, option: &str) -> Result<i64, ConfigError> {
        self.config.borrow().get_int(section, option)
    }
}

impl std::fmt::Debug for SharedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConfig")
            .field("config", &*self.config.borrow())
            .finish()
    }
}
