mod config;

pub use config::{
    normalize, Config, ConfigSource, SettingAction, SettingChange, SharedConfig, TimerConfig,
};
