//! Configuration loading for the console service.

mod settings;

pub use settings::{
    CacheSettings, ChannelSettings, ConfigError, ConsoleSettings, ServerSettings,
};
