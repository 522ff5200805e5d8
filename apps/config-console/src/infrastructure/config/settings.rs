//! Console Configuration Settings
//!
//! Configuration types for the console service, loaded from environment
//! variables.

use std::time::Duration;

use crate::domain::cache::DEFAULT_TTL;
use crate::infrastructure::channel::reconnect::BackoffConfig;

/// Pipeline channel settings.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// WebSocket URL of the pipeline state feed.
    pub url: String,
    /// Keep-alive ping interval.
    pub ping_interval: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
}

impl ChannelSettings {
    /// Backoff schedule for the channel client.
    #[must_use]
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: self.reconnect_delay_initial,
            max_delay: self.reconnect_delay_max,
            multiplier: self.reconnect_delay_multiplier,
            jitter: 0.1,
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            ping_interval: Duration::from_secs(20),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
        }
    }
}

/// Cache behavior settings.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Inactivity window before a record is evicted.
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Operator API port.
    pub api_port: u16,
    /// Health check HTTP port (also serves /metrics).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_port: 8090,
            health_port: 8091,
        }
    }
}

/// Complete console configuration.
#[derive(Debug, Clone)]
pub struct ConsoleSettings {
    /// Pipeline channel settings.
    pub channel: ChannelSettings,
    /// Cache behavior settings.
    pub cache: CacheSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl ConsoleSettings {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("CONSOLE_CHANNEL_URL")
            .map_err(|_| ConfigError::MissingEnvVar("CONSOLE_CHANNEL_URL".to_string()))?;

        if url.is_empty() {
            return Err(ConfigError::EmptyValue("CONSOLE_CHANNEL_URL".to_string()));
        }

        let channel = ChannelSettings {
            url,
            ping_interval: parse_env_duration_secs(
                "CONSOLE_PING_INTERVAL_SECS",
                ChannelSettings::default().ping_interval,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                "CONSOLE_RECONNECT_DELAY_INITIAL_MS",
                ChannelSettings::default().reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "CONSOLE_RECONNECT_DELAY_MAX_SECS",
                ChannelSettings::default().reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                "CONSOLE_RECONNECT_DELAY_MULTIPLIER",
                ChannelSettings::default().reconnect_delay_multiplier,
            ),
        };

        let cache = CacheSettings {
            ttl: parse_env_duration_secs("CONSOLE_CACHE_TTL_SECS", CacheSettings::default().ttl),
        };

        let server = ServerSettings {
            api_port: parse_env_u16("CONSOLE_API_PORT", ServerSettings::default().api_port),
            health_port: parse_env_u16(
                "CONSOLE_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        Ok(Self {
            channel,
            cache,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
