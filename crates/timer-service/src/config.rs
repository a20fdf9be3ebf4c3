//! Timer service configuration.
//!
//! Configuration is loaded from environment variables. Every value has a
//! default; a variable that is present but unusable is an error rather
//! than being silently replaced.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default WebSocket gateway bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:9001";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default countdown tick in seconds (coarse, once per minute).
pub const DEFAULT_TICK_INTERVAL_SECONDS: u64 = 60;

/// Default wrong-PIN penalty in milliseconds.
pub const DEFAULT_PIN_PENALTY_MS: u64 = 3000;

/// Default session identifier limit in bytes; identifiers must be shorter.
pub const DEFAULT_MAX_SESSION_ID_LENGTH: usize = 512;

/// Default maximum number of concurrent sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Default drain delay after a shutdown signal, in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 0;

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "timer";

/// Timer service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket gateway bind address (default: "0.0.0.0:9001").
    pub bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Unique identifier for this instance.
    pub instance_id: String,

    /// Countdown tick length in seconds (default: 60, minimum 1).
    pub tick_interval_seconds: u64,

    /// Wrong-PIN penalty in milliseconds (default: 3000, 0 disables).
    pub pin_penalty_ms: u64,

    /// Session identifiers must be shorter than this many bytes (default: 512).
    pub max_session_id_length: usize,

    /// Maximum concurrent sessions (default: 10000).
    pub max_sessions: usize,

    /// Seconds to keep serving after readiness drops on shutdown (default: 0).
    pub drain_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Per-session behaviour handed to every session actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Time subtracted per countdown tick, and the wait between ticks.
    pub tick_interval: Duration,
    /// How long a connection is ignored after presenting a wrong PIN.
    pub pin_penalty: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECONDS),
            pin_penalty: Duration::from_millis(DEFAULT_PIN_PENALTY_MS),
        }
    }
}

/// Limits enforced by the session registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySettings {
    pub max_sessions: usize,
    pub max_session_id_length: usize,
    pub session: SessionSettings,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_session_id_length: DEFAULT_MAX_SESSION_ID_LENGTH,
            session: SessionSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("TIMER_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("TIMER_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let tick_interval_seconds = parse_var(
            vars,
            "TIMER_TICK_INTERVAL_SECONDS",
            DEFAULT_TICK_INTERVAL_SECONDS,
        )?;
        if tick_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "TIMER_TICK_INTERVAL_SECONDS must be at least 1".to_string(),
            ));
        }

        let pin_penalty_ms = parse_var(vars, "TIMER_PIN_PENALTY_MS", DEFAULT_PIN_PENALTY_MS)?;

        let max_session_id_length = parse_var(
            vars,
            "TIMER_MAX_SESSION_ID_LENGTH",
            DEFAULT_MAX_SESSION_ID_LENGTH,
        )?;
        if max_session_id_length < 2 {
            return Err(ConfigError::InvalidValue(
                "TIMER_MAX_SESSION_ID_LENGTH must be at least 2".to_string(),
            ));
        }

        let max_sessions = parse_var(vars, "TIMER_MAX_SESSIONS", DEFAULT_MAX_SESSIONS)?;

        let drain_seconds = parse_var(vars, "TIMER_DRAIN_SECONDS", DEFAULT_DRAIN_SECONDS)?;

        // Generate instance ID
        let instance_id = vars.get("TIMER_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            health_bind_address,
            instance_id,
            tick_interval_seconds,
            pin_penalty_ms,
            max_session_id_length,
            max_sessions,
            drain_seconds,
        })
    }

    /// Settings for each session actor.
    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            tick_interval: Duration::from_secs(self.tick_interval_seconds),
            pin_penalty: Duration::from_millis(self.pin_penalty_ms),
        }
    }

    /// Settings for the session registry.
    #[must_use]
    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            max_sessions: self.max_sessions,
            max_session_id_length: self.max_session_id_length,
            session: self.session_settings(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
        None => Ok(default),
    }
}
