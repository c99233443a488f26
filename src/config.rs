//! Application Configuration Module
//!
//! Centralizes configuration for the voice loop: the timer policy used by
//! the turn controller, and environment-backed settings for the assistant
//! endpoint and voice locale.

use std::env;
use std::time::Duration;
use tracing::Level;

/// Timer policy for the turn controller.
#[derive(Debug, Clone)]
pub struct TurnTimings {
    /// Quiet interval after a final transcript before the utterance is
    /// dispatched to the assistant.
    pub debounce: Duration,
    /// Restart delay used when a capture session ends while a dispatch is
    /// in flight, so the restart does not race the reply.
    pub restart_while_busy: Duration,
    /// Restart delay used when a capture session ends and nothing else is
    /// going on.
    pub restart_idle: Duration,
}

impl Default for TurnTimings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            restart_while_busy: Duration::from_millis(1000),
            restart_idle: Duration::from_millis(300),
        }
    }
}

impl TurnTimings {
    /// Delay before a scheduled capture restart, depending on whether a
    /// dispatch is currently in flight.
    pub fn restart_delay(&self, dispatch_in_flight: bool) -> Duration {
        if dispatch_in_flight {
            self.restart_while_busy
        } else {
            self.restart_idle
        }
    }
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub assistant_url: String,
    pub locale: String,
    pub log_level: Level,
    pub timings: TurnTimings,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `ASSISTANT_URL`: Endpoint the HTTP assistant client posts user text to. Required.
    // *   `VOICE_LOCALE`: (Optional) BCP-47 language tag used for voice selection. Defaults to "en-US".
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. Useful for local development, ignored if not present.
        dotenvy::dotenv().ok();

        let assistant_url = env::var("ASSISTANT_URL")
            .map_err(|_| ConfigError::MissingVar("ASSISTANT_URL".to_string()))?;

        let locale = env::var("VOICE_LOCALE").unwrap_or_else(|_| "en-US".to_string());

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            assistant_url,
            locale,
            log_level,
            timings: TurnTimings::default(),
        })
    }
}
