use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Tunables for the synchronization core.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoreConfig {
    /// Stop-count notification debouncing
    #[serde(default)]
    pub debounce: DebounceConfig,
    /// Arrival confirmation prompts
    #[serde(default)]
    pub arrival: ArrivalConfig,
    /// Per-stop action listeners
    #[serde(default)]
    pub listeners: ListenerConfig,
    /// Bounded retry for transient "not yet loaded" reads
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Configuration for the stop-count change debouncer
#[derive(Debug, Clone, Deserialize)]
pub struct DebounceConfig {
    /// Quiet window in seconds before an aggregated notification is emitted (default: 3)
    #[serde(default = "DebounceConfig::default_window_secs")]
    pub window_secs: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            window_secs: Self::default_window_secs(),
        }
    }
}

impl DebounceConfig {
    fn default_window_secs() -> u64 {
        3
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Configuration for the arrival confirmation coordinator
#[derive(Debug, Clone, Deserialize)]
pub struct ArrivalConfig {
    /// Countdown in seconds before an unacknowledged negative-guf arrival
    /// is auto-confirmed (default: 20)
    #[serde(default = "ArrivalConfig::default_countdown_secs")]
    pub countdown_secs: u64,
    /// Maximum number of queued arrival prompts (default: 16)
    #[serde(default = "ArrivalConfig::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ArrivalConfig {
    fn default() -> Self {
        Self {
            countdown_secs: Self::default_countdown_secs(),
            queue_capacity: Self::default_queue_capacity(),
        }
    }
}

impl ArrivalConfig {
    fn default_countdown_secs() -> u64 {
        20
    }
    fn default_queue_capacity() -> usize {
        16
    }
}

/// Configuration for per-stop action listeners
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Seconds to wait for a stop's first action batch before reporting an
    /// offline/empty signal (default: 8)
    #[serde(default = "ListenerConfig::default_empty_timeout_secs")]
    pub empty_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            empty_timeout_secs: Self::default_empty_timeout_secs(),
        }
    }
}

impl ListenerConfig {
    fn default_empty_timeout_secs() -> u64 {
        8
    }

    pub fn empty_timeout(&self) -> Duration {
        Duration::from_secs(self.empty_timeout_secs)
    }
}

/// Bounded retry policy for reads that can race the initial stop load
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Hard ceiling on attempts before a connectivity hint is surfaced (default: 5)
    #[serde(default = "RetryConfig::default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff between attempts in milliseconds, multiplied by the attempt
    /// number (default: 400)
    #[serde(default = "RetryConfig::default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            backoff_ms: Self::default_backoff_ms(),
        }
    }
}

impl RetryConfig {
    fn default_max_attempts() -> u32 {
        5
    }
    fn default_backoff_ms() -> u64 {
        400
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms * u64::from(attempt))
    }
}

impl CoreConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce.window_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "debounce.window_secs must be greater than zero".into(),
            ));
        }
        if self.arrival.countdown_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "arrival.countdown_secs must be greater than zero".into(),
            ));
        }
        if self.arrival.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "arrival.queue_capacity must be greater than zero".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}
