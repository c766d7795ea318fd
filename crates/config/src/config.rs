//! Core configuration structures for the order-run monitors

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// DataKitchen order API connection
    pub datakitchen: DataKitchenConfig,

    /// Events ingestion API connection
    pub events: EventsConfig,

    /// Order and node polling behaviour
    pub polling: PollingConfig,

    /// Retry policy for 5xx responses on read calls
    pub retry: RetryConfig,

    /// Log output
    pub logging: LoggingConfig,
}

/// DataKitchen order API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataKitchenConfig {
    /// API base URL
    pub base_url: String,

    /// Login user name
    pub username: String,

    /// Login password
    pub password: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl DataKitchenConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Events ingestion API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// API base URL; empty disables event publishing
    pub base_url: String,

    /// Service account key sent with every event
    pub api_key: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl EventsConfig {
    pub fn enabled(&self) -> bool {
        !self.base_url.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between order run status checks
    pub poll_interval_secs: u64,

    /// Seconds to wait for each batch of order runs
    pub max_total_wait_secs: u64,

    /// Order runs outstanding at once; unset means all at once
    pub max_concurrent: Option<usize>,

    /// Seconds between node detail fetches
    pub node_sleep_time_secs: u64,
}

impl PollingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_total_wait(&self) -> Duration {
        Duration::from_secs(self.max_total_wait_secs)
    }

    pub fn node_sleep_time(&self) -> Duration {
        Duration::from_secs(self.node_sleep_time_secs)
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub attempts: u32,

    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after every retry
    pub backoff_factor: f64,

    /// Upper bound for a single delay in milliseconds
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Emit one JSON object per line
    pub json: bool,
}

impl Default for DataKitchenConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cloud.datakitchen.io".to_string(),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            max_total_wait_secs: 3600, // 1 hour
            max_concurrent: None,
            node_sleep_time_secs: 5,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay_ms: 1000,
            backoff_factor: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
