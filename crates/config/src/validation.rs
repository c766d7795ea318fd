//! Configuration validation

use crate::{AppConfig, ConfigError, Result};

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the entire application configuration, reporting every problem
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let mut errors = Vec::new();

    // DataKitchen API
    if let Err(e) = validate_url(&config.datakitchen.base_url) {
        errors.push(ValidationError::new("datakitchen.base_url", e));
    }

    if config.datakitchen.username.is_empty() {
        errors.push(ValidationError::new(
            "datakitchen.username",
            "username is required",
        ));
    }

    if config.datakitchen.password.is_empty() {
        errors.push(ValidationError::new(
            "datakitchen.password",
            "password is required",
        ));
    }

    if config.datakitchen.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "datakitchen.request_timeout_secs",
            "must be greater than 0",
        ));
    }

    // Events API is optional, but complete when present
    if config.events.enabled() {
        if let Err(e) = validate_url(&config.events.base_url) {
            errors.push(ValidationError::new("events.base_url", e));
        }

        if config.events.api_key.is_empty() {
            errors.push(ValidationError::new(
                "events.api_key",
                "api key is required when events are enabled",
            ));
        }
    }

    // Polling
    if config.polling.poll_interval_secs == 0 {
        errors.push(ValidationError::new(
            "polling.poll_interval_secs",
            "must be greater than 0",
        ));
    }

    if config.polling.max_total_wait_secs < config.polling.poll_interval_secs {
        errors.push(ValidationError::new(
            "polling.max_total_wait_secs",
            "must be at least poll_interval_secs",
        ));
    }

    if config.polling.max_concurrent == Some(0) {
        errors.push(ValidationError::new(
            "polling.max_concurrent",
            "must be greater than 0 when set",
        ));
    }

    if config.polling.node_sleep_time_secs == 0 {
        errors.push(ValidationError::new(
            "polling.node_sleep_time_secs",
            "must be greater than 0",
        ));
    }

    // Retry
    if config.retry.attempts == 0 {
        errors.push(ValidationError::new(
            "retry.attempts",
            "must be at least 1 (the first attempt)",
        ));
    }

    if config.retry.backoff_factor < 1.0 {
        errors.push(ValidationError::new(
            "retry.backoff_factor",
            "must be >= 1.0",
        ));
    }

    if config.retry.max_delay_ms < config.retry.initial_delay_ms {
        errors.push(ValidationError::new(
            "retry.max_delay_ms",
            "must be at least initial_delay_ms",
        ));
    }

    if let Err(e) = validate_log_level(&config.logging.level) {
        errors.push(e);
    }

    if !errors.is_empty() {
        let error_msg = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ConfigError::ValidationError(error_msg));
    }

    Ok(())
}

/// Validate a URL
pub fn validate_url(url: &str) -> std::result::Result<(), String> {
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err("URL must start with http:// or https://".to_string());
    }

    Ok(())
}

fn validate_log_level(level: &str) -> std::result::Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::new(
            "logging.level",
            format!(
                "invalid log level '{level}', must be one of: trace, debug, info, warn, error"
            ),
        )),
    }
}
