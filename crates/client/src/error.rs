use kitchen_monitor_retry::Retryable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("order run not found: {0}")]
    OrderRunNotFound(String),
}

impl GatewayError {
    /// 5xx response from the platform
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Http { status, .. } if *status >= 500)
    }
}

impl Retryable for GatewayError {
    fn is_retryable(&self) -> bool {
        self.is_server_error()
    }
}

#[derive(Debug, Error)]
pub enum EventSinkError {
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("event rejected: {0}")]
    Rejected(String),
}
