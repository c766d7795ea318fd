use kitchen_monitor_client::{EventSinkError, GatewayError};
use thiserror::Error;

/// Monitor errors
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("gateway call failed: {source}")]
    Gateway {
        #[from]
        source: GatewayError,
    },

    #[error("event publish failed: {source}")]
    EventPublish {
        #[from]
        source: EventSinkError,
    },

    #[error("order {label} cannot be submitted with {expected}")]
    TargetMismatch { label: String, expected: &'static str },
}
