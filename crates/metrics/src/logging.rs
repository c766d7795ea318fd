use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `level` when it is set. `json` switches the output
/// to one JSON object per line.
pub fn init_tracing(level: &str, json: bool) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(fmt::layer().with_target(true).with_level(true).json())
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .try_init()
    };

    result.map_err(|e| TracingError::InitError(e.to_string()))
}

/// Correlation ID tying together the log lines of one monitored run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(uuid::Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Span context for monitoring one order run
#[derive(Debug, Clone)]
pub struct RunSpan {
    pub correlation_id: CorrelationId,
    pub kitchen: String,
    pub order_run_id: String,
}

impl RunSpan {
    pub fn new(kitchen: impl Into<String>, order_run_id: impl Into<String>) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            kitchen: kitchen.into(),
            order_run_id: order_run_id.into(),
        }
    }

    /// Span to attach to the monitoring future with `Instrument`
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "order_run",
            correlation_id = %self.correlation_id,
            kitchen = %self.kitchen,
            order_run_id = %self.order_run_id,
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("tracing initialization error: {0}")]
    InitError(String),
}
