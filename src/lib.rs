//! Order-run monitoring for the DataKitchen platform
//!
//! Submits orders in bounded batches, waits for their runs to finish and
//! mirrors node states of a run to the events API.
//!
//! ```no_run
//! use kitchen_monitor::{ConfigLoader, KitchenMonitor, OrderSpec};
//!
//! # async fn run() -> Result<(), kitchen_monitor::AppError> {
//! let config = ConfigLoader::from_env()?;
//! kitchen_monitor::init_logging(&config.logging)?;
//!
//! let monitor = KitchenMonitor::from_config(config)?;
//! let result = monitor
//!     .create_and_monitor(vec![OrderSpec::create("production", "etl", "daily")])
//!     .await;
//! println!("{} succeeded", result.succeeded.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub use kitchen_monitor_client::{
    ClientSettings, DataKitchenClient, EventSink, EventSinkError, EventsClient, EventsSettings,
    GatewayError, OrderGateway,
};
pub use kitchen_monitor_config::{
    validate_config, AppConfig, ConfigError, ConfigLoader, LoggingConfig, RetryConfig,
};
pub use kitchen_monitor_metrics::{MetricsCollector, TracingError};
pub use kitchen_monitor_orchestrator::{
    MonitorError, NodeMonitor, NodeMonitorSettings, OrderRunMonitor, WaitLoop,
};
pub use kitchen_monitor_retry::RetryPolicy;
pub use kitchen_monitor_types::{MonitorResult, OrderRunStatus, OrderSpec, OrderTarget};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("logging setup failed: {0}")]
    Tracing(#[from] TracingError),

    #[error("order API client error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("events client error: {0}")]
    Events(#[from] EventSinkError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("node monitoring needs the events API, set events.base_url")]
    EventsDisabled,
}

pub fn retry_policy(config: &RetryConfig) -> RetryPolicy {
    let mut policy = RetryPolicy::new(config.attempts, config.initial_delay(), config.backoff_factor);
    policy.max_delay = config.max_delay();
    policy
}

pub fn client_settings(config: &AppConfig) -> ClientSettings {
    ClientSettings::new(
        &config.datakitchen.base_url,
        &config.datakitchen.username,
        &config.datakitchen.password,
    )
    .with_request_timeout(config.datakitchen.request_timeout())
    .with_retry(retry_policy(&config.retry))
}

pub fn events_settings(config: &AppConfig) -> EventsSettings {
    let mut settings = EventsSettings::new(&config.events.base_url, &config.events.api_key);
    settings.request_timeout = config.events.request_timeout();
    settings
}

/// Install the global tracing subscriber from the logging section
pub fn init_logging(config: &LoggingConfig) -> Result<(), AppError> {
    kitchen_monitor_metrics::init_tracing(&config.level, config.json)?;
    Ok(())
}

/// Order and node monitors wired to one set of clients and the polling
/// settings of an [`AppConfig`].
pub struct KitchenMonitor {
    config: AppConfig,
    gateway: Arc<dyn OrderGateway>,
    sink: Option<Arc<dyn EventSink>>,
    metrics: Arc<MetricsCollector>,
    orders: OrderRunMonitor,
}

impl KitchenMonitor {
    /// Validate `config` and build the HTTP clients it describes
    pub fn from_config(config: AppConfig) -> Result<Self, AppError> {
        validate_config(&config)?;

        let gateway: Arc<dyn OrderGateway> =
            Arc::new(DataKitchenClient::new(client_settings(&config))?);
        let sink: Option<Arc<dyn EventSink>> = if config.events.enabled() {
            Some(Arc::new(EventsClient::new(events_settings(&config))?))
        } else {
            None
        };

        info!(
            base_url = %config.datakitchen.base_url,
            events = config.events.enabled(),
            max_concurrent = ?config.polling.max_concurrent,
            "Kitchen monitor configured"
        );
        Ok(Self::with_clients(config, gateway, sink))
    }

    /// Use the given clients instead of building them from `config`
    pub fn with_clients(
        config: AppConfig,
        gateway: Arc<dyn OrderGateway>,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        let orders = OrderRunMonitor::new(gateway.clone()).with_metrics(metrics.clone());

        Self {
            config,
            gateway,
            sink,
            metrics,
            orders,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub async fn create_and_monitor(&self, order_specs: Vec<OrderSpec>) -> MonitorResult {
        let polling = &self.config.polling;
        self.orders
            .create_and_monitor_orders(
                order_specs,
                polling.poll_interval(),
                polling.max_total_wait(),
                polling.max_concurrent,
            )
            .await
    }

    pub async fn resume_and_monitor(&self, order_specs: Vec<OrderSpec>) -> MonitorResult {
        let polling = &self.config.polling;
        self.orders
            .resume_and_monitor_orders(
                order_specs,
                polling.poll_interval(),
                polling.max_total_wait(),
                polling.max_concurrent,
            )
            .await
    }

    /// Wait for one existing order run, up to the configured total wait
    pub async fn monitor_order_run(
        &self,
        kitchen: &str,
        order_run_id: &str,
    ) -> Option<OrderRunStatus> {
        let polling = &self.config.polling;
        self.orders
            .monitor_order_run(
                kitchen,
                order_run_id,
                polling.poll_interval(),
                polling.max_total_wait(),
            )
            .await
    }

    /// Publish node events for an order run until none of its nodes is
    /// running. Returns the succeeded and failed node names.
    pub async fn monitor_nodes(
        &self,
        kitchen: &str,
        order_run_id: &str,
        pipeline_name: &str,
        monitor_node_name: Option<&str>,
    ) -> Result<(Vec<String>, Vec<String>), AppError> {
        let sink = self.sink.clone().ok_or(AppError::EventsDisabled)?;

        let mut settings = NodeMonitorSettings::new(kitchen, order_run_id, pipeline_name)
            .with_sleep_time(self.config.polling.node_sleep_time());
        if let Some(name) = monitor_node_name {
            settings = settings.with_monitor_node(name);
        }

        let mut monitor = NodeMonitor::new_with_metrics(
            self.gateway.clone(),
            sink,
            settings,
            Some(self.metrics.clone()),
        )
        .await?;
        Ok(monitor.monitor().await?)
    }
}
