use std::time::Duration;

use kitchen_monitor_types::{OrderRunStatus, TaskStatus};
use prometheus::{Encoder, TextEncoder};

use crate::metrics::*;

/// Partition an order ends up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    Succeeded,
    TimedOut,
    FailedToSubmit,
}

impl OrderOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            OrderOutcome::Succeeded => "succeeded",
            OrderOutcome::TimedOut => "timed_out",
            OrderOutcome::FailedToSubmit => "failed_to_submit",
        }
    }
}

/// Records monitor activity into the process-wide Prometheus registry
#[derive(Debug, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ORDER METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record a create or resume call being issued
    pub fn record_order_submitted(&self, action: &str) {
        ORDERS_SUBMITTED.with_label_values(&[action]).inc();
    }

    pub fn record_order_outcome(&self, outcome: OrderOutcome) {
        ORDER_OUTCOMES.with_label_values(&[outcome.as_label()]).inc();
    }

    pub fn record_terminal_status(&self, status: OrderRunStatus) {
        ORDER_RUN_TERMINAL_STATUS
            .with_label_values(&[status.as_str()])
            .inc();
    }

    pub fn record_status_poll_error(&self) {
        STATUS_POLL_ERRORS.inc();
    }

    /// Set the number of runs still being polled
    pub fn set_active_order_runs(&self, count: usize) {
        ACTIVE_ORDER_RUNS.set(count as i64);
    }

    pub fn record_batch_duration(&self, duration: Duration) {
        BATCH_DURATION.observe(duration.as_secs_f64());
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // NODE EVENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_node_event(&self, status: TaskStatus) {
        let label = match status {
            TaskStatus::Started => "started",
            TaskStatus::Completed => "completed",
            TaskStatus::Warning => "warning",
            TaskStatus::Error => "error",
        };
        NODE_EVENTS.with_label_values(&[label]).inc();
    }

    pub fn record_event_publish_failure(&self) {
        EVENT_PUBLISH_FAILURES.inc();
    }

    /// Export all metrics in the Prometheus text format
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics encoding error: {0}")]
    EncodingError(String),
}
