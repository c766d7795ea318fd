//! Metrics and logging setup for the order-run monitors
//!
//! - Prometheus counters for order submissions, batch outcomes, status polling
//!   and node events, exported in the text exposition format
//! - `tracing` subscriber initialisation (plain or JSON output)
//! - Correlation ids for following one monitored run through the logs
//!
//! # Example
//!
//! ```no_run
//! use kitchen_monitor_metrics::{init_tracing, MetricsCollector};
//!
//! init_tracing("info", false).unwrap();
//!
//! let collector = MetricsCollector::new();
//! collector.record_order_submitted("create");
//! println!("{}", collector.export_metrics().unwrap());
//! ```

pub mod collector;
pub mod logging;
pub mod metrics;

pub use collector::{MetricsCollector, MetricsError, OrderOutcome};
pub use logging::{init_tracing, CorrelationId, RunSpan, TracingError};
