use async_trait::async_trait;
use kitchen_monitor_types::{
    CloseRunEvent, OrderRun, OrderRunDetails, OrderRunStatus, TaskStatusEvent,
};
use serde_json::Value;
use std::collections::HashMap;

use crate::{EventSinkError, GatewayError};

/// Order operations of the remote platform the monitors depend on
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Create an order and return its id
    async fn create_order(
        &self,
        kitchen: &str,
        recipe: &str,
        variation: &str,
        parameters: &HashMap<String, Value>,
    ) -> Result<String, GatewayError>;

    /// Resume a failed order run and return the id of its order
    async fn resume_order_run(
        &self,
        kitchen: &str,
        order_run_id: &str,
    ) -> Result<String, GatewayError>;

    /// List the runs of an order. Empty when the order has no runs yet.
    async fn get_order_runs(
        &self,
        kitchen: &str,
        order_id: &str,
    ) -> Result<Vec<OrderRun>, GatewayError>;

    /// Current status of a run, `None` when the platform does not know it
    async fn get_order_run_status(
        &self,
        kitchen: &str,
        order_run_id: &str,
    ) -> Result<Option<OrderRunStatus>, GatewayError>;

    /// Node-level view of a run
    async fn get_order_run_details(
        &self,
        kitchen: &str,
        order_run_id: &str,
        include_summary: bool,
    ) -> Result<OrderRunDetails, GatewayError>;
}

/// Receiver of pipeline lifecycle events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn post_task_status(&self, event: &TaskStatusEvent) -> Result<(), EventSinkError>;

    async fn post_close_run(&self, event: &CloseRunEvent) -> Result<(), EventSinkError>;
}
