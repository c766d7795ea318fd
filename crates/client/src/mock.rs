//! In-memory gateway and event sink for tests and dry runs

use async_trait::async_trait;
use chrono::Utc;
use kitchen_monitor_types::{
    CloseRunEvent, OrderRun, OrderRunDetails, OrderRunStatus, TaskStatusEvent,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;

use crate::{EventSink, EventSinkError, GatewayError, OrderGateway};

#[derive(Default)]
struct GatewayState {
    /// recipe -> (order id, run id)
    orders: HashMap<String, (String, String)>,
    /// previous run id -> (order id, new run id)
    resumes: HashMap<String, (String, String)>,
    failing_submissions: HashSet<String>,
    runs: HashMap<String, Vec<OrderRun>>,
    statuses: HashMap<String, VecDeque<Option<OrderRunStatus>>>,
    status_failures: HashMap<String, u32>,
    details: VecDeque<Result<OrderRunDetails, u16>>,
    calls: Vec<String>,
}

/// Scripted `OrderGateway`.
///
/// Status and details scripts are consumed one entry per call; the last
/// entry repeats forever.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<GatewayState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creating `recipe` returns `order_id`, whose only run is `run_id`
    pub fn with_order(
        mut self,
        recipe: impl Into<String>,
        order_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        self.state
            .get_mut()
            .orders
            .insert(recipe.into(), (order_id.into(), run_id.into()));
        self
    }

    /// Resuming `previous_run_id` returns `order_id`. The order then lists the
    /// previous run (started long ago) ahead of `new_run_id`.
    pub fn with_resume(
        mut self,
        previous_run_id: impl Into<String>,
        order_id: impl Into<String>,
        new_run_id: impl Into<String>,
    ) -> Self {
        self.state
            .get_mut()
            .resumes
            .insert(previous_run_id.into(), (order_id.into(), new_run_id.into()));
        self
    }

    /// Submissions for this recipe or previous run id fail
    pub fn failing_submission(mut self, key: impl Into<String>) -> Self {
        self.state.get_mut().failing_submissions.insert(key.into());
        self
    }

    pub fn with_statuses(
        mut self,
        run_id: impl Into<String>,
        statuses: Vec<Option<OrderRunStatus>>,
    ) -> Self {
        self.state
            .get_mut()
            .statuses
            .insert(run_id.into(), statuses.into());
        self
    }

    /// The next `times` status reads of `run_id` fail with a 503
    pub fn failing_status(mut self, run_id: impl Into<String>, times: u32) -> Self {
        self.state
            .get_mut()
            .status_failures
            .insert(run_id.into(), times);
        self
    }

    pub fn with_details(mut self, details: OrderRunDetails) -> Self {
        self.state.get_mut().details.push_back(Ok(details));
        self
    }

    /// Queue a details read failing with the given HTTP status
    pub fn with_details_error(mut self, status: u16) -> Self {
        self.state.get_mut().details.push_back(Err(status));
        self
    }

    /// Every gateway call so far, e.g. `create:etl` or `status:run-1`
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn call_count(&self, call: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.as_str() == call)
            .count()
    }
}

fn rejected(endpoint: &str, status: u16) -> GatewayError {
    GatewayError::Http {
        endpoint: endpoint.to_string(),
        status,
        body: "mock failure".to_string(),
    }
}

#[async_trait]
impl OrderGateway for MockGateway {
    async fn create_order(
        &self,
        _kitchen: &str,
        recipe: &str,
        _variation: &str,
        _parameters: &HashMap<String, Value>,
    ) -> Result<String, GatewayError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("create:{recipe}"));

        if state.failing_submissions.contains(recipe) {
            return Err(rejected("create", 400));
        }
        let (order_id, run_id) = state
            .orders
            .get(recipe)
            .cloned()
            .ok_or_else(|| rejected("create", 404))?;

        state.runs.insert(
            order_id.clone(),
            vec![OrderRun {
                hid: run_id,
                start_time: Some(Utc::now().timestamp_millis()),
            }],
        );
        Ok(order_id)
    }

    async fn resume_order_run(
        &self,
        _kitchen: &str,
        order_run_id: &str,
    ) -> Result<String, GatewayError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("resume:{order_run_id}"));

        if state.failing_submissions.contains(order_run_id) {
            return Err(rejected("resume", 400));
        }
        let (order_id, new_run_id) = state
            .resumes
            .get(order_run_id)
            .cloned()
            .ok_or_else(|| rejected("resume", 404))?;

        state.runs.insert(
            order_id.clone(),
            vec![
                OrderRun {
                    hid: order_run_id.to_string(),
                    start_time: Some(0),
                },
                OrderRun {
                    hid: new_run_id,
                    start_time: Some(Utc::now().timestamp_millis()),
                },
            ],
        );
        Ok(order_id)
    }

    async fn get_order_runs(
        &self,
        _kitchen: &str,
        order_id: &str,
    ) -> Result<Vec<OrderRun>, GatewayError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("runs:{order_id}"));
        Ok(state.runs.get(order_id).cloned().unwrap_or_default())
    }

    async fn get_order_run_status(
        &self,
        _kitchen: &str,
        order_run_id: &str,
    ) -> Result<Option<OrderRunStatus>, GatewayError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("status:{order_run_id}"));

        if let Some(remaining) = state.status_failures.get_mut(order_run_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(rejected("status", 503));
            }
        }

        let Some(script) = state.statuses.get_mut(order_run_id) else {
            return Ok(None);
        };
        if script.len() > 1 {
            Ok(script.pop_front().flatten())
        } else {
            Ok(script.front().copied().flatten())
        }
    }

    async fn get_order_run_details(
        &self,
        _kitchen: &str,
        order_run_id: &str,
        _include_summary: bool,
    ) -> Result<OrderRunDetails, GatewayError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("details:{order_run_id}"));

        let next = if state.details.len() > 1 {
            state.details.pop_front()
        } else {
            state.details.front().cloned()
        };

        match next {
            Some(Ok(details)) => Ok(details),
            Some(Err(status)) => Err(rejected("details", status)),
            None => Err(GatewayError::OrderRunNotFound(order_run_id.to_string())),
        }
    }
}

#[derive(Default)]
struct SinkState {
    task_events: Vec<TaskStatusEvent>,
    close_runs: Vec<CloseRunEvent>,
    fail_task_status: bool,
    fail_close_run: bool,
}

/// `EventSink` that keeps every event it receives
#[derive(Default)]
pub struct RecordingEventSink {
    state: Mutex<SinkState>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every task status event
    pub fn failing_task_status(mut self) -> Self {
        self.state.get_mut().fail_task_status = true;
        self
    }

    /// Reject close-run events (they are still recorded)
    pub fn failing_close_run(mut self) -> Self {
        self.state.get_mut().fail_close_run = true;
        self
    }

    pub async fn task_events(&self) -> Vec<TaskStatusEvent> {
        self.state.lock().await.task_events.clone()
    }

    pub async fn close_runs(&self) -> Vec<CloseRunEvent> {
        self.state.lock().await.close_runs.clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn post_task_status(&self, event: &TaskStatusEvent) -> Result<(), EventSinkError> {
        let mut state = self.state.lock().await;
        if state.fail_task_status {
            return Err(EventSinkError::Rejected(format!(
                "task status for {}",
                event.task_name
            )));
        }
        state.task_events.push(event.clone());
        Ok(())
    }

    async fn post_close_run(&self, event: &CloseRunEvent) -> Result<(), EventSinkError> {
        let mut state = self.state.lock().await;
        state.close_runs.push(event.clone());
        if state.fail_close_run {
            return Err(EventSinkError::Rejected(format!(
                "close run for {}",
                event.pipeline_name
            )));
        }
        Ok(())
    }
}
