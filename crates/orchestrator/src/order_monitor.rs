use chrono::Utc;
use kitchen_monitor_client::{GatewayError, OrderGateway};
use kitchen_monitor_metrics::{MetricsCollector, OrderOutcome};
use kitchen_monitor_types::{MonitorResult, OrderRun, OrderRunStatus, OrderSpec, OrderTarget};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::batch::{batch_size, into_batches};
use crate::{MonitorError, WaitLoop};

/// Which submission call a batch uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmitMode {
    Create,
    Resume,
}

impl SubmitMode {
    fn as_str(&self) -> &'static str {
        match self {
            SubmitMode::Create => "create",
            SubmitMode::Resume => "resume",
        }
    }
}

/// A submitted order waiting for a terminal status
#[derive(Debug)]
struct PendingOrder {
    spec: OrderSpec,
    order_id: String,
    /// Runs that started before this instant (ms since epoch) are stale
    not_before: Option<i64>,
}

/// Submits orders in bounded batches and polls their runs to completion.
///
/// Everything runs sequentially on the calling task: at most `max_concurrent`
/// remote order runs are outstanding at once, but only one HTTP call is in
/// flight at any time.
pub struct OrderRunMonitor {
    gateway: Arc<dyn OrderGateway>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl OrderRunMonitor {
    pub fn new(gateway: Arc<dyn OrderGateway>) -> Self {
        Self {
            gateway,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Create every order and wait for its run to reach a terminal status
    pub async fn create_and_monitor_orders(
        &self,
        order_specs: Vec<OrderSpec>,
        poll_interval: Duration,
        max_total_wait: Duration,
        max_concurrent: Option<usize>,
    ) -> MonitorResult {
        self.monitor_in_batches(
            SubmitMode::Create,
            order_specs,
            poll_interval,
            max_total_wait,
            max_concurrent,
        )
        .await
    }

    /// Resume every order run and wait for the new run to reach a terminal
    /// status.
    ///
    /// Only a run whose start time is at or after the resume call counts as
    /// the new run. The comparison uses the local clock against the
    /// platform's `start-time`, so clock skew between the two can hide the
    /// new run until the deadline passes.
    pub async fn resume_and_monitor_orders(
        &self,
        order_specs: Vec<OrderSpec>,
        poll_interval: Duration,
        max_total_wait: Duration,
        max_concurrent: Option<usize>,
    ) -> MonitorResult {
        self.monitor_in_batches(
            SubmitMode::Resume,
            order_specs,
            poll_interval,
            max_total_wait,
            max_concurrent,
        )
        .await
    }

    /// Poll a single order run until it is terminal. Returns `None` if it is
    /// still running when `duration` has elapsed.
    pub async fn monitor_order_run(
        &self,
        kitchen: &str,
        order_run_id: &str,
        poll_interval: Duration,
        duration: Duration,
    ) -> Option<OrderRunStatus> {
        let mut wait_loop = WaitLoop::new(poll_interval, duration);

        while wait_loop.tick().await {
            match self
                .gateway
                .get_order_run_status(kitchen, order_run_id)
                .await
            {
                Ok(Some(status)) if status.is_terminal() => {
                    info!(order_run_id = %order_run_id, status = %status, "Order run finished");
                    self.record(|m| m.record_terminal_status(status));
                    return Some(status);
                }
                Ok(status) => {
                    debug!(order_run_id = %order_run_id, status = ?status, "Order run still running");
                }
                Err(e) => {
                    warn!(order_run_id = %order_run_id, error = %e, "Failed to get order run status");
                    self.record(|m| m.record_status_poll_error());
                }
            }
        }

        warn!(
            order_run_id = %order_run_id,
            waited_secs = wait_loop.elapsed().as_secs(),
            "Timed out waiting for order run"
        );
        None
    }

    async fn monitor_in_batches(
        &self,
        mode: SubmitMode,
        order_specs: Vec<OrderSpec>,
        poll_interval: Duration,
        max_total_wait: Duration,
        max_concurrent: Option<usize>,
    ) -> MonitorResult {
        let mut result = MonitorResult::default();
        if order_specs.is_empty() {
            return result;
        }

        let size = batch_size(order_specs.len(), max_concurrent);
        let batches = into_batches(order_specs, size);
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            info!(
                action = mode.as_str(),
                batch = index + 1,
                batches = batch_count,
                orders = batch.len(),
                "Submitting order batch"
            );
            let started = Instant::now();

            let (pending, failed_to_submit) = self.submit_batch(mode, batch).await;
            let (succeeded, timed_out) = self
                .poll_batch(pending, poll_interval, max_total_wait)
                .await;

            info!(
                batch = index + 1,
                succeeded = succeeded.len(),
                timed_out = timed_out.len(),
                failed_to_submit = failed_to_submit.len(),
                "Order batch finished"
            );
            self.record(|m| {
                m.record_batch_duration(started.elapsed());
                for _ in &succeeded {
                    m.record_order_outcome(OrderOutcome::Succeeded);
                }
                for _ in &timed_out {
                    m.record_order_outcome(OrderOutcome::TimedOut);
                }
                for _ in &failed_to_submit {
                    m.record_order_outcome(OrderOutcome::FailedToSubmit);
                }
            });

            result.extend(MonitorResult {
                succeeded,
                timed_out,
                failed_to_submit,
            });
        }

        result
    }

    /// Submit each order in list order. A failed submission only affects
    /// that order.
    async fn submit_batch(
        &self,
        mode: SubmitMode,
        batch: Vec<OrderSpec>,
    ) -> (Vec<PendingOrder>, Vec<OrderSpec>) {
        let mut pending = Vec::with_capacity(batch.len());
        let mut failed = Vec::new();

        for mut spec in batch {
            match self.submit(mode, &spec).await {
                Ok((order_id, not_before)) => {
                    self.record(|m| m.record_order_submitted(mode.as_str()));
                    spec.order_id = Some(order_id.clone());
                    // a run id from an earlier submission belongs to another order
                    spec.order_run_id = None;
                    spec.order_run_status = None;
                    pending.push(PendingOrder {
                        spec,
                        order_id,
                        not_before,
                    });
                }
                Err(e) => {
                    error!(order = %spec.label(), error = %e, "Failed to submit order");
                    failed.push(spec);
                }
            }
        }

        (pending, failed)
    }

    async fn submit(
        &self,
        mode: SubmitMode,
        spec: &OrderSpec,
    ) -> Result<(String, Option<i64>), MonitorError> {
        match (&spec.target, mode) {
            (
                OrderTarget::Create {
                    recipe,
                    variation,
                    parameters,
                },
                SubmitMode::Create,
            ) => {
                let order_id = self
                    .gateway
                    .create_order(&spec.kitchen, recipe, variation, parameters)
                    .await?;
                Ok((order_id, None))
            }
            (OrderTarget::Resume { order_run_id }, SubmitMode::Resume) => {
                let resumed_at = Utc::now().timestamp_millis();
                let order_id = self
                    .gateway
                    .resume_order_run(&spec.kitchen, order_run_id)
                    .await?;
                Ok((order_id, Some(resumed_at)))
            }
            _ => Err(MonitorError::TargetMismatch {
                label: spec.label(),
                expected: mode.as_str(),
            }),
        }
    }

    /// Poll the submitted orders until each is terminal or the batch deadline
    /// passes. Terminal orders are never polled again.
    async fn poll_batch(
        &self,
        mut pending: Vec<PendingOrder>,
        poll_interval: Duration,
        max_total_wait: Duration,
    ) -> (Vec<OrderSpec>, Vec<OrderSpec>) {
        let mut succeeded = Vec::with_capacity(pending.len());
        let mut wait_loop = WaitLoop::new(poll_interval, max_total_wait);

        while !pending.is_empty() && wait_loop.tick().await {
            let mut still_pending = Vec::with_capacity(pending.len());

            for mut order in pending {
                if let Some(status) = self.poll_status(&mut order).await {
                    order.spec.order_run_status = Some(status);
                }

                if !order.spec.is_terminal() {
                    still_pending.push(order);
                    continue;
                }

                if let Some(status) = order.spec.order_run_status {
                    info!(
                        order = %order.spec.label(),
                        order_run_id = ?order.spec.order_run_id,
                        status = %status,
                        "Order run reached terminal status"
                    );
                    self.record(|m| m.record_terminal_status(status));
                }
                succeeded.push(order.spec);
            }

            pending = still_pending;
            let active = pending.len();
            self.record(|m| m.set_active_order_runs(active));
        }

        if !pending.is_empty() {
            warn!(
                orders = pending.len(),
                waited_secs = wait_loop.elapsed().as_secs(),
                "Orders still running at deadline"
            );
        }
        self.record(|m| m.set_active_order_runs(0));

        let timed_out = pending.into_iter().map(|order| order.spec).collect();
        (succeeded, timed_out)
    }

    /// Current status of an order's run, or `None` if it cannot be determined
    /// this round.
    async fn poll_status(&self, order: &mut PendingOrder) -> Option<OrderRunStatus> {
        let kitchen = order.spec.kitchen.clone();

        if order.spec.order_run_id.is_none() {
            match self.resolve_order_run_id(order).await {
                Ok(Some(order_run_id)) => {
                    debug!(order_id = %order.order_id, order_run_id = %order_run_id, "Found order run");
                    order.spec.order_run_id = Some(order_run_id);
                }
                Ok(None) => {
                    debug!(order_id = %order.order_id, "Order run not started yet");
                    return None;
                }
                Err(e) => {
                    warn!(order_id = %order.order_id, error = %e, "Failed to list order runs");
                    self.record(|m| m.record_status_poll_error());
                    return None;
                }
            }
        }

        let order_run_id = order.spec.order_run_id.as_deref()?;
        match self
            .gateway
            .get_order_run_status(&kitchen, order_run_id)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                warn!(order_run_id = %order_run_id, error = %e, "Failed to get order run status");
                self.record(|m| m.record_status_poll_error());
                None
            }
        }
    }

    async fn resolve_order_run_id(
        &self,
        order: &PendingOrder,
    ) -> Result<Option<String>, GatewayError> {
        let runs = self
            .gateway
            .get_order_runs(&order.spec.kitchen, &order.order_id)
            .await?;

        Ok(latest_run(&runs, order.not_before).map(|run| run.hid.clone()))
    }

    fn record(&self, f: impl FnOnce(&MetricsCollector)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}

/// Most recently started run, ignoring runs that started before `not_before`
fn latest_run(runs: &[OrderRun], not_before: Option<i64>) -> Option<&OrderRun> {
    match not_before {
        Some(cutoff) => runs
            .iter()
            .filter(|run| run.start_time.is_some_and(|start| start >= cutoff))
            .max_by_key(|run| run.start_time),
        None => runs.iter().max_by_key(|run| run.start_time),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitchen_monitor_client::MockGateway;

    const POLL: Duration = Duration::from_secs(10);
    const WAIT: Duration = Duration::from_secs(60);

    fn run(hid: &str, start_time: Option<i64>) -> OrderRun {
        OrderRun {
            hid: hid.to_string(),
            start_time,
        }
    }

    fn labels(specs: &[OrderSpec]) -> Vec<String> {
        specs.iter().map(OrderSpec::label).collect()
    }

    #[test]
    fn test_latest_run_without_cutoff() {
        let runs = vec![run("a", Some(10)), run("b", Some(30)), run("c", Some(20))];
        assert_eq!(latest_run(&runs, None).unwrap().hid, "b");

        let untimed = vec![run("a", None), run("b", None)];
        assert_eq!(latest_run(&untimed, None).unwrap().hid, "b");

        assert!(latest_run(&[], None).is_none());
    }

    #[test]
    fn test_latest_run_ignores_stale_runs() {
        let runs = vec![run("old", Some(100)), run("new", Some(500)), run("untimed", None)];

        assert_eq!(latest_run(&runs, Some(400)).unwrap().hid, "new");
        assert_eq!(latest_run(&runs, Some(500)).unwrap().hid, "new");
        assert!(latest_run(&runs, Some(501)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_completed_one_failed_submission() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_order("recipe-a", "order-a", "run-a")
                .with_order("recipe-b", "order-b", "run-b")
                .failing_submission("recipe-b")
                .with_statuses("run-a", vec![Some(OrderRunStatus::Completed)]),
        );
        let monitor = OrderRunMonitor::new(gateway.clone());

        let specs = vec![
            OrderSpec::create("prod", "recipe-a", "default"),
            OrderSpec::create("prod", "recipe-b", "default"),
        ];
        let result = monitor
            .create_and_monitor_orders(specs, POLL, WAIT, Some(1))
            .await;

        assert_eq!(labels(&result.succeeded), vec!["prod/recipe-a/default"]);
        assert_eq!(labels(&result.failed_to_submit), vec!["prod/recipe-b/default"]);
        assert!(result.timed_out.is_empty());

        let a = &result.succeeded[0];
        assert_eq!(a.order_id.as_deref(), Some("order-a"));
        assert_eq!(a.order_run_id.as_deref(), Some("run-a"));
        assert_eq!(a.order_run_status, Some(OrderRunStatus::Completed));
        assert_eq!(gateway.call_count("status:run-a").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_run_one_after_another() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_order("a", "order-a", "run-a")
                .with_order("b", "order-b", "run-b")
                .with_order("c", "order-c", "run-c")
                .with_statuses(
                    "run-a",
                    vec![Some(OrderRunStatus::Active), Some(OrderRunStatus::Completed)],
                )
                .with_statuses("run-b", vec![Some(OrderRunStatus::Error)])
                .with_statuses("run-c", vec![Some(OrderRunStatus::Stopped)]),
        );
        let monitor = OrderRunMonitor::new(gateway.clone());

        let specs = vec![
            OrderSpec::create("k", "a", "v"),
            OrderSpec::create("k", "b", "v"),
            OrderSpec::create("k", "c", "v"),
        ];
        let result = monitor
            .create_and_monitor_orders(specs, POLL, WAIT, Some(2))
            .await;

        assert_eq!(result.succeeded.len(), 3);
        assert_eq!(result.total(), 3);

        let calls = gateway.calls().await;
        let create_c = calls.iter().position(|c| c == "create:c").unwrap();
        let last_status_a = calls.iter().rposition(|c| c == "status:run-a").unwrap();
        assert!(last_status_a < create_c, "second batch started early: {calls:?}");

        // run-b was terminal on the first poll and never polled again
        assert_eq!(gateway.call_count("status:run-b").await, 1);
        assert_eq!(gateway.call_count("status:run-a").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_keeps_last_known_status() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_order("slow", "order-slow", "run-slow")
                .with_order("never", "order-never", "run-never")
                .with_statuses("run-slow", vec![Some(OrderRunStatus::Active)]),
        );
        let monitor = OrderRunMonitor::new(gateway.clone());

        let specs = vec![
            OrderSpec::create("k", "slow", "v"),
            OrderSpec::create("k", "never", "v"),
        ];
        let result = monitor
            .create_and_monitor_orders(specs, POLL, Duration::from_secs(35), None)
            .await;

        assert!(result.succeeded.is_empty());
        assert_eq!(result.timed_out.len(), 2);
        assert_eq!(
            result.timed_out[0].order_run_status,
            Some(OrderRunStatus::Active)
        );
        assert_eq!(result.timed_out[1].order_run_status, None);
        // polled at 0s, 10s, 20s and 30s
        assert_eq!(gateway.call_count("status:run-slow").await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_errors_do_not_abort_polling() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_order("flaky", "order-flaky", "run-flaky")
                .failing_status("run-flaky", 2)
                .with_statuses("run-flaky", vec![Some(OrderRunStatus::Completed)]),
        );
        let monitor = OrderRunMonitor::new(gateway.clone());

        let result = monitor
            .create_and_monitor_orders(vec![OrderSpec::create("k", "flaky", "v")], POLL, WAIT, None)
            .await;

        assert_eq!(result.succeeded.len(), 1);
        assert_eq!(gateway.call_count("status:run-flaky").await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_skips_previous_run() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_resume("old-run", "order-1", "new-run")
                .with_statuses("old-run", vec![Some(OrderRunStatus::Error)])
                .with_statuses(
                    "new-run",
                    vec![Some(OrderRunStatus::Active), Some(OrderRunStatus::Completed)],
                ),
        );
        let monitor = OrderRunMonitor::new(gateway.clone());

        let result = monitor
            .resume_and_monitor_orders(vec![OrderSpec::resume("k", "old-run")], POLL, WAIT, None)
            .await;

        assert_eq!(result.succeeded.len(), 1);
        let spec = &result.succeeded[0];
        assert_eq!(spec.order_id.as_deref(), Some("order-1"));
        assert_eq!(spec.order_run_id.as_deref(), Some("new-run"));
        assert_eq!(spec.order_run_status, Some(OrderRunStatus::Completed));
        assert_eq!(gateway.call_count("status:old-run").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmitted_spec_ignores_previous_run() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_order("etl", "order-1", "run-new")
                .with_statuses("run-new", vec![Some(OrderRunStatus::Active)])
                .with_statuses("run-old", vec![Some(OrderRunStatus::Completed)]),
        );
        let monitor = OrderRunMonitor::new(gateway.clone());

        let mut spec = OrderSpec::create("prod", "etl", "daily");
        spec.order_run_id = Some("run-old".to_string());
        spec.order_run_status = Some(OrderRunStatus::Completed);

        let result = monitor
            .create_and_monitor_orders(vec![spec], POLL, Duration::from_secs(30), None)
            .await;

        assert!(result.succeeded.is_empty());
        assert_eq!(result.timed_out.len(), 1);
        assert_eq!(result.timed_out[0].order_run_id.as_deref(), Some("run-new"));
        assert_eq!(
            result.timed_out[0].order_run_status,
            Some(OrderRunStatus::Active)
        );
        assert_eq!(gateway.call_count("status:run-old").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_target_fails_submission() {
        let gateway = Arc::new(MockGateway::new().with_order("a", "order-a", "run-a"));
        let monitor = OrderRunMonitor::new(gateway.clone());

        let result = monitor
            .create_and_monitor_orders(vec![OrderSpec::resume("k", "run-x")], POLL, WAIT, None)
            .await;

        assert_eq!(result.failed_to_submit.len(), 1);
        assert!(gateway.calls().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_input() {
        let monitor = OrderRunMonitor::new(Arc::new(MockGateway::new()));

        let result = monitor
            .create_and_monitor_orders(Vec::new(), POLL, WAIT, Some(0))
            .await;

        assert_eq!(result, MonitorResult::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_order_run_stuck_in_planned() {
        let gateway = Arc::new(
            MockGateway::new().with_statuses("run-1", vec![Some(OrderRunStatus::Planned)]),
        );
        let monitor = OrderRunMonitor::new(gateway.clone());

        let status = monitor
            .monitor_order_run("k", "run-1", Duration::from_secs(1), Duration::from_secs(5))
            .await;

        assert_eq!(status, None);
        assert_eq!(gateway.call_count("status:run-1").await, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_order_run_finishes() {
        let gateway = Arc::new(MockGateway::new().with_statuses(
            "run-1",
            vec![
                None,
                Some(OrderRunStatus::Active),
                Some(OrderRunStatus::Reran),
            ],
        ));
        let monitor = OrderRunMonitor::new(gateway);

        let status = monitor
            .monitor_order_run("k", "run-1", Duration::from_secs(1), Duration::from_secs(30))
            .await;

        assert_eq!(status, Some(OrderRunStatus::Reran));
    }
}
