use kitchen_monitor_client::{EventSink, OrderGateway};
use kitchen_monitor_metrics::{MetricsCollector, RunSpan};
use kitchen_monitor_types::{CloseRunEvent, Node, OrderRunDetails, TaskStatus, TaskStatusEvent};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

use crate::MonitorError;

/// Which order run to watch and where its events go
#[derive(Debug, Clone)]
pub struct NodeMonitorSettings {
    pub kitchen: String,
    pub order_run_id: String,
    /// Pipeline name used for every published event
    pub pipeline_name: String,
    /// Node running this monitor, if the monitor runs inside the order itself
    pub monitor_node_name: Option<String>,
    /// Pause between detail fetches
    pub sleep_time: Duration,
}

impl NodeMonitorSettings {
    pub fn new(
        kitchen: impl Into<String>,
        order_run_id: impl Into<String>,
        pipeline_name: impl Into<String>,
    ) -> Self {
        Self {
            kitchen: kitchen.into(),
            order_run_id: order_run_id.into(),
            pipeline_name: pipeline_name.into(),
            monitor_node_name: None,
            sleep_time: Duration::from_secs(5),
        }
    }

    pub fn with_monitor_node(mut self, name: impl Into<String>) -> Self {
        self.monitor_node_name = Some(name.into());
        self
    }

    pub fn with_sleep_time(mut self, sleep_time: Duration) -> Self {
        self.sleep_time = sleep_time;
        self
    }
}

/// Event published when a node is observed in this state, if any
fn event_for(node: &Node) -> Option<TaskStatus> {
    if node.running() {
        Some(TaskStatus::Started)
    } else if node.succeeded() || node.stopped() {
        Some(TaskStatus::Completed)
    } else if node.failed() {
        Some(TaskStatus::Error)
    } else {
        None
    }
}

/// Mirrors the node states of one order run to an event sink.
///
/// The set of ignored nodes (branch conditions plus the monitor's own node)
/// is computed once at construction from the first detail fetch.
pub struct NodeMonitor {
    gateway: Arc<dyn OrderGateway>,
    sink: Arc<dyn EventSink>,
    metrics: Option<Arc<MetricsCollector>>,
    settings: NodeMonitorSettings,
    ignored: BTreeSet<String>,
    nodes: BTreeMap<String, Node>,
    run_span: RunSpan,
}

impl NodeMonitor {
    pub async fn new(
        gateway: Arc<dyn OrderGateway>,
        sink: Arc<dyn EventSink>,
        settings: NodeMonitorSettings,
    ) -> Result<Self, MonitorError> {
        Self::new_with_metrics(gateway, sink, settings, None).await
    }

    /// Fetch the run once, then publish the event implied by each node's
    /// starting status.
    pub async fn new_with_metrics(
        gateway: Arc<dyn OrderGateway>,
        sink: Arc<dyn EventSink>,
        settings: NodeMonitorSettings,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self, MonitorError> {
        let run_span = RunSpan::new(&settings.kitchen, &settings.order_run_id);
        let span = run_span.span();

        let details = gateway
            .get_order_run_details(&settings.kitchen, &settings.order_run_id, true)
            .instrument(span.clone())
            .await?;

        let mut ignored = details.conditions.clone();
        if let Some(own) = &settings.monitor_node_name {
            ignored.insert(own.clone());
        }

        let mut monitor = Self {
            gateway,
            sink,
            metrics,
            settings,
            ignored,
            nodes: BTreeMap::new(),
            run_span,
        };

        let details = details.without(&monitor.ignored);
        span.in_scope(|| {
            info!(
                nodes = details.nodes.len(),
                ignored = monitor.ignored.len(),
                "Monitoring order run nodes"
            )
        });
        monitor.update_nodes(details).instrument(span).await?;

        Ok(monitor)
    }

    /// Names of nodes never reported
    pub fn ignored_nodes(&self) -> &BTreeSet<String> {
        &self.ignored
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Poll until no node is running, then close the run.
    ///
    /// Returns the names of the succeeded and failed nodes. Nodes that were
    /// skipped, stopped or never ran are in neither list. The close-run event
    /// is attempted exactly once whichever way the loop ends.
    pub async fn monitor(&mut self) -> Result<(Vec<String>, Vec<String>), MonitorError> {
        let span = self.run_span.span();

        let outcome = self.watch().instrument(span.clone()).await;
        let closed = self.close_run().instrument(span).await;

        match (outcome, closed) {
            (Ok(nodes), Ok(())) => Ok(nodes),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    async fn watch(&mut self) -> Result<(Vec<String>, Vec<String>), MonitorError> {
        while self.any_running() {
            tokio::time::sleep(self.settings.sleep_time).await;

            let details = self
                .gateway
                .get_order_run_details(&self.settings.kitchen, &self.settings.order_run_id, true)
                .await
                .inspect_err(|e| error!(error = %e, "Failed to fetch order run details"))?;
            self.update_nodes(details.without(&self.ignored)).await?;
        }

        let succeeded = self.names_where(Node::succeeded);
        let failed = self.names_where(Node::failed);
        info!(
            succeeded = succeeded.len(),
            failed = failed.len(),
            "Order run nodes finished"
        );
        Ok((succeeded, failed))
    }

    /// Record new statuses and publish an event for every node that changed
    async fn update_nodes(&mut self, details: OrderRunDetails) -> Result<(), MonitorError> {
        // a node that left the details can never settle, so stop tracking it
        self.nodes.retain(|name, _| {
            let present = details.nodes.contains_key(name);
            if !present {
                warn!(node = %name, "Node missing from order run details");
            }
            present
        });

        for (name, status) in details.nodes {
            if self
                .nodes
                .get(&name)
                .is_some_and(|node| node.status == status)
            {
                continue;
            }

            debug!(node = %name, status = %status, "Node status changed");
            let node = Node::new(name.clone(), status);
            self.publish(&node).await?;
            self.nodes.insert(name, node);
        }
        Ok(())
    }

    async fn publish(&self, node: &Node) -> Result<(), MonitorError> {
        let Some(task_status) = event_for(node) else {
            return Ok(());
        };

        let event = TaskStatusEvent::now(&self.settings.pipeline_name, &node.name, task_status);
        match self.sink.post_task_status(&event).await {
            Ok(()) => {
                info!(node = %node.name, task_status = ?task_status, "Published node event");
                self.record(|m| m.record_node_event(task_status));
                Ok(())
            }
            Err(e) => {
                error!(node = %node.name, error = %e, "Failed to publish node event");
                self.record(|m| m.record_event_publish_failure());
                Err(e.into())
            }
        }
    }

    async fn close_run(&self) -> Result<(), MonitorError> {
        let event = CloseRunEvent::now(&self.settings.pipeline_name);
        match self.sink.post_close_run(&event).await {
            Ok(()) => {
                info!(pipeline = %self.settings.pipeline_name, "Closed run");
                Ok(())
            }
            Err(e) => {
                error!(pipeline = %self.settings.pipeline_name, error = %e, "Failed to close run");
                self.record(|m| m.record_event_publish_failure());
                Err(e.into())
            }
        }
    }

    fn any_running(&self) -> bool {
        self.nodes.values().any(Node::running)
    }

    fn names_where(&self, predicate: impl Fn(&Node) -> bool) -> Vec<String> {
        self.nodes
            .values()
            .filter(|node| predicate(node))
            .map(|node| node.name.clone())
            .collect()
    }

    fn record(&self, f: impl FnOnce(&MetricsCollector)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}

impl std::fmt::Debug for NodeMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMonitor")
            .field("settings", &self.settings)
            .field("ignored", &self.ignored)
            .field("nodes", &self.nodes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitchen_monitor_client::{MockGateway, RecordingEventSink};
    use kitchen_monitor_types::NodeStatus;

    fn details(nodes: &[(&str, &str)]) -> OrderRunDetails {
        OrderRunDetails {
            nodes: nodes
                .iter()
                .map(|(name, status)| (name.to_string(), NodeStatus::from(*status)))
                .collect(),
            conditions: BTreeSet::new(),
        }
    }

    fn settings() -> NodeMonitorSettings {
        NodeMonitorSettings::new("prod", "run-1", "nightly").with_sleep_time(Duration::from_secs(1))
    }

    async fn task_statuses(sink: &RecordingEventSink) -> Vec<(String, TaskStatus)> {
        sink.task_events()
            .await
            .into_iter()
            .map(|event| (event.task_name, event.task_status))
            .collect()
    }

    #[test]
    fn test_event_for_status() {
        let event = |status: NodeStatus| event_for(&Node::new("n", status));

        assert_eq!(event(NodeStatus::Running), Some(TaskStatus::Started));
        assert_eq!(event(NodeStatus::Successful), Some(TaskStatus::Completed));
        assert_eq!(event(NodeStatus::Stopped), Some(TaskStatus::Completed));
        assert_eq!(event(NodeStatus::Failed), Some(TaskStatus::Error));
        assert_eq!(event(NodeStatus::Skipped), None);
        assert_eq!(event(NodeStatus::NotRun), None);
        assert_eq!(event(NodeStatus::Other("queued".to_string())), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_node_emits_once_per_transition() {
        let running = details(&[("load", "active_production")]);
        let gateway = Arc::new(
            MockGateway::new()
                .with_details(running.clone())
                .with_details(running.clone())
                .with_details(running.clone())
                .with_details(running)
                .with_details(details(&[("load", "completed_production")])),
        );
        let sink = Arc::new(RecordingEventSink::new());

        let mut monitor = NodeMonitor::new(gateway.clone(), sink.clone(), settings())
            .await
            .unwrap();
        let (succeeded, failed) = monitor.monitor().await.unwrap();

        assert_eq!(succeeded, vec!["load"]);
        assert!(failed.is_empty());
        assert_eq!(
            task_statuses(&sink).await,
            vec![
                ("load".to_string(), TaskStatus::Started),
                ("load".to_string(), TaskStatus::Completed),
            ]
        );
        assert_eq!(gateway.call_count("details:run-1").await, 5);
        assert_eq!(sink.close_runs().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failed_node_among_six() {
        let names = ["Node_1", "Node_2", "Node_3", "Node_4", "Node_5"];

        let mut start: Vec<(&str, &str)> =
            names.iter().map(|name| (*name, "active_production")).collect();
        start.push(("Fail_Node", "active_production"));

        let mut end: Vec<(&str, &str)> =
            names.iter().map(|name| (*name, "completed_production")).collect();
        end.push(("Fail_Node", "production_error"));

        let gateway = Arc::new(
            MockGateway::new()
                .with_details(details(&start))
                .with_details(details(&end)),
        );
        let sink = Arc::new(RecordingEventSink::new());

        let mut monitor = NodeMonitor::new(gateway, sink.clone(), settings())
            .await
            .unwrap();
        let (succeeded, failed) = monitor.monitor().await.unwrap();

        assert_eq!(succeeded, names.to_vec());
        assert_eq!(failed, vec!["Fail_Node"]);
        assert_eq!(sink.close_runs().await.len(), 1);
        assert_eq!(sink.close_runs().await[0].pipeline_name, "nightly");

        let events = task_statuses(&sink).await;
        assert_eq!(events.len(), 12);
        assert!(events.contains(&("Fail_Node".to_string(), TaskStatus::Error)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conditions_and_own_node_are_ignored() {
        let mut start = details(&[
            ("monitor", "active_production"),
            ("branch", "active_production"),
            ("load", "active_production"),
        ]);
        start.conditions.insert("branch".to_string());

        let gateway = Arc::new(
            MockGateway::new()
                .with_details(start)
                .with_details(details(&[
                    ("monitor", "active_production"),
                    ("branch", "active_production"),
                    ("load", "completed_production"),
                ])),
        );
        let sink = Arc::new(RecordingEventSink::new());

        let mut monitor = NodeMonitor::new(
            gateway,
            sink.clone(),
            settings().with_monitor_node("monitor"),
        )
        .await
        .unwrap();

        assert_eq!(
            monitor.ignored_nodes(),
            &BTreeSet::from(["branch".to_string(), "monitor".to_string()])
        );
        assert_eq!(monitor.nodes().count(), 1);

        // the still-running ignored nodes must not keep the loop alive
        let (succeeded, _) = monitor.monitor().await.unwrap();
        assert_eq!(succeeded, vec!["load"]);
        assert!(task_statuses(&sink)
            .await
            .iter()
            .all(|(name, _)| name == "load"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_and_stopped_nodes_are_in_neither_list() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_details(details(&[
                    ("extract", "active_production"),
                    ("transform", "active_production"),
                    ("optional", "skipped_production"),
                    ("later", "not_run"),
                ]))
                .with_details(details(&[
                    ("extract", "completed_production"),
                    ("transform", "stopped_production"),
                    ("optional", "skipped_production"),
                    ("later", "not_run"),
                ])),
        );
        let sink = Arc::new(RecordingEventSink::new());

        let mut monitor = NodeMonitor::new(gateway, sink.clone(), settings())
            .await
            .unwrap();
        let (succeeded, failed) = monitor.monitor().await.unwrap();

        assert_eq!(succeeded, vec!["extract"]);
        assert!(failed.is_empty());
        assert!(task_statuses(&sink)
            .await
            .contains(&("transform".to_string(), TaskStatus::Completed)));
        assert!(task_statuses(&sink)
            .await
            .iter()
            .all(|(name, _)| name != "optional" && name != "later"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_appearing_later_is_tracked() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_details(details(&[("first", "active_production")]))
                .with_details(details(&[
                    ("first", "completed_production"),
                    ("second", "active_production"),
                ]))
                .with_details(details(&[
                    ("first", "completed_production"),
                    ("second", "completed_production"),
                ])),
        );
        let sink = Arc::new(RecordingEventSink::new());

        let mut monitor = NodeMonitor::new(gateway, sink.clone(), settings())
            .await
            .unwrap();
        let (succeeded, _) = monitor.monitor().await.unwrap();

        assert_eq!(succeeded, vec!["first", "second"]);
        assert_eq!(task_statuses(&sink).await.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_running_node_stops_monitoring() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_details(details(&[
                    ("a", "active_production"),
                    ("b", "active_production"),
                ]))
                .with_details(details(&[("b", "completed_production")])),
        );
        let sink = Arc::new(RecordingEventSink::new());

        let mut monitor = NodeMonitor::new(gateway.clone(), sink.clone(), settings())
            .await
            .unwrap();
        let (succeeded, failed) = monitor.monitor().await.unwrap();

        assert_eq!(succeeded, vec!["b"]);
        assert!(failed.is_empty());
        assert_eq!(sink.close_runs().await.len(), 1);
        assert_eq!(gateway.call_count("details:run-1").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_publish_failure_fails_construction() {
        let gateway = Arc::new(
            MockGateway::new().with_details(details(&[("load", "active_production")])),
        );
        let sink = Arc::new(RecordingEventSink::new().failing_task_status());

        let result = NodeMonitor::new(gateway, sink.clone(), settings()).await;

        assert!(matches!(result, Err(MonitorError::EventPublish { .. })));
        assert!(sink.task_events().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_during_monitor_is_returned() {
        let sink = Arc::new(RecordingEventSink::new());
        let gateway = Arc::new(
            MockGateway::new()
                .with_details(details(&[("load", "active_production")]))
                .with_details(details(&[("load", "production_error")])),
        );
        let mut monitor = NodeMonitor::new(gateway, sink.clone(), settings())
            .await
            .unwrap();

        let failing = Arc::new(RecordingEventSink::new().failing_task_status());
        monitor.sink = failing.clone() as Arc<dyn EventSink>;

        let result = monitor.monitor().await;
        assert!(matches!(result, Err(MonitorError::EventPublish { .. })));
        assert_eq!(failing.close_runs().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_details_error_propagates_after_close() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_details(details(&[("load", "active_production")]))
                .with_details_error(503),
        );
        let sink = Arc::new(RecordingEventSink::new());

        let mut monitor = NodeMonitor::new(gateway, sink.clone(), settings())
            .await
            .unwrap();
        let result = monitor.monitor().await;

        assert!(matches!(result, Err(MonitorError::Gateway { .. })));
        assert_eq!(sink.close_runs().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_run_failure_is_returned() {
        let gateway = Arc::new(
            MockGateway::new().with_details(details(&[("load", "completed_production")])),
        );
        let sink = Arc::new(RecordingEventSink::new().failing_close_run());

        let mut monitor = NodeMonitor::new(gateway, sink.clone(), settings())
            .await
            .unwrap();
        let result = monitor.monitor().await;

        assert!(matches!(result, Err(MonitorError::EventPublish { .. })));
        assert_eq!(sink.close_runs().await.len(), 1);
        assert_eq!(
            task_statuses(&sink).await,
            vec![("load".to_string(), TaskStatus::Completed)]
        );
    }
}
