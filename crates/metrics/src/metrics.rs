use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    // ═══════════════════════════════════════════════════════════════════════════
    // ORDER METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Orders submitted, by action (create / resume)
    pub static ref ORDERS_SUBMITTED: IntCounterVec = register_int_counter_vec!(
        "kitchen_monitor_orders_submitted_total",
        "Total number of orders submitted",
        &["action"]
    )
    .unwrap();

    /// Final partition of every monitored order
    pub static ref ORDER_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "kitchen_monitor_order_outcomes_total",
        "Total monitored orders by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Terminal statuses observed for order runs
    pub static ref ORDER_RUN_TERMINAL_STATUS: IntCounterVec = register_int_counter_vec!(
        "kitchen_monitor_order_run_terminal_status_total",
        "Terminal order run statuses observed",
        &["status"]
    )
    .unwrap();

    /// Status or run-id lookups that failed and were treated as unknown
    pub static ref STATUS_POLL_ERRORS: IntCounter = register_int_counter!(
        "kitchen_monitor_status_poll_errors_total",
        "Total order run status lookups that failed"
    )
    .unwrap();

    /// Order runs currently being polled
    pub static ref ACTIVE_ORDER_RUNS: IntGauge = register_int_gauge!(
        "kitchen_monitor_order_runs_active",
        "Order runs currently being polled"
    )
    .unwrap();

    /// Wall-clock duration of one polled batch
    pub static ref BATCH_DURATION: Histogram = register_histogram!(
        "kitchen_monitor_batch_duration_seconds",
        "Duration of one batch from first submission to last outcome",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // NODE EVENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Task status events published, by status
    pub static ref NODE_EVENTS: IntCounterVec = register_int_counter_vec!(
        "kitchen_monitor_node_events_total",
        "Task status events published for order run nodes",
        &["status"]
    )
    .unwrap();

    /// Events that the sink rejected
    pub static ref EVENT_PUBLISH_FAILURES: IntCounter = register_int_counter!(
        "kitchen_monitor_event_publish_failures_total",
        "Total events the event sink failed to accept"
    )
    .unwrap();
}
