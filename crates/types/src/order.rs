use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Status of an order run as reported by the remote platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderRunStatus {
    #[serde(rename = "PLANNED_SERVING")]
    Planned,
    #[serde(rename = "ACTIVE_SERVING")]
    Active,
    #[serde(rename = "COMPLETED_SERVING")]
    Completed,
    #[serde(rename = "STOPPED_SERVING")]
    Stopped,
    #[serde(rename = "SERVING_ERROR")]
    Error,
    #[serde(rename = "SERVING_RERAN")]
    Reran,
}

impl OrderRunStatus {
    /// Wire representation used by the platform API
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "PLANNED_SERVING",
            Self::Active => "ACTIVE_SERVING",
            Self::Completed => "COMPLETED_SERVING",
            Self::Stopped => "STOPPED_SERVING",
            Self::Error => "SERVING_ERROR",
            Self::Reran => "SERVING_RERAN",
        }
    }

    /// A terminal run will not transition again without being resubmitted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Stopped | Self::Error | Self::Reran
        )
    }
}

impl fmt::Display for OrderRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order run status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderRunStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLANNED_SERVING" => Ok(Self::Planned),
            "ACTIVE_SERVING" => Ok(Self::Active),
            "COMPLETED_SERVING" => Ok(Self::Completed),
            "STOPPED_SERVING" => Ok(Self::Stopped),
            "SERVING_ERROR" => Ok(Self::Error),
            "SERVING_RERAN" => Ok(Self::Reran),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// What the controller submits for an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OrderTarget {
    /// Create a new order of a recipe variation
    Create {
        recipe: String,
        variation: String,
        #[serde(default)]
        parameters: HashMap<String, serde_json::Value>,
    },

    /// Resume a previously failed order run
    Resume { order_run_id: String },
}

/// A single order to submit and track.
///
/// `kitchen` and `target` describe the submission and are never changed once
/// the order is handed to a monitor. The remaining fields are filled in as the
/// monitor learns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub kitchen: String,
    pub target: OrderTarget,

    /// Order id returned by the create/resume call
    #[serde(default)]
    pub order_id: Option<String>,

    /// Id of the run being monitored
    #[serde(default)]
    pub order_run_id: Option<String>,

    /// Last observed status of that run
    #[serde(default)]
    pub order_run_status: Option<OrderRunStatus>,
}

impl OrderSpec {
    pub fn create(
        kitchen: impl Into<String>,
        recipe: impl Into<String>,
        variation: impl Into<String>,
    ) -> Self {
        Self {
            kitchen: kitchen.into(),
            target: OrderTarget::Create {
                recipe: recipe.into(),
                variation: variation.into(),
                parameters: HashMap::new(),
            },
            order_id: None,
            order_run_id: None,
            order_run_status: None,
        }
    }

    pub fn resume(kitchen: impl Into<String>, order_run_id: impl Into<String>) -> Self {
        Self {
            kitchen: kitchen.into(),
            target: OrderTarget::Resume {
                order_run_id: order_run_id.into(),
            },
            order_id: None,
            order_run_id: None,
            order_run_status: None,
        }
    }

    /// Add a parameter override. Has no effect on resume specs.
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if let OrderTarget::Create { parameters, .. } = &mut self.target {
            parameters.insert(key.into(), value);
        }
        self
    }

    /// Human readable label used in logs
    pub fn label(&self) -> String {
        match &self.target {
            OrderTarget::Create {
                recipe, variation, ..
            } => format!("{}/{}/{}", self.kitchen, recipe, variation),
            OrderTarget::Resume { order_run_id } => {
                format!("{}/resume/{}", self.kitchen, order_run_id)
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.order_run_status
            .map(|status| status.is_terminal())
            .unwrap_or(false)
    }
}

/// One run of an order as listed by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRun {
    /// Order run id
    pub hid: String,

    /// Run start time in milliseconds since the Unix epoch
    pub start_time: Option<i64>,
}

/// Outcome of a batch of monitored orders.
///
/// Every submitted order ends up in exactly one of the three lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorResult {
    /// Reached a terminal status before the deadline (including error states)
    pub succeeded: Vec<OrderSpec>,

    /// Still not terminal when the deadline passed
    pub timed_out: Vec<OrderSpec>,

    /// The create or resume call itself failed
    pub failed_to_submit: Vec<OrderSpec>,
}

impl MonitorResult {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.timed_out.len() + self.failed_to_submit.len()
    }

    pub fn extend(&mut self, other: MonitorResult) {
        self.succeeded.extend(other.succeeded);
        self.timed_out.extend(other.timed_out);
        self.failed_to_submit.extend(other.failed_to_submit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderRunStatus::Planned.is_terminal());
        assert!(!OrderRunStatus::Active.is_terminal());
        assert!(OrderRunStatus::Completed.is_terminal());
        assert!(OrderRunStatus::Stopped.is_terminal());
        assert!(OrderRunStatus::Error.is_terminal());
        assert!(OrderRunStatus::Reran.is_terminal());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            "COMPLETED_SERVING".parse::<OrderRunStatus>(),
            Ok(OrderRunStatus::Completed)
        );
        assert_eq!(OrderRunStatus::Error.to_string(), "SERVING_ERROR");
        assert!("DONE".parse::<OrderRunStatus>().is_err());

        let status: OrderRunStatus = serde_json::from_str("\"PLANNED_SERVING\"").unwrap();
        assert_eq!(status, OrderRunStatus::Planned);
    }

    #[test]
    fn test_order_spec_parameters() {
        let spec = OrderSpec::create("prod", "etl", "daily")
            .with_parameter("date", serde_json::json!("2024-01-01"));

        match &spec.target {
            OrderTarget::Create { parameters, .. } => {
                assert_eq!(parameters["date"], serde_json::json!("2024-01-01"));
            }
            _ => panic!("expected create target"),
        }
        assert_eq!(spec.label(), "prod/etl/daily");

        let resumed = OrderSpec::resume("prod", "run-1").with_parameter("ignored", 1.into());
        assert_eq!(
            resumed.target,
            OrderTarget::Resume {
                order_run_id: "run-1".to_string()
            }
        );
    }

    #[test]
    fn test_spec_terminal_tracks_status() {
        let mut spec = OrderSpec::create("prod", "etl", "daily");
        assert!(!spec.is_terminal());

        spec.order_run_status = Some(OrderRunStatus::Active);
        assert!(!spec.is_terminal());

        spec.order_run_status = Some(OrderRunStatus::Reran);
        assert!(spec.is_terminal());
    }

    #[test]
    fn test_monitor_result_extend() {
        let mut result = MonitorResult::default();
        result.extend(MonitorResult {
            succeeded: vec![OrderSpec::create("k", "r", "v")],
            timed_out: vec![],
            failed_to_submit: vec![OrderSpec::resume("k", "x")],
        });

        assert_eq!(result.total(), 2);
        assert_eq!(result.succeeded.len(), 1);
        assert_eq!(result.failed_to_submit.len(), 1);
    }
}
