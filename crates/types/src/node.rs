use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Status of a single node of an order run graph.
///
/// Statuses the monitor does not know about are kept verbatim in `Other`
/// and satisfy none of the predicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeStatus {
    NotRun,
    Running,
    Successful,
    Failed,
    Stopped,
    Skipped,
    Other(String),
}

impl NodeStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotRun => "not_run",
            Self::Running => "active_production",
            Self::Successful => "completed_production",
            Self::Failed => "production_error",
            Self::Stopped => "stopped_production",
            Self::Skipped => "skipped_production",
            Self::Other(status) => status,
        }
    }
}

impl From<&str> for NodeStatus {
    fn from(value: &str) -> Self {
        match value {
            "not_run" => Self::NotRun,
            "active_production" => Self::Running,
            "completed_production" => Self::Successful,
            "production_error" => Self::Failed,
            "stopped_production" => Self::Stopped,
            "skipped_production" => Self::Skipped,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for NodeStatus {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<NodeStatus> for String {
    fn from(value: NodeStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of a running order, with its last observed status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub status: NodeStatus,
}

impl Node {
    pub fn new(name: impl Into<String>, status: NodeStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }

    pub fn running(&self) -> bool {
        self.status == NodeStatus::Running
    }

    pub fn succeeded(&self) -> bool {
        self.status == NodeStatus::Successful
    }

    pub fn stopped(&self) -> bool {
        self.status == NodeStatus::Stopped
    }

    pub fn failed(&self) -> bool {
        self.status == NodeStatus::Failed
    }
}

/// Node-level view of an order run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderRunDetails {
    /// Node name to current status
    pub nodes: BTreeMap<String, NodeStatus>,

    /// Names of nodes that only mark a branch condition
    pub conditions: BTreeSet<String>,
}

impl OrderRunDetails {
    /// Drop the given nodes from the view
    pub fn without(mut self, ignored: &BTreeSet<String>) -> Self {
        self.nodes.retain(|name, _| !ignored.contains(name));
        self
    }
}
