use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task status values accepted by the events ingestion API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Started,
    Completed,
    Warning,
    Error,
}

/// Reports a state change of one task (node) of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusEvent {
    pub pipeline_name: String,
    pub event_timestamp: DateTime<Utc>,
    pub task_name: String,
    pub task_status: TaskStatus,
}

impl TaskStatusEvent {
    pub fn now(
        pipeline_name: impl Into<String>,
        task_name: impl Into<String>,
        task_status: TaskStatus,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            event_timestamp: Utc::now(),
            task_name: task_name.into(),
            task_status,
        }
    }
}

/// Marks a pipeline run as finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseRunEvent {
    pub pipeline_name: String,
    pub event_timestamp: DateTime<Utc>,
}

impl CloseRunEvent {
    pub fn now(pipeline_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            event_timestamp: Utc::now(),
        }
    }
}
