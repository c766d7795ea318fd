use async_trait::async_trait;
use kitchen_monitor_types::{CloseRunEvent, TaskStatusEvent};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::{EventSink, EventSinkError};

const AUTH_HEADER: &str = "ServiceAccountAuthenticationKey";
const TASK_STATUS_PATH: &str = "/events/v1/task-status";
const CLOSE_RUN_PATH: &str = "/events/v1/close-run";

#[derive(Debug, Clone)]
pub struct EventsSettings {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl EventsSettings {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Client for the events ingestion API
pub struct EventsClient {
    settings: EventsSettings,
    http: reqwest::Client,
}

impl EventsClient {
    pub fn new(settings: EventsSettings) -> Result<Self, EventSinkError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self { settings, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, event: &T) -> Result<(), EventSinkError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .header(AUTH_HEADER, &self.settings.api_key)
            .json(event)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EventSinkError::Http {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl EventSink for EventsClient {
    async fn post_task_status(&self, event: &TaskStatusEvent) -> Result<(), EventSinkError> {
        self.post(TASK_STATUS_PATH, event).await?;
        debug!(
            pipeline = %event.pipeline_name,
            task = %event.task_name,
            status = ?event.task_status,
            "Published task status"
        );
        Ok(())
    }

    async fn post_close_run(&self, event: &CloseRunEvent) -> Result<(), EventSinkError> {
        self.post(CLOSE_RUN_PATH, event).await?;
        debug!(pipeline = %event.pipeline_name, "Published close run");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_endpoints() {
        let client =
            EventsClient::new(EventsSettings::new("https://events.example.com/", "key")).unwrap();

        assert_eq!(
            client.endpoint(TASK_STATUS_PATH),
            "https://events.example.com/events/v1/task-status"
        );
        assert_eq!(
            client.endpoint(CLOSE_RUN_PATH),
            "https://events.example.com/events/v1/close-run"
        );
    }
}
