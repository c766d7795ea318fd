use async_trait::async_trait;
use kitchen_monitor_retry::{retry_server_errors, RetryPolicy};
use kitchen_monitor_types::{NodeStatus, OrderRun, OrderRunDetails, OrderRunStatus};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{GatewayError, OrderGateway};

pub const DEFAULT_BASE_URL: &str = "https://cloud.datakitchen.io";

const LOGIN_PATH: &str = "/v2/login";

/// Connection settings for the DataKitchen order API
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub request_timeout: Duration,

    /// Applied to read calls that fail with a 5xx response
    pub retry: RetryPolicy,
}

impl ClientSettings {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// HTTP client for the DataKitchen order API.
///
/// Holds the session token; a request rejected with 401 triggers one login
/// and one replay.
pub struct DataKitchenClient {
    settings: ClientSettings,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl DataKitchenClient {
    pub fn new(settings: ClientSettings) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            settings,
            http,
            token: RwLock::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    /// Log in and store a fresh session token
    pub async fn refresh_token(&self) -> Result<String, GatewayError> {
        let response = self
            .http
            .post(self.endpoint(LOGIN_PATH))
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Auth(format!(
                "login returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token = parse_token(&body)
            .ok_or_else(|| GatewayError::Auth("login returned an empty token".to_string()))?;
        *self.token.write().await = Some(token.clone());
        debug!(username = %self.settings.username, "Refreshed session token");

        Ok(token)
    }

    async fn current_token(&self) -> Result<String, GatewayError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.refresh_token().await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        token: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut request = self
            .http
            .request(method, self.endpoint(path))
            .bearer_auth(token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T, GatewayError> {
        let token = self.current_token().await?;
        let mut response = self.send(method.clone(), path, query, body, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(path = %path, "Session token rejected, logging in again");
            let token = self.refresh_token().await?;
            response = self.send(method, path, query, body, &token).await?;
        }

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Http {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| GatewayError::Decode {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })
    }

    async fn servings(
        &self,
        kitchen: &str,
        query: Vec<(&'static str, String)>,
    ) -> Result<Vec<Serving>, GatewayError> {
        let path = format!("/v2/order/details/{kitchen}");
        let response: ServingsResponse = self.request(Method::GET, &path, &query, None).await?;
        Ok(response.servings.unwrap_or_default())
    }

    async fn servings_with_retry(
        &self,
        operation: &str,
        kitchen: &str,
        query: Vec<(&'static str, String)>,
    ) -> Result<Vec<Serving>, GatewayError> {
        retry_server_errors(&self.settings.retry, operation, move || {
            self.servings(kitchen, query.clone())
        })
        .await
    }
}

#[async_trait]
impl OrderGateway for DataKitchenClient {
    async fn create_order(
        &self,
        kitchen: &str,
        recipe: &str,
        variation: &str,
        parameters: &HashMap<String, Value>,
    ) -> Result<String, GatewayError> {
        let path = format!("/v2/order/create/{kitchen}/{recipe}/{variation}");
        let body = json!({ "parameters": parameters });

        let response: OrderResponse = self.request(Method::PUT, &path, &[], Some(&body)).await?;
        info!(
            kitchen = %kitchen,
            recipe = %recipe,
            variation = %variation,
            order_id = %response.order_id,
            "Created order"
        );

        Ok(response.order_id)
    }

    async fn resume_order_run(
        &self,
        kitchen: &str,
        order_run_id: &str,
    ) -> Result<String, GatewayError> {
        let path = format!("/v2/order/resume/{order_run_id}");
        let body = json!({ "kitchen_name": kitchen });

        let response: OrderResponse = self.request(Method::PUT, &path, &[], Some(&body)).await?;
        info!(
            kitchen = %kitchen,
            order_run_id = %order_run_id,
            order_id = %response.order_id,
            "Resumed order run"
        );

        Ok(response.order_id)
    }

    async fn get_order_runs(
        &self,
        kitchen: &str,
        order_id: &str,
    ) -> Result<Vec<OrderRun>, GatewayError> {
        let query = vec![("order_id", order_id.to_string()), ("summary", "false".to_string())];
        let servings = self
            .servings_with_retry("get_order_runs", kitchen, query)
            .await?;

        Ok(servings.into_iter().map(OrderRun::from).collect())
    }

    async fn get_order_run_status(
        &self,
        kitchen: &str,
        order_run_id: &str,
    ) -> Result<Option<OrderRunStatus>, GatewayError> {
        let query = vec![
            ("serving_hid", order_run_id.to_string()),
            ("summary", "false".to_string()),
        ];
        let servings = self
            .servings_with_retry("get_order_run_status", kitchen, query)
            .await?;

        match servings.into_iter().next() {
            Some(serving) => serving.order_run_status(),
            None => {
                warn!(kitchen = %kitchen, order_run_id = %order_run_id, "Order run not found");
                Ok(None)
            }
        }
    }

    async fn get_order_run_details(
        &self,
        kitchen: &str,
        order_run_id: &str,
        include_summary: bool,
    ) -> Result<OrderRunDetails, GatewayError> {
        let query = vec![
            ("serving_hid", order_run_id.to_string()),
            ("summary", include_summary.to_string()),
        ];
        let servings = self
            .servings_with_retry("get_order_run_details", kitchen, query)
            .await?;

        servings
            .into_iter()
            .next()
            .map(OrderRunDetails::from)
            .ok_or_else(|| GatewayError::OrderRunNotFound(order_run_id.to_string()))
    }
}

/// Login responses carry the token as the raw body, sometimes JSON-quoted
fn parse_token(body: &str) -> Option<String> {
    let token = body.trim().trim_matches('"').trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct ServingsResponse {
    #[serde(default)]
    servings: Option<Vec<Serving>>,
}

#[derive(Debug, Deserialize)]
struct Serving {
    hid: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    timings: Option<Timings>,
    #[serde(default)]
    summary: Option<Summary>,
    #[serde(default)]
    conditions: Option<HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct Timings {
    #[serde(rename = "start-time", default)]
    start_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Summary {
    #[serde(default)]
    nodes: Option<HashMap<String, NodeSummary>>,
}

#[derive(Debug, Deserialize)]
struct NodeSummary {
    status: String,
}

impl Serving {
    fn order_run_status(&self) -> Result<Option<OrderRunStatus>, GatewayError> {
        self.status
            .as_deref()
            .map(|status| {
                status
                    .parse::<OrderRunStatus>()
                    .map_err(|e| GatewayError::Decode {
                        endpoint: format!("order run {}", self.hid),
                        reason: e.to_string(),
                    })
            })
            .transpose()
    }
}

impl From<Serving> for OrderRun {
    fn from(serving: Serving) -> Self {
        Self {
            hid: serving.hid,
            start_time: serving.timings.and_then(|t| t.start_time),
        }
    }
}

impl From<Serving> for OrderRunDetails {
    fn from(serving: Serving) -> Self {
        let nodes = serving
            .summary
            .and_then(|summary| summary.nodes)
            .unwrap_or_default()
            .into_iter()
            .map(|(name, node)| (name, NodeStatus::from(node.status)))
            .collect();
        let conditions = serving
            .conditions
            .unwrap_or_default()
            .into_keys()
            .collect();

        Self { nodes, conditions }
    }
}
