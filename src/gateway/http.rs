//! Gateway speaking the `POST /generate` contract, plus HTTP helpers shared
//! with the other backends.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::LlmGateway;
use crate::error::{HalError, Result};
use crate::types::{Message, ToolSpec};

/// Build the HTTP client used by a gateway.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(4)
        .build()
        .map_err(|e| HalError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Transport-level failures mean the backend could not be reached.
pub(crate) fn map_send_error(error: reqwest::Error) -> HalError {
    if error.is_timeout() {
        HalError::GatewayUnavailable(format!("request timed out: {error}"))
    } else if error.is_connect() {
        HalError::GatewayUnavailable(format!("connection failed: {error}"))
    } else {
        HalError::GatewayUnavailable(error.to_string())
    }
}

/// Classify a non-success status. Server-side and throttling statuses mean the
/// backend is unavailable; anything else is a contract violation.
pub(crate) fn status_to_error(status: u16, body: &str) -> HalError {
    let detail = extract_error_detail(body);
    match status {
        408 | 429 | 500..=599 => HalError::GatewayUnavailable(format!("HTTP {status}: {detail}")),
        _ => HalError::GatewayProtocol(format!("HTTP {status}: {detail}")),
    }
}

fn extract_error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["detail", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|e| e.as_str()).map(str::to_owned))
        })
        .unwrap_or_else(|| body.trim().to_owned())
}

/// Ensure a decoded reply is an assistant message.
pub(crate) fn expect_assistant(message: Message) -> Result<Message> {
    match message {
        message @ Message::Assistant { .. } => Ok(message),
        other => Err(HalError::GatewayProtocol(format!(
            "expected an assistant message, got role '{}'",
            other.role()
        ))),
    }
}

pub(crate) async fn read_success_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await.map_err(map_send_error)?;
    if !status.is_success() {
        return Err(status_to_error(status.as_u16(), &body));
    }
    Ok(body)
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    messages: &'a [Message],
    tools: Option<&'a [ToolSpec]>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Message,
}

/// Client for a gateway service exposing `POST {base_url}/generate`.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(HalError::Configuration("gateway url must not be empty".into()));
        }
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: format!("{base_url}/generate"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LlmGateway for HttpGateway {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, messages: &[Message], tools: Option<&[ToolSpec]>) -> Result<Message> {
        let request = GenerateRequest { messages, tools };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let body = read_success_body(response).await?;
        let decoded: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
            HalError::GatewayProtocol(format!("malformed /generate response: {e}"))
        })?;
        expect_assistant(decoded.response)
    }
}
