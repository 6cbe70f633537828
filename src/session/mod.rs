//! Tool sessions: one live connection per tool provider process.

mod launch;
mod transport;

pub use launch::ProviderLaunchSpec;
pub use transport::{McpRunningService, StdioTransport};

use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParams, CallToolResult, Content, JsonObject, ResourceContents};
use rmcp::service::{Peer, RoleClient, ServiceError};
use tokio::sync::Mutex;

use crate::error::{HalError, Result};
use crate::types::ToolSpec;

/// Operations the registry needs from a connected provider.
#[async_trait]
pub trait ToolSessionOps: Send + Sync {
    /// Session id, unique within a registry.
    fn id(&self) -> &str;

    /// Query the provider's current tools. Safe to call repeatedly.
    async fn list_tools(&self) -> Result<Vec<ToolSpec>>;

    /// Invoke a tool and return its textual result.
    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<String>;

    /// Release the transport and stop the provider. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// A connected MCP tool provider.
pub struct ToolSession {
    id: String,
    spec: ProviderLaunchSpec,
    service: Mutex<Option<McpRunningService>>,
}

impl std::fmt::Debug for ToolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSession")
            .field("id", &self.id)
            .field("command", &self.spec.display_command())
            .finish_non_exhaustive()
    }
}

impl ToolSession {
    /// Launch the provider and complete the handshake within `handshake_timeout`.
    ///
    /// On any failure the child process is dropped, which kills it.
    pub async fn connect(spec: ProviderLaunchSpec, handshake_timeout: Duration) -> Result<Self> {
        spec.validate()?;
        let transport = StdioTransport::new(spec.clone());

        let service = match tokio::time::timeout(handshake_timeout, transport.connect()).await {
            Ok(service) => service?,
            Err(_) => {
                return Err(HalError::provider_launch(
                    &spec.id,
                    format!(
                        "handshake timed out after {}ms",
                        handshake_timeout.as_millis()
                    ),
                ));
            }
        };

        tracing::debug!(provider = %spec.id, command = %spec.display_command(), "Tool session connected");

        Ok(Self {
            id: spec.id.clone(),
            spec,
            service: Mutex::new(Some(service)),
        })
    }

    /// Clone the peer handle so requests do not hold the session lock.
    async fn peer(&self) -> Option<Peer<RoleClient>> {
        self.service
            .lock()
            .await
            .as_ref()
            .filter(|service| !service.is_closed())
            .map(|service| service.peer().clone())
    }
}

#[async_trait]
impl ToolSessionOps for ToolSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        let peer = self
            .peer()
            .await
            .ok_or_else(|| HalError::InvalidState(format!("tool session '{}' is closed", self.id)))?;

        let tools = match peer.list_all_tools().await {
            Ok(tools) => tools,
            Err(ServiceError::UnexpectedResponse) => peer
                .list_tools(None)
                .await
                .map(|page| page.tools)
                .map_err(|error| map_list_error(&self.id, error))?,
            Err(error) => return Err(map_list_error(&self.id, error)),
        };

        Ok(tools
            .into_iter()
            .map(|tool| {
                ToolSpec::new(
                    tool.name.to_string(),
                    tool.description.map(|d| d.to_string()).unwrap_or_default(),
                    serde_json::Value::Object((*tool.input_schema).clone()),
                )
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<String> {
        let arguments = coerce_tool_arguments(name, arguments)?;
        let peer = self
            .peer()
            .await
            .ok_or_else(|| HalError::tool_failed(name, format!("session '{}' is closed", self.id)))?;

        tracing::debug!(session = %self.id, tool = name, "Calling tool");
        let result = peer
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_owned().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(|error| map_call_error(name, error))?;

        result_text(name, result)
    }

    async fn close(&self) -> Result<()> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };

        match service.cancel().await {
            Ok(reason) => {
                tracing::debug!(session = %self.id, ?reason, "Tool session closed");
            }
            Err(error) => {
                tracing::warn!(session = %self.id, error = %error, "Tool session did not shut down cleanly");
            }
        }
        Ok(())
    }
}

/// Accept an object, null, or a string holding a JSON object.
pub(crate) fn coerce_tool_arguments(
    tool_name: &str,
    value: serde_json::Value,
) -> Result<Option<JsonObject>> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) => Ok(Some(map)),
        serde_json::Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let parsed: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| {
                HalError::tool_failed(tool_name, format!("arguments must be valid JSON: {e}"))
            })?;
            match parsed {
                serde_json::Value::String(_) => Err(HalError::tool_failed(
                    tool_name,
                    "arguments must be a JSON object; got a nested string",
                )),
                other => coerce_tool_arguments(tool_name, other),
            }
        }
        other => Err(HalError::tool_failed(
            tool_name,
            format!("arguments must be a JSON object; got {other}"),
        )),
    }
}

fn extract_text_content(content: &[Content]) -> Option<String> {
    let mut lines = Vec::new();
    for item in content {
        if let Some(text) = item.as_text() {
            lines.push(text.text.clone());
            continue;
        }
        if let Some(resource) = item.as_resource() {
            if let ResourceContents::TextResourceContents { text, .. } = &resource.resource {
                lines.push(text.clone());
            }
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Collapse a tool result into the text appended to the conversation.
pub(crate) fn result_text(tool_name: &str, result: CallToolResult) -> Result<String> {
    let text_content = extract_text_content(&result.content);

    if result.is_error.unwrap_or(false) {
        let message = text_content
            .or_else(|| result.structured_content.as_ref().map(|v| v.to_string()))
            .unwrap_or_else(|| "tool returned an error result".into());
        return Err(HalError::tool_failed(tool_name, message));
    }

    if let Some(text) = text_content {
        return Ok(text);
    }
    if let Some(structured) = result.structured_content {
        return Ok(structured.to_string());
    }
    Ok(serde_json::to_string(&result.content)?)
}

fn map_list_error(session_id: &str, error: ServiceError) -> HalError {
    match error {
        ServiceError::Timeout { timeout } => HalError::Timeout(timeout.as_millis() as u64),
        other => HalError::InvalidState(format!(
            "tool session '{session_id}' failed to list tools: {other}"
        )),
    }
}

fn map_call_error(tool_name: &str, error: ServiceError) -> HalError {
    match error {
        ServiceError::McpError(error) => HalError::tool_failed(
            tool_name,
            format!("MCP error {}: {}", error.code.0, error.message),
        ),
        ServiceError::Timeout { timeout } => HalError::tool_transient(
            tool_name,
            format!("timed out after {}ms", timeout.as_millis()),
        ),
        ServiceError::TransportSend(error) => {
            HalError::tool_transient(tool_name, format!("transport send failed: {error}"))
        }
        ServiceError::TransportClosed => HalError::tool_failed(tool_name, "transport closed"),
        ServiceError::Cancelled { reason } => {
            let suffix = reason
                .as_deref()
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            HalError::tool_failed(tool_name, format!("request cancelled{suffix}"))
        }
        other => HalError::tool_failed(tool_name, format!("service error: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_and_null_arguments_pass_through() {
        let args = coerce_tool_arguments("echo", json!({"x": "hi"}))
            .expect("object is valid")
            .expect("object is forwarded");
        assert_eq!(args.get("x"), Some(&json!("hi")));
        assert!(coerce_tool_arguments("echo", json!(null))
            .expect("null is valid")
            .is_none());
    }

    #[test]
    fn string_arguments_are_decoded() {
        let args = coerce_tool_arguments("echo", json!("{\"x\": \"hi\"}"))
            .expect("json string is valid")
            .expect("object is forwarded");
        assert_eq!(args.get("x"), Some(&json!("hi")));
    }

    #[test]
    fn non_object_arguments_fail_without_retry() {
        let err = coerce_tool_arguments("echo", json!([1, 2])).expect_err("array is invalid");
        assert!(matches!(
            err,
            HalError::ToolInvocation { ref tool_name, transient: false, .. } if tool_name == "echo"
        ));
    }

    #[test]
    fn text_blocks_are_joined_by_newline() {
        let result = CallToolResult::success(vec![Content::text("72F"), Content::text("sunny")]);
        assert_eq!(result_text("weather", result).expect("success"), "72F\nsunny");
    }

    #[test]
    fn error_result_becomes_tool_invocation_failure() {
        let result = CallToolResult::error(vec![Content::text("city not found")]);
        let err = result_text("weather", result).expect_err("error result");
        assert!(matches!(
            err,
            HalError::ToolInvocation { ref message, transient: false, .. } if message == "city not found"
        ));
    }

    #[test]
    fn timeouts_are_transient() {
        let err = map_call_error(
            "weather",
            ServiceError::Timeout {
                timeout: Duration::from_secs(5),
            },
        );
        assert!(err.is_retryable());
        assert!(!map_call_error("weather", ServiceError::TransportClosed).is_retryable());
    }
}
