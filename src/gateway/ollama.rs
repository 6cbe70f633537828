//! Direct Ollama chat backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::{build_client, expect_assistant, map_send_error, read_success_body};
use super::LlmGateway;
use crate::error::{HalError, Result};
use crate::types::{Message, ToolSpec};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSpec]>,
    stream: bool,
    think: bool,
    /// Negative keeps the model loaded indefinitely.
    keep_alive: i64,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Message,
}

/// Talks to `POST {base_url}/api/chat` without streaming.
#[derive(Debug, Clone)]
pub struct OllamaGateway {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaGateway {
    pub fn new(base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(HalError::Configuration("gateway url must not be empty".into()));
        }
        let model = model.into();
        if model.trim().is_empty() {
            return Err(HalError::Configuration(
                "ollama gateway requires a model name".into(),
            ));
        }
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: format!("{base_url}/api/chat"),
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LlmGateway for OllamaGateway {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, messages: &[Message], tools: Option<&[ToolSpec]>) -> Result<Message> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            tools,
            stream: false,
            think: false,
            keep_alive: -1,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let body = read_success_body(response).await?;
        let decoded: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| HalError::GatewayProtocol(format!("malformed chat response: {e}")))?;
        expect_assistant(decoded.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn chat_request_disables_streaming_and_thinking() {
        let messages = [Message::system("You are HAL."), Message::user("hi")];
        let value = serde_json::to_value(ChatRequest {
            model: "qwen3:8b",
            messages: &messages,
            tools: None,
            stream: false,
            think: false,
            keep_alive: -1,
        })
        .expect("serialize");

        assert_eq!(
            value,
            json!({
                "model": "qwen3:8b",
                "messages": [
                    {"role": "system", "content": "You are HAL."},
                    {"role": "user", "content": "hi"}
                ],
                "stream": false,
                "think": false,
                "keep_alive": -1
            })
        );
    }

    #[test]
    fn chat_response_tool_calls_decode_from_function_shape() {
        let decoded: ChatResponse = serde_json::from_value(json!({
            "model": "qwen3:8b",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "get_weather", "arguments": {"city": "Urbana"}}}]
            },
            "done": true
        }))
        .expect("decode");

        let message = expect_assistant(decoded.message).expect("assistant");
        assert_eq!(message.tool_calls()[0].tool_name, "get_weather");
    }

    #[test]
    fn model_is_required() {
        assert!(OllamaGateway::new("http://localhost:11434", " ", Duration::from_secs(5)).is_err());
    }
}
