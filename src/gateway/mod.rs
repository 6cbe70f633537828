//! LLM gateway boundary.
//!
//! The gateway is stateless: every call carries the full message history.
//! Failures are split into `GatewayUnavailable` (the backend could not be
//! reached) and `GatewayProtocol` (it answered with something that is not an
//! assistant message); see [`HalError`](crate::error::HalError).

mod http;
mod ollama;

pub use http::HttpGateway;
pub use ollama::OllamaGateway;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Result;
use crate::types::{Message, ToolSpec};

/// Request/response boundary to the language model.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Produce one assistant message for `messages`.
    ///
    /// `tools` of `None` asks for a plain-text answer.
    async fn generate(&self, messages: &[Message], tools: Option<&[ToolSpec]>) -> Result<Message>;
}

/// Which gateway backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum GatewayKind {
    /// A gateway service exposing `POST /generate`.
    #[default]
    Http,
    /// An Ollama server's chat endpoint.
    Ollama,
}

/// Build the configured gateway.
pub fn build_gateway(
    kind: GatewayKind,
    url: &str,
    model: &str,
    timeout: Duration,
) -> Result<Arc<dyn LlmGateway>> {
    let gateway: Arc<dyn LlmGateway> = match kind {
        GatewayKind::Http => Arc::new(HttpGateway::new(url, timeout)?),
        GatewayKind::Ollama => Arc::new(OllamaGateway::new(url, model, timeout)?),
    };
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HalError;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Ollama".parse::<GatewayKind>().expect("kind"), GatewayKind::Ollama);
        assert_eq!(GatewayKind::Http.to_string(), "http");
    }

    #[test]
    fn build_gateway_selects_backend() {
        let gateway = build_gateway(
            GatewayKind::Ollama,
            "http://localhost:11434",
            "qwen3:8b",
            Duration::from_secs(5),
        )
        .expect("ollama gateway");
        assert_eq!(gateway.name(), "ollama");

        let err = build_gateway(GatewayKind::Http, "", "", Duration::from_secs(5))
            .err()
            .expect("empty url");
        assert!(matches!(err, HalError::Configuration(_)));
    }
}
