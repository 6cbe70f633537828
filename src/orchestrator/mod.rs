//! Conversation orchestrator: the propose, execute, synthesize turn protocol.
//!
//! One [`Orchestrator`] owns one [`ConversationState`]. A turn appends the
//! user query, asks the gateway for a reply with the current tool catalogue,
//! runs any requested tools, then asks again without tools so the model has
//! to answer in plain text. Only one tool round happens per turn.
//!
//! Failures abort the turn without rolling anything back: the user message
//! and whatever tool output completed stay in the history.

pub mod dispatch;
pub mod sanitize;

pub use dispatch::{DispatchOutcome, ToolDispatch};
pub use sanitize::sanitize;

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::conversation::ConversationState;
use crate::error::{HalError, Result};
use crate::gateway::LlmGateway;
use crate::registry::{Catalogue, ToolRegistry};
use crate::types::{Message, ToolSpec};
use crate::util::{with_timeout, RetryPolicy};

/// Whether the deployment depends on tool providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ToolMode {
    /// Refuse queries while no tool session is connected.
    #[default]
    Required,
    /// Offer tools when there are any.
    Optional,
    /// Never offer tools.
    Disabled,
}

/// Where a turn currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnPhase {
    AwaitingQuery,
    Proposing,
    ExecutingTools,
    Synthesizing,
    Finalized,
}

#[derive(Debug, Clone, Builder)]
pub struct OrchestratorConfig {
    #[builder(default)]
    pub tool_mode: ToolMode,
    #[builder(default)]
    pub dispatch: ToolDispatch,
    /// Upper bound on one gateway call.
    #[builder(default = Duration::from_secs(120))]
    pub gateway_timeout: Duration,
    #[builder(default)]
    pub gateway_retry: RetryPolicy,
    /// Retries apply only to transient tool failures such as timeouts.
    #[builder(default = RetryPolicy::none())]
    pub tool_retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

pub struct Orchestrator {
    state: ConversationState,
    registry: Arc<ToolRegistry>,
    gateway: Arc<dyn LlmGateway>,
    config: OrchestratorConfig,
    phase: TurnPhase,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("messages", &self.state.len())
            .field("gateway", &self.gateway.name())
            .field("config", &self.config)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        system_prompt: impl Into<String>,
        registry: Arc<ToolRegistry>,
        gateway: Arc<dyn LlmGateway>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            state: ConversationState::new(system_prompt),
            registry,
            gateway,
            config,
            phase: TurnPhase::AwaitingQuery,
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one full turn and return the sanitized answer.
    pub async fn process_query(&mut self, query: &str) -> Result<String> {
        let result = self.run_turn(query).await;
        if let Err(error) = &result {
            tracing::warn!(phase = %self.phase, error = %error, "Turn aborted");
        }
        self.phase = TurnPhase::AwaitingQuery;
        result
    }

    async fn run_turn(&mut self, query: &str) -> Result<String> {
        let offered = self
            .discover_tools()
            .await?
            .filter(|catalogue| !catalogue.is_empty());

        self.phase = TurnPhase::Proposing;
        self.state.append(Message::user(query))?;

        let tools = offered.as_ref().map(Catalogue::specs);
        tracing::debug!(
            tools = tools.as_ref().map_or(0, Vec::len),
            messages = self.state.len(),
            "Requesting proposal"
        );
        let proposal = self.generate(tools.as_deref()).await?;
        self.state.append(proposal.clone())?;

        if !proposal.has_tool_calls() {
            return Ok(self.finalize(proposal.content()));
        }
        let Some(catalogue) = offered.as_ref() else {
            tracing::warn!(
                calls = proposal.tool_calls().len(),
                "Gateway requested tools that were not offered, answering with its text"
            );
            return Ok(self.finalize(proposal.content()));
        };

        self.phase = TurnPhase::ExecutingTools;
        let outcome = dispatch::execute(
            &self.registry,
            catalogue,
            proposal.tool_calls(),
            self.config.dispatch,
            &self.config.tool_retry,
        )
        .await;
        for message in outcome.results {
            self.state.append(message)?;
        }
        if let Some(error) = outcome.failure {
            return Err(error);
        }

        self.phase = TurnPhase::Synthesizing;
        let reply = self.generate(None).await?;
        if reply.has_tool_calls() {
            tracing::warn!(
                calls = reply.tool_calls().len(),
                "Ignoring tool calls in synthesis reply"
            );
        }
        let reply = Message::assistant(reply.content());
        self.state.append(reply.clone())?;

        Ok(self.finalize(reply.content()))
    }

    fn finalize(&mut self, content: &str) -> String {
        self.phase = TurnPhase::Finalized;
        sanitize(content)
    }

    /// Catalogue for this turn, or `None` when tools are not offered.
    ///
    /// Taken as a snapshot so the turn dispatches against exactly what the
    /// model was shown. In `Required` mode a registry with no live session is
    /// `NoSessions`, reported before the history is touched.
    async fn discover_tools(&self) -> Result<Option<Catalogue>> {
        let required = self.config.tool_mode == ToolMode::Required;
        if self.config.tool_mode == ToolMode::Disabled {
            return Ok(None);
        }
        if self.registry.is_empty() {
            return if required {
                Err(HalError::NoSessions)
            } else {
                Ok(None)
            };
        }

        let catalogue = self.registry.snapshot().await?;
        if required && catalogue.live_sessions == 0 {
            tracing::warn!(
                sessions = self.registry.session_count(),
                "No tool session answered the listing"
            );
            return Err(HalError::NoSessions);
        }
        Ok(Some(catalogue))
    }

    async fn generate(&self, tools: Option<&[ToolSpec]>) -> Result<Message> {
        let gateway = &self.gateway;
        let messages = self.state.messages();
        let timeout = self.config.gateway_timeout;

        self.config
            .gateway_retry
            .execute(move || async move {
                match with_timeout(timeout, gateway.generate(messages, tools)).await {
                    Err(HalError::Timeout(ms)) => Err(HalError::GatewayUnavailable(format!(
                        "{} gateway did not respond within {ms}ms",
                        gateway.name()
                    ))),
                    other => other,
                }
            })
            .await
    }
}
