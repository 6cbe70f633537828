//! Request controller: maps inbound queries onto per-conversation orchestrators
//! and owns the startup and shutdown of tool sessions.
//!
//! Conversations live in memory, bounded by [`ConversationLimits`]: idle ones
//! are dropped, and at capacity the least recently used one makes room.

mod routes;

pub use routes::{router, ErrorResponse, HealthResponse, QueryRequest, QueryResponse};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::HalConfig;
use crate::error::{HalError, Result};
use crate::gateway::{build_gateway, LlmGateway};
use crate::orchestrator::{Orchestrator, OrchestratorConfig, ToolMode};
use crate::registry::ToolRegistry;

/// Conversation used when a request names none.
pub const DEFAULT_CONVERSATION: &str = "default";

/// Bounds on the conversations a controller keeps in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationLimits {
    /// Most conversations kept at once.
    pub max_conversations: usize,
    /// Conversations unused for this long are dropped.
    pub idle_timeout: Duration,
}

impl Default for ConversationLimits {
    fn default() -> Self {
        Self {
            max_conversations: 256,
            idle_timeout: Duration::from_secs(3600),
        }
    }
}

struct ConversationSlot {
    orchestrator: Arc<Mutex<Orchestrator>>,
    last_used: Instant,
}

pub struct Controller {
    registry: Arc<ToolRegistry>,
    gateway: Arc<dyn LlmGateway>,
    system_prompt: String,
    orchestrator_config: OrchestratorConfig,
    limits: ConversationLimits,
    conversations: Mutex<HashMap<String, ConversationSlot>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("registry", &self.registry)
            .field("gateway", &self.gateway.name())
            .field("orchestrator_config", &self.orchestrator_config)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(
        registry: Arc<ToolRegistry>,
        gateway: Arc<dyn LlmGateway>,
        system_prompt: impl Into<String>,
        orchestrator_config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            gateway,
            system_prompt: system_prompt.into(),
            orchestrator_config,
            limits: ConversationLimits::default(),
            conversations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_limits(mut self, limits: ConversationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Build the gateway and connect every configured provider.
    ///
    /// Providers that fail to launch are left out; startup still succeeds.
    pub async fn startup(config: &HalConfig) -> Result<Self> {
        let gateway = build_gateway(
            config.gateway.kind,
            &config.gateway.url,
            &config.gateway.model,
            config.gateway.timeout(),
        )?;

        let registry = ToolRegistry::connect_all(
            &config.providers,
            config.tools.connect_timeout(),
            config.registry_options(),
        )
        .await?;

        let connected = registry.session_count();
        if connected < config.providers.len() {
            tracing::warn!(
                connected,
                configured = config.providers.len(),
                "Some tool providers are unavailable, continuing with a reduced tool set"
            );
        }
        tracing::info!(
            gateway = %gateway.name(),
            url = %config.gateway.url,
            sessions = connected,
            tool_mode = %config.tools.mode,
            "Controller started"
        );

        Ok(Self::new(
            Arc::new(registry),
            gateway,
            config.conversation.system_prompt.clone(),
            config.orchestrator_config(),
        )
        .with_limits(config.conversation.limits()))
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn tool_mode(&self) -> ToolMode {
        self.orchestrator_config.tool_mode
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.lock().await.len()
    }

    /// Run one turn on the named conversation, creating it on first use.
    ///
    /// Turns on the same conversation are serialized; different
    /// conversations run independently.
    pub async fn handle_query(&self, conversation_id: Option<&str>, query: &str) -> Result<String> {
        if self.tool_mode() == ToolMode::Required && self.registry.is_empty() {
            return Err(HalError::NoSessions);
        }

        let conversation_id = conversation_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION);

        let orchestrator = {
            let mut conversations = self.conversations.lock().await;
            let now = Instant::now();
            self.evict(&mut conversations, conversation_id, now);

            let slot = conversations
                .entry(conversation_id.to_owned())
                .or_insert_with(|| {
                    tracing::debug!(conversation = conversation_id, "Starting conversation");
                    ConversationSlot {
                        orchestrator: Arc::new(Mutex::new(Orchestrator::new(
                            self.system_prompt.clone(),
                            Arc::clone(&self.registry),
                            Arc::clone(&self.gateway),
                            self.orchestrator_config.clone(),
                        ))),
                        last_used: now,
                    }
                });
            slot.last_used = now;
            Arc::clone(&slot.orchestrator)
        };

        let mut orchestrator = orchestrator.lock().await;
        tracing::info!(conversation = conversation_id, query, "Processing query");
        orchestrator.process_query(query).await
    }

    /// Forget a conversation and its history. Returns whether it existed.
    ///
    /// A turn already running on it finishes, but its result is not kept.
    pub async fn end_conversation(&self, conversation_id: &str) -> bool {
        let removed = self
            .conversations
            .lock()
            .await
            .remove(conversation_id.trim())
            .is_some();
        if removed {
            tracing::info!(conversation = conversation_id, "Conversation ended");
        }
        removed
    }

    /// Drop idle conversations, then make room for `incoming` if it is new.
    fn evict(
        &self,
        conversations: &mut HashMap<String, ConversationSlot>,
        incoming: &str,
        now: Instant,
    ) {
        let idle_timeout = self.limits.idle_timeout;
        conversations.retain(|id, slot| {
            let fresh = now.saturating_duration_since(slot.last_used) <= idle_timeout;
            if !fresh {
                tracing::debug!(conversation = %id, "Dropping idle conversation");
            }
            fresh
        });

        if conversations.contains_key(incoming) {
            return;
        }
        while conversations.len() >= self.limits.max_conversations.max(1) {
            let Some(oldest) = conversations
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            tracing::debug!(conversation = %oldest, "Dropping least recently used conversation");
            conversations.remove(&oldest);
        }
    }

    /// Close every tool session.
    pub async fn shutdown(&self) {
        tracing::info!(sessions = self.registry.session_count(), "Shutting down tool sessions");
        self.registry.shutdown().await;
    }
}

/// Serve the controller on `bind` until Ctrl+C or SIGTERM, then shut it down.
pub async fn serve(controller: Arc<Controller>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await.map_err(|e| {
        HalError::Configuration(format!("cannot bind {bind}: {e}"))
    })?;
    tracing::info!(address = %listener.local_addr()?, "HAL controller listening");

    let app = router(Arc::clone(&controller));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    controller.shutdown().await;
    tracing::info!("Server shutdown complete");
    served.map_err(HalError::from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(error = %error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::warn!(error = %error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}
