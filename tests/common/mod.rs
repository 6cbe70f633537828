//! Shared test helpers: a scripted gateway and in-memory tool sessions.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use hal::error::{HalError, Result};
use hal::gateway::LlmGateway;
use hal::orchestrator::{Orchestrator, OrchestratorConfig};
use hal::registry::{RegistryOptions, ToolRegistry};
use hal::session::ToolSessionOps;
use hal::types::{Message, ToolCall, ToolSpec};

/// One recorded gateway request.
#[derive(Debug, Clone)]
pub struct GatewayCall {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolSpec>>,
}

/// A gateway that replays queued replies and records every request.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<Message>>>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a plain assistant reply.
    pub fn reply(&self, text: &str) -> &Self {
        self.push(Ok(Message::assistant(text)))
    }

    /// Queue an assistant reply requesting tool calls.
    pub fn tool_calls(&self, calls: Vec<ToolCall>) -> &Self {
        self.push(Ok(Message::assistant_with_tool_calls("", calls)))
    }

    /// Queue an assistant reply carrying both text and tool calls.
    pub fn reply_with_calls(&self, text: &str, calls: Vec<ToolCall>) -> &Self {
        self.push(Ok(Message::assistant_with_tool_calls(text, calls)))
    }

    pub fn fail(&self, error: HalError) -> &Self {
        self.push(Err(error))
    }

    fn push(&self, reply: Result<Message>) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, messages: &[Message], tools: Option<&[ToolSpec]>) -> Result<Message> {
        self.calls.lock().unwrap().push(GatewayCall {
            messages: messages.to_vec(),
            tools: tools.map(<[ToolSpec]>::to_vec),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(HalError::GatewayProtocol("no scripted reply left".into())))
    }
}

type Handler = Box<dyn Fn(&serde_json::Value) -> Result<String> + Send + Sync>;

/// An in-memory tool session.
pub struct StubSession {
    id: String,
    tools: Vec<ToolSpec>,
    handlers: HashMap<String, Handler>,
    delay: Option<Duration>,
    listings_before_failure: Option<usize>,
    listings: AtomicUsize,
    invocations: Mutex<Vec<(String, serde_json::Value)>>,
    closes: AtomicUsize,
}

impl StubSession {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            tools: Vec::new(),
            handlers: HashMap::new(),
            delay: None,
            listings_before_failure: None,
            listings: AtomicUsize::new(0),
            invocations: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    /// Add a tool answered by `handler`.
    pub fn tool<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<String> + Send + Sync + 'static,
    {
        self.tools
            .push(ToolSpec::without_parameters(name, format!("{name} from {}", self.id)));
        self.handlers.insert(name.to_string(), Box::new(handler));
        self
    }

    /// A tool that echoes its `x` argument.
    pub fn echo(self, name: &str) -> Self {
        self.tool(name, |args| {
            Ok(args
                .get("x")
                .and_then(|x| x.as_str())
                .unwrap_or_default()
                .to_string())
        })
    }

    /// A tool that answers with a fixed string prefixed by the session id.
    pub fn labelled(self, name: &str) -> Self {
        let label = format!("{}:{name}", self.id);
        self.tool(name, move |_| Ok(label.clone()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make `list_tools` fail as if the provider went away.
    pub fn unavailable(self) -> Self {
        self.unavailable_after(0)
    }

    /// Answer `list_tools` `listings` times, then fail.
    pub fn unavailable_after(mut self, listings: usize) -> Self {
        self.listings_before_failure = Some(listings);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn invocations(&self) -> Vec<(String, serde_json::Value)> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolSessionOps for StubSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        let listed = self.listings.fetch_add(1, Ordering::SeqCst);
        if self.listings_before_failure.is_some_and(|limit| listed >= limit) {
            return Err(HalError::InvalidState(format!("{} stopped responding", self.id)));
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<String> {
        self.invocations
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| HalError::tool_failed(name, "unknown tool"))?;
        handler(&arguments)
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn registry_of(sessions: Vec<Arc<StubSession>>) -> Arc<ToolRegistry> {
    registry_with(sessions, RegistryOptions::default())
}

pub fn registry_with(sessions: Vec<Arc<StubSession>>, options: RegistryOptions) -> Arc<ToolRegistry> {
    let sessions = sessions
        .into_iter()
        .map(|session| session as Arc<dyn ToolSessionOps>)
        .collect();
    Arc::new(ToolRegistry::new(sessions, options).expect("registry should build"))
}

pub const SYSTEM_PROMPT: &str = "You are HAL 9000.";

pub fn orchestrator(
    registry: Arc<ToolRegistry>,
    gateway: Arc<ScriptedGateway>,
    config: OrchestratorConfig,
) -> Orchestrator {
    Orchestrator::new(SYSTEM_PROMPT, registry, gateway, config)
}
