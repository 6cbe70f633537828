//! Tool registry: one flat catalogue over many tool sessions, with routing back
//! to the session that owns each tool.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;

use crate::error::{HalError, Result};
use crate::session::{coerce_tool_arguments, ProviderLaunchSpec, ToolSession, ToolSessionOps};
use crate::types::ToolSpec;
use crate::util::with_timeout;

/// What `build` does when one session fails to list its tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// Leave the failing session's tools out of this build and keep going.
    #[default]
    SkipUnavailable,
    /// Stop on the first failing session.
    StrictFailFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Upper bound on one tool invocation.
    pub call_timeout: Duration,
    pub refresh_policy: RefreshPolicy,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            refresh_policy: RefreshPolicy::default(),
        }
    }
}

/// A catalogue entry and the session it routes to.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredTool {
    pub spec: ToolSpec,
    pub session_id: String,
}

/// Result of one registry build, in first-advertised order.
///
/// A catalogue doubles as a routing snapshot: [`ToolRegistry::resolve_in`]
/// routes against it no matter what later builds do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalogue {
    pub tools: Vec<RegisteredTool>,
    /// Sessions that answered the listing, including ones with no tools.
    pub live_sessions: usize,
}

impl Catalogue {
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Specs in catalogue order, as offered to the model.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec.clone()).collect()
    }

    pub fn session_for(&self, tool_name: &str) -> Option<&str> {
        self.tools
            .iter()
            .find(|tool| tool.spec.name == tool_name)
            .map(|tool| tool.session_id.as_str())
    }
}

/// Owns every connected tool session and routes tool names to them.
pub struct ToolRegistry {
    sessions: Vec<Arc<dyn ToolSessionOps>>,
    routes: RwLock<HashMap<String, usize>>,
    options: RegistryOptions,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("sessions", &self.session_ids())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    /// Take ownership of `sessions`. Registration order decides collisions.
    pub fn new(sessions: Vec<Arc<dyn ToolSessionOps>>, options: RegistryOptions) -> Result<Self> {
        let mut seen = HashMap::with_capacity(sessions.len());
        for (position, session) in sessions.iter().enumerate() {
            let id = session.id().trim();
            if id.is_empty() {
                return Err(HalError::Configuration(
                    "tool session id must not be empty".into(),
                ));
            }
            if seen.insert(id.to_owned(), position).is_some() {
                return Err(HalError::Configuration(format!(
                    "Duplicate tool session id '{id}'"
                )));
            }
        }

        Ok(Self {
            sessions,
            routes: RwLock::new(HashMap::new()),
            options,
        })
    }

    /// A registry with no sessions.
    pub fn empty(options: RegistryOptions) -> Self {
        Self {
            sessions: Vec::new(),
            routes: RwLock::new(HashMap::new()),
            options,
        }
    }

    /// Launch every provider and keep the ones that come up.
    ///
    /// A provider that fails to start is logged and left out; the registry is
    /// still returned, possibly with no sessions at all.
    pub async fn connect_all(
        specs: &[ProviderLaunchSpec],
        connect_timeout: Duration,
        options: RegistryOptions,
    ) -> Result<Self> {
        let attempts = join_all(
            specs
                .iter()
                .map(|spec| ToolSession::connect(spec.clone(), connect_timeout)),
        )
        .await;

        let mut sessions: Vec<Arc<dyn ToolSessionOps>> = Vec::with_capacity(specs.len());
        for (spec, attempt) in specs.iter().zip(attempts) {
            match attempt {
                Ok(session) => {
                    tracing::info!(provider = %spec.id, command = %spec.display_command(), "Connected to tool provider");
                    sessions.push(Arc::new(session));
                }
                Err(error) => {
                    tracing::error!(provider = %spec.id, error = %error, "Failed to connect to tool provider");
                }
            }
        }

        let registry = match Self::new(sessions.clone(), options) {
            Ok(registry) => registry,
            Err(error) => {
                close_all(&sessions).await;
                return Err(error);
            }
        };

        match registry.build().await {
            Ok(catalogue) => {
                for tool in &catalogue.tools {
                    tracing::info!(
                        session = %tool.session_id,
                        tool = %tool.spec.name,
                        description = %tool.spec.description,
                        "Discovered tool"
                    );
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "Initial tool discovery failed");
            }
        }

        Ok(registry)
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions
            .iter()
            .map(|session| session.id().to_owned())
            .collect()
    }

    /// Query every session and rebuild the catalogue and the shared routing
    /// table used by [`resolve`](Self::resolve).
    ///
    /// When two sessions advertise the same name the later session wins; the
    /// entry keeps the position where the name first appeared.
    pub async fn build(&self) -> Result<Catalogue> {
        let (catalogue, routes) = self.discover().await?;
        *self.routes.write().unwrap_or_else(PoisonError::into_inner) = routes;
        Ok(catalogue)
    }

    /// Query every session without touching the shared routing table.
    ///
    /// Turns and health checks use this so concurrent conversations never
    /// rewrite each other's routes.
    pub async fn snapshot(&self) -> Result<Catalogue> {
        self.discover().await.map(|(catalogue, _)| catalogue)
    }

    async fn discover(&self) -> Result<(Catalogue, HashMap<String, usize>)> {
        let listings = join_all(self.sessions.iter().map(|session| session.list_tools())).await;

        let mut tools: Vec<RegisteredTool> = Vec::new();
        let mut routes: HashMap<String, usize> = HashMap::new();
        let mut position_by_name: HashMap<String, usize> = HashMap::new();
        let mut live_sessions = 0;

        for (session_index, (session, listing)) in
            self.sessions.iter().zip(listings).enumerate()
        {
            let specs = match listing {
                Ok(specs) => specs,
                Err(error) => match self.options.refresh_policy {
                    RefreshPolicy::StrictFailFast => return Err(error),
                    RefreshPolicy::SkipUnavailable => {
                        tracing::warn!(session = %session.id(), error = %error, "Skipping session that failed to list tools");
                        continue;
                    }
                },
            };
            live_sessions += 1;

            for spec in specs {
                let entry = RegisteredTool {
                    session_id: session.id().to_owned(),
                    spec,
                };
                match position_by_name.get(&entry.spec.name) {
                    Some(&position) => {
                        tracing::debug!(
                            tool = %entry.spec.name,
                            previous = %tools[position].session_id,
                            session = %entry.session_id,
                            "Tool name collision, later session wins"
                        );
                        routes.insert(entry.spec.name.clone(), session_index);
                        tools[position] = entry;
                    }
                    None => {
                        position_by_name.insert(entry.spec.name.clone(), tools.len());
                        routes.insert(entry.spec.name.clone(), session_index);
                        tools.push(entry);
                    }
                }
            }
        }

        Ok((
            Catalogue {
                tools,
                live_sessions,
            },
            routes,
        ))
    }

    /// Session owning `tool_name` as of the last build. Does no I/O.
    pub fn resolve(&self, tool_name: &str) -> Result<Arc<dyn ToolSessionOps>> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .get(tool_name)
            .and_then(|&index| self.sessions.get(index))
            .cloned()
            .ok_or_else(|| HalError::ToolNotFound(tool_name.to_owned()))
    }

    /// Session owning `tool_name` according to `catalogue`. Does no I/O.
    pub fn resolve_in(
        &self,
        catalogue: &Catalogue,
        tool_name: &str,
    ) -> Result<Arc<dyn ToolSessionOps>> {
        catalogue
            .session_for(tool_name)
            .and_then(|session_id| {
                self.sessions
                    .iter()
                    .find(|session| session.id() == session_id)
            })
            .cloned()
            .ok_or_else(|| HalError::ToolNotFound(tool_name.to_owned()))
    }

    /// Resolve and invoke a tool.
    pub async fn call_tool(&self, tool_name: &str, arguments: serde_json::Value) -> Result<String> {
        let session = self.resolve(tool_name)?;
        self.invoke(&session, tool_name, arguments).await
    }

    /// Invoke a tool on an already resolved session, bounded by the call timeout.
    ///
    /// Arguments that are not an object are rejected before the provider is
    /// contacted. A timeout is reported as a transient tool failure.
    pub async fn invoke(
        &self,
        session: &Arc<dyn ToolSessionOps>,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<String> {
        let arguments = coerce_tool_arguments(tool_name, arguments)?
            .map(serde_json::Value::Object)
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));

        match with_timeout(
            self.options.call_timeout,
            session.call_tool(tool_name, arguments),
        )
        .await
        {
            Err(HalError::Timeout(ms)) => Err(HalError::tool_transient(
                tool_name,
                format!("timed out after {ms}ms"),
            )),
            other => other,
        }
    }

    /// Close every session. Safe to call more than once.
    pub async fn shutdown(&self) {
        close_all(&self.sessions).await;
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

async fn close_all(sessions: &[Arc<dyn ToolSessionOps>]) {
    let results = join_all(sessions.iter().map(|session| session.close())).await;
    for (session, result) in sessions.iter().zip(results) {
        match result {
            Ok(()) => tracing::debug!(session = %session.id(), "Closed tool session"),
            Err(error) => {
                tracing::warn!(session = %session.id(), error = %error, "Failed to close tool session")
            }
        }
    }
}
