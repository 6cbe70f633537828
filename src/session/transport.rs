//! Stdio transport: a tool provider spoken to over its stdin/stdout.

use rmcp::model::{ClientInfo, ProtocolVersion};
use rmcp::service::{ClientInitializeError, DynService, RoleClient, RunningService, ServiceExt};
use rmcp::transport::TokioChildProcess;
use tokio::process::Command;

use super::launch::ProviderLaunchSpec;
use crate::error::{HalError, Result};

pub type DynClientService = Box<dyn DynService<RoleClient>>;
pub type McpRunningService = RunningService<RoleClient, DynClientService>;

/// Launches a provider process and runs the initialize handshake over its stdio.
#[derive(Debug, Clone)]
pub struct StdioTransport {
    spec: ProviderLaunchSpec,
}

impl StdioTransport {
    pub fn new(spec: ProviderLaunchSpec) -> Self {
        Self { spec }
    }

    /// Build the child command. The child is killed when its handle drops.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.spec.command);
        command.args(&self.spec.args).envs(&self.spec.env);
        if let Some(cwd) = &self.spec.cwd {
            command.current_dir(cwd);
        }
        command.kill_on_drop(true);
        command
    }

    /// Spawn the provider and complete the handshake.
    ///
    /// Servers that reject the latest protocol version are retried once with
    /// the 2024-11-05 revision.
    pub async fn connect(&self) -> Result<McpRunningService> {
        match self.serve(ProtocolVersion::LATEST).await {
            Ok(service) => return Ok(service),
            Err(error) if should_retry_protocol_fallback(&error) => {
                tracing::debug!(
                    provider = %self.spec.id,
                    "Provider rejected latest protocol version, retrying with 2024-11-05"
                );
            }
            Err(error) => return Err(map_client_initialize_error(&self.spec.id, error)),
        }

        self.serve(ProtocolVersion::V_2024_11_05)
            .await
            .map_err(|error| map_client_initialize_error(&self.spec.id, error))
    }

    async fn serve(
        &self,
        protocol_version: ProtocolVersion,
    ) -> std::result::Result<McpRunningService, ClientInitializeError> {
        let transport = TokioChildProcess::new(self.command()).map_err(|error| {
            ClientInitializeError::transport::<TokioChildProcess>(error, "spawn stdio transport")
        })?;

        let client_info = ClientInfo {
            protocol_version,
            ..Default::default()
        };
        client_info.into_dyn().serve(transport).await
    }
}

fn should_retry_protocol_fallback(error: &ClientInitializeError) -> bool {
    match error {
        ClientInitializeError::JsonRpcError(error) => {
            let message = error.message.to_ascii_lowercase();
            message.contains("protocol") && message.contains("version")
        }
        _ => false,
    }
}

fn map_client_initialize_error(provider: &str, error: ClientInitializeError) -> HalError {
    let message = match error {
        ClientInitializeError::ConnectionClosed(context) => {
            format!("connection closed during initialize: {context}")
        }
        ClientInitializeError::TransportError { error, context } => {
            format!("transport error ({context}): {error}")
        }
        ClientInitializeError::JsonRpcError(error) => {
            format!("initialize JSON-RPC error {}: {}", error.code.0, error.message)
        }
        ClientInitializeError::Cancelled => "initialize cancelled".to_string(),
        other => format!("initialize error: {other}"),
    };
    HalError::provider_launch(provider, message)
}
