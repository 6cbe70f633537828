//! Error types for the orchestrator.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all orchestrator operations.
#[derive(Error, Debug)]
pub enum HalError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Non-fatal at startup: the provider is left out of the registry.
    #[error("Tool provider '{provider}' failed to launch: {message}")]
    ProviderLaunch { provider: String, message: String },

    #[error("MCP Tool Server not connected")]
    NoSessions,

    #[error("Tool '{0}' not found on any connected server")]
    ToolNotFound(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolInvocation {
        tool_name: String,
        message: String,
        /// Timeouts and similar conditions that may succeed on another attempt.
        transient: bool,
    },

    #[error("LLM gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("LLM gateway protocol error: {0}")]
    GatewayProtocol(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HalError {
    /// Create a tool invocation error that should not be retried.
    pub fn tool_failed(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolInvocation {
            tool_name: tool_name.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// Create a tool invocation error that may succeed when retried.
    pub fn tool_transient(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolInvocation {
            tool_name: tool_name.into(),
            message: message.into(),
            transient: true,
        }
    }

    pub fn provider_launch(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderLaunch {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidArgument(_) => ErrorCategory::Configuration,
            Self::ProviderLaunch { .. } => ErrorCategory::ProviderLaunch,
            Self::NoSessions => ErrorCategory::NoSessions,
            Self::ToolNotFound(_) => ErrorCategory::ToolNotFound,
            Self::ToolInvocation { .. } => ErrorCategory::ToolExecution,
            Self::GatewayUnavailable(_) => ErrorCategory::GatewayUnavailable,
            Self::GatewayProtocol(_) => ErrorCategory::GatewayProtocol,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) => ErrorCategory::Io,
            Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ToolInvocation { transient, .. } => *transient,
            Self::GatewayUnavailable(_) | Self::Timeout(_) => true,
            _ => false,
        }
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::GatewayUnavailable => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::GatewayProtocol => RecoverySuggestion::CheckGateway,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::ToolExecution if self.is_retryable() => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::ProviderLaunch
            | ErrorCategory::NoSessions
            | ErrorCategory::ToolNotFound
            | ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolProvider,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            _ => RecoverySuggestion::None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, HalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_failures_are_distinguished() {
        let down = HalError::GatewayUnavailable("connection refused".into());
        let garbage = HalError::GatewayProtocol("missing field `response`".into());

        assert_eq!(down.category(), ErrorCategory::GatewayUnavailable);
        assert_eq!(garbage.category(), ErrorCategory::GatewayProtocol);
        assert!(down.is_retryable());
        assert!(!garbage.is_retryable());
    }

    #[test]
    fn only_transient_tool_failures_retry() {
        assert!(HalError::tool_transient("weather", "timed out").is_retryable());
        assert!(!HalError::tool_failed("weather", "bad city").is_retryable());
        assert!(!HalError::ToolNotFound("weather".into()).is_retryable());
    }

    #[test]
    fn no_sessions_message_matches_service_unavailable_detail() {
        assert_eq!(HalError::NoSessions.to_string(), "MCP Tool Server not connected");
    }

    #[test]
    fn recovery_suggestions_follow_category() {
        assert_eq!(
            HalError::tool_transient("search", "timed out").recovery_suggestion(),
            RecoverySuggestion::RetryWithBackoff
        );
        assert_eq!(
            HalError::ToolNotFound("search".into()).recovery_suggestion(),
            RecoverySuggestion::CheckToolProvider
        );
        assert_eq!(
            HalError::Configuration("empty gateway url".into()).recovery_suggestion(),
            RecoverySuggestion::CheckConfiguration
        );
    }
}
