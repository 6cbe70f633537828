//! Error classification and recovery.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A tool provider could not be launched or initialized.
    ProviderLaunch,
    /// Tool use was required but nothing is connected.
    NoSessions,
    /// The model asked for a tool nobody advertises.
    ToolNotFound,
    /// A resolved tool failed while running.
    ToolExecution,
    /// The LLM backend could not be reached.
    GatewayUnavailable,
    /// The LLM backend answered with something unusable.
    GatewayProtocol,
    Timeout,
    Configuration,
    Serialization,
    Io,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckConfiguration,
    CheckToolProvider,
    CheckGateway,
    IncreaseTimeout,
    None,
}
