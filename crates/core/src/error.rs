//! Error types for the AgentMesh domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Construction errors (configuration, gateway reachability) abort
//! startup; per-request errors are converted into ordinary response
//! events by the nodes that encounter them, so a running pipeline
//! never crashes from a remote peer's failure.

use thiserror::Error;

/// The top-level error type for all AgentMesh operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Configuration errors ---
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Remote peer errors ---
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    // --- Tool gateway errors ---
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The invocation's event receiver was dropped mid-stream.
    #[error("Invocation canceled: {0}")]
    Canceled(String),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Cannot parse config: {0}")]
    Parse(String),

    #[error("Unknown agent kind: {0}")]
    UnknownKind(String),

    #[error("Agent kind '{0}' is already registered")]
    DuplicateKind(String),

    #[error("Duplicate agent id: {0}")]
    DuplicateAgentId(String),

    #[error("Agent '{agent}' references unknown sub-agent '{reference}'")]
    UnknownAgentRef { agent: String, reference: String },

    #[error("Agent '{agent}' participates in a sub-agent cycle")]
    CyclicAgentRef { agent: String },

    #[error("Agent '{0}' does not specify a model")]
    MissingModel(String),

    #[error("Agent '{0}' specifies a model with an empty name")]
    MissingModelName(String),

    #[error("Unknown model provider: {0}")]
    UnknownProvider(String),

    #[error("Provider '{provider}' requires an API key and none is configured")]
    MissingApiKey { provider: String },
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("Streaming send to {url} failed: {reason}")]
    Stream { url: String, reason: String },

    #[error("Send to {url} failed: {reason}")]
    Send { url: String, reason: String },

    #[error("Malformed response from {url}: {reason}")]
    Protocol { url: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Bad tool spec: {0}")]
    BadToolSpec(String),

    #[error("Invalid gateway endpoint: {0}")]
    BadEndpoint(String),

    #[error("Cannot reach {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("Gateway protocol error: {0}")]
    Protocol(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool call failed: {tool} — {reason}")]
    CallFailed { tool: String, reason: String },
}
