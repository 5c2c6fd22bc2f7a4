//! Configuration loading and validation for AgentMesh.
//!
//! Loads a TOML file describing the runtime (serve address, provider
//! endpoints, tool-gateway endpoint) plus the declarative `[[agents]]`
//! tables the registry builds the composition tree from. Environment
//! variables fill unset fields at load time; nothing below this layer
//! reads the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

use agentmesh_core::error::ConfigError;
use agentmesh_core::make_agent_id;

/// Tags for the registered agent constructors.
///
/// This is a closed set: an unknown tag in configuration fails at
/// deserialization, naming the offending value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Model-backed leaf agent (the default).
    #[default]
    Llm,
    /// Runs its children strictly in declared order.
    Sequential,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Llm => write!(f, "llm"),
            AgentKind::Sequential => write!(f, "sequential"),
        }
    }
}

/// Specification for the model used by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model name (e.g., "ai/qwen3", "gpt-4o").
    pub name: String,

    /// Provider tag; defaults to the local runtime when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// A model field: either a bare model name or a full spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelField {
    /// Bare model name; provider defaults to the local runtime.
    Name(String),
    /// Explicit `{name, provider}` pair.
    Spec(ModelSpec),
}

impl ModelField {
    /// The model name and (possibly unset) provider tag.
    pub fn parts(&self) -> (&str, Option<&str>) {
        match self {
            ModelField::Name(name) => (name, None),
            ModelField::Spec(spec) => (&spec.name, spec.provider.as_deref()),
        }
    }
}

/// Declarative description of one agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Human-readable name (required).
    pub name: String,

    /// Stable identifier; derived from `name` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Which constructor builds this agent.
    #[serde(default)]
    pub kind: AgentKind,

    /// What this agent does (also served on its capability card).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// System instructions for a model-backed agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// The model to use; required for `llm` agents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelField>,

    /// Gateway tools, `mcp/<server>:<tool>` each.
    #[serde(default, rename = "tools", skip_serializing_if = "Vec::is_empty")]
    pub tool_specs: Vec<String>,

    /// Child references: declared agent ids or remote agent URLs.
    #[serde(default, rename = "sub_agents", skip_serializing_if = "Vec::is_empty")]
    pub sub_agent_refs: Vec<String>,

    /// State-store key for this agent's result; defaults per kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,

    /// Skills advertised on the capability card.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<serde_json::Value>,
}

impl AgentConfig {
    /// The stable identifier: explicit `id`, else derived from `name`.
    pub fn agent_id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => make_agent_id(&self.name),
        }
    }
}

/// Where the served surface binds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    9001
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Model provider endpoints and credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Base URL of the local model runtime.
    #[serde(default = "default_local_base_url")]
    pub local_base_url: String,

    /// API key sent to the local runtime (it ignores the value, but the
    /// OpenAI-compatible endpoint rejects an empty one).
    #[serde(default = "default_local_api_key")]
    pub local_api_key: String,

    /// OpenAI base URL.
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// OpenAI API key; `OPENAI_API_KEY` fills this when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
}

fn default_local_base_url() -> String {
    "http://localhost:12434/engines/v1".into()
}
fn default_local_api_key() -> String {
    "unused".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            local_base_url: default_local_base_url(),
            local_api_key: default_local_api_key(),
            openai_base_url: default_openai_base_url(),
            openai_api_key: None,
        }
    }
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProvidersConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvidersConfig")
            .field("local_base_url", &self.local_base_url)
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .finish()
    }
}

/// Tool-gateway connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolGatewayConfig {
    /// Endpoint spec: `http(s)://…` for the streaming transport, else
    /// `host:port` for the bridged stdio transport.
    /// `MCPGATEWAY_ENDPOINT` fills this when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Reachability probe timeout, seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_probe_timeout_secs() -> u64 {
    5
}

impl Default for ToolGatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

/// Leaf-agent behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    /// Maximum tool-call iterations per turn (safety limit).
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    /// Default sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tool_iterations() -> u32 {
    8
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            temperature: default_temperature(),
        }
    }
}

/// The root configuration structure: runtime settings plus the
/// declarative agent set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Serve address for the produced surface.
    #[serde(default)]
    pub serve: ServeConfig,

    /// Model provider settings.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Tool-gateway settings.
    #[serde(default)]
    pub gateway: ToolGatewayConfig,

    /// Leaf-agent defaults.
    #[serde(default)]
    pub agent: AgentDefaults,

    /// Declared agents; the first one is the pipeline root.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

impl AppConfig {
    /// Load configuration from a file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment applied).
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Fill unset fields from the environment:
    /// `OPENAI_API_KEY`, `MODEL_RUNNER_URL`, `MCPGATEWAY_ENDPOINT`.
    pub fn apply_env_overrides(&mut self) {
        if self.providers.openai_api_key.is_none() {
            self.providers.openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        if let Ok(url) = std::env::var("MODEL_RUNNER_URL") {
            self.providers.local_base_url = url;
        }
        if self.gateway.endpoint.is_none() {
            self.gateway.endpoint = std::env::var("MCPGATEWAY_ENDPOINT").ok();
        }
    }
}
