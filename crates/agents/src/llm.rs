//! The model-backed leaf agent.
//!
//! One turn: resolve input, send instructions + input to the provider,
//! loop over tool calls against the gateway toolsets (bounded), write
//! the final text under the node's output key, emit one final event.
//! Without tools the provider is streamed and each delta goes out as a
//! partial event.
//!
//! Declared sub-agents run before the model call, in order, as
//! pipeline pre-stages; the model then synthesizes from the last stage
//! output like any later sequential stage would.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use agentmesh_config::{AgentConfig, AppConfig};
use agentmesh_core::error::{GatewayError, ProviderError, Result};
use agentmesh_core::event::AgentEvent;
use agentmesh_core::message::Message;
use agentmesh_core::node::{AgentNode, InvocationContext};
use agentmesh_core::provider::{Provider, ProviderRequest, ToolDefinition};
use agentmesh_mcp::{Toolset, connect_toolsets};
use agentmesh_providers::resolve_model;

/// Model-backed leaf node.
pub struct LlmNode {
    id: String,
    instructions: String,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tool_iterations: u32,
    output_key: String,
    toolsets: Vec<Toolset>,
    sub_agents: Vec<Arc<dyn AgentNode>>,
}

impl LlmNode {
    /// Bare node for embedding and tests; configure with the `with_*`
    /// builders.
    pub fn new(id: impl Into<String>, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            output_key: format!("{id}_result"),
            id,
            instructions: String::new(),
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tool_iterations: 8,
            toolsets: Vec::new(),
            sub_agents: Vec::new(),
        }
    }

    /// Build from configuration. Consults the gateway connector once,
    /// here, when tools are declared — an unreachable gateway fails
    /// construction, not the first request.
    pub async fn from_config(
        config: &AgentConfig,
        sub_agents: Vec<Arc<dyn AgentNode>>,
        app: &AppConfig,
    ) -> Result<Self> {
        let (provider, model) = resolve_model(config, &app.providers)?;

        let toolsets = if config.tool_specs.is_empty() {
            Vec::new()
        } else {
            let endpoint = app.gateway.endpoint.as_deref().ok_or_else(|| {
                GatewayError::BadEndpoint("no tool gateway endpoint configured".into())
            })?;
            connect_toolsets(
                endpoint,
                &config.tool_specs,
                Duration::from_secs(app.gateway.probe_timeout_secs),
            )
            .await?
        };

        let id = config.agent_id();
        Ok(Self {
            output_key: config
                .output_key
                .clone()
                .unwrap_or_else(|| format!("{id}_result")),
            id,
            instructions: config.instructions.clone().unwrap_or_default(),
            provider,
            model,
            temperature: app.agent.temperature,
            max_tool_iterations: app.agent.max_tool_iterations,
            toolsets,
            sub_agents,
        })
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    pub fn with_toolsets(mut self, toolsets: Vec<Toolset>) -> Self {
        self.toolsets = toolsets;
        self
    }

    pub fn with_sub_agents(mut self, sub_agents: Vec<Arc<dyn AgentNode>>) -> Self {
        self.sub_agents = sub_agents;
        self
    }

    pub fn with_max_tool_iterations(mut self, limit: u32) -> Self {
        self.max_tool_iterations = limit;
        self
    }

    fn request(&self, messages: Vec<Message>) -> ProviderRequest {
        let mut request = ProviderRequest::new(&self.model, messages);
        request.temperature = self.temperature;
        request
    }

    /// Stream one completion, emitting partial events per delta.
    /// Returns `None` after emitting a soft error event.
    async fn stream_once(
        &self,
        messages: Vec<Message>,
        ctx: &mut InvocationContext,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<Option<String>> {
        let mut rx = match self.provider.stream(self.request(messages)).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(agent = %self.id, error = %e, "Provider stream failed");
                ctx.emit(tx, self.error_event(&e)).await?;
                return Ok(None);
            }
        };

        let mut accumulated = String::new();
        while let Some(chunk) = rx.recv().await {
            match chunk {
                Ok(chunk) => {
                    if let Some(content) = chunk.content {
                        if !content.is_empty() {
                            accumulated.push_str(&content);
                            ctx.emit(tx, AgentEvent::partial(self.id.clone(), content))
                                .await?;
                        }
                    }
                    if chunk.done {
                        break;
                    }
                }
                Err(e) => {
                    warn!(agent = %self.id, error = %e, "Provider stream interrupted");
                    ctx.emit(tx, self.error_event(&e)).await?;
                    return Ok(None);
                }
            }
        }
        Ok(Some(accumulated))
    }

    /// Bounded completion/tool loop used when tools are declared.
    async fn tool_loop(
        &self,
        mut messages: Vec<Message>,
        definitions: &[ToolDefinition],
    ) -> std::result::Result<String, ProviderError> {
        for iteration in 0..self.max_tool_iterations {
            let mut request = self.request(messages.clone());
            request.tools = definitions.to_vec();

            let response = self.provider.complete(request).await?;
            if response.message.tool_calls.is_empty() {
                return Ok(response.message.content);
            }

            let tool_calls = response.message.tool_calls.clone();
            messages.push(response.message);

            for tc in &tool_calls {
                let arguments: serde_json::Value =
                    serde_json::from_str(&tc.arguments).unwrap_or_else(|_| serde_json::json!({}));
                let output = match self.call_tool(&tc.name, arguments).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(agent = %self.id, tool = %tc.name, error = %e, "Tool call failed");
                        format!("Error: {e}")
                    }
                };
                messages.push(Message::tool_result(tc.id.clone(), output));
            }
            debug!(agent = %self.id, iteration, tools = tool_calls.len(), "Tool iteration complete");
        }

        warn!(agent = %self.id, "Max tool iterations reached, forcing text response");
        let response = self.provider.complete(self.request(messages)).await?;
        Ok(response.message.content)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<String, GatewayError> {
        match self.toolsets.iter().find(|t| t.has_tool(name)) {
            Some(toolset) => toolset.call(name, arguments).await,
            None => Err(GatewayError::ToolNotFound(name.into())),
        }
    }

    fn error_event(&self, error: &dyn std::fmt::Display) -> AgentEvent {
        AgentEvent::error(self.id.clone(), format!("Error generating response: {error}"))
    }
}

#[async_trait]
impl AgentNode for LlmNode {
    fn name(&self) -> &str {
        &self.id
    }

    fn output_key(&self) -> Option<&str> {
        Some(&self.output_key)
    }

    async fn invoke(
        &self,
        ctx: &mut InvocationContext,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<()> {
        // Declared sub-agents run first, as pipeline pre-stages.
        for child in &self.sub_agents {
            child.invoke(ctx, tx).await?;
            ctx.stages_completed += 1;
        }

        let input = ctx.resolve_input();
        let mut messages = Vec::new();
        if !self.instructions.is_empty() {
            messages.push(Message::system(&self.instructions));
        }
        messages.push(Message::user(input));

        let definitions: Vec<ToolDefinition> =
            self.toolsets.iter().flat_map(|t| t.definitions()).collect();

        let final_text = if definitions.is_empty() {
            match self.stream_once(messages, ctx, tx).await? {
                Some(text) => text,
                None => return Ok(()), // soft error already emitted
            }
        } else {
            match self.tool_loop(messages, &definitions).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(agent = %self.id, error = %e, "Provider call failed");
                    return ctx.emit(tx, self.error_event(&e)).await;
                }
            }
        };

        ctx.session
            .state
            .insert(self.output_key.clone(), final_text.clone());
        ctx.emit(tx, AgentEvent::finished(self.id.clone(), final_text))
            .await
    }
}
