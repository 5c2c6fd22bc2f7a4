//! Proxy node — a remote agent behind the local invocation contract.
//!
//! Per invocation the proxy walks one path: lazily initialize the
//! client (card fetch, degradable), resolve input like any sequential
//! child, attempt the streaming send, fall back to exactly one
//! non-streaming send if the stream fails, then publish the result to
//! the state store and emit one final event. A fallback failure is a
//! soft error event, not a crash.
//!
//! If the streaming request already reached the remote side before
//! failing client-side, the fallback can re-trigger remote work; with
//! a non-idempotent peer that is an at-most-once violation, so each
//! fallback is logged at warn.

use async_trait::async_trait;
use tokio::sync::{OnceCell, mpsc};
use tracing::{info, warn};

use agentmesh_core::error::Result;
use agentmesh_core::event::AgentEvent;
use agentmesh_core::node::{AgentNode, InvocationContext, make_agent_id};

use crate::client::RemoteClient;
use crate::wire::SendRequest;

/// Non-LLM agent that forwards its turn to a remote peer.
pub struct ProxyNode {
    name: String,
    url: String,
    output_key: String,
    client: OnceCell<RemoteClient>,
}

impl ProxyNode {
    /// A proxy for the remote agent at `url`. The node name is derived
    /// from the URL; the output key defaults to the URL itself.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: make_agent_id(&url),
            url: url.clone(),
            output_key: url,
            client: OnceCell::new(),
        }
    }

    /// Override where this node publishes its result.
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The client, created once per node and reused for its lifetime.
    async fn client(&self) -> &RemoteClient {
        self.client
            .get_or_init(|| RemoteClient::connect(&self.url))
            .await
    }
}

#[async_trait]
impl AgentNode for ProxyNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_key(&self) -> Option<&str> {
        Some(&self.output_key)
    }

    async fn invoke(
        &self,
        ctx: &mut InvocationContext,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<()> {
        let client = self.client().await;
        let input = ctx.resolve_input();
        let request = SendRequest::text(input, client.default_skill());

        let result = match client.send_streaming(&request).await {
            Ok(text) => Ok(text),
            Err(stream_error) => {
                warn!(
                    url = %self.url,
                    error = %stream_error,
                    "Streaming send failed, falling back to single send"
                );
                client.send(&request).await
            }
        };

        match result {
            Ok(text) => {
                info!(url = %self.url, chars = text.len(), "Remote agent completed");
                ctx.session.state.insert(self.output_key.clone(), text.clone());
                ctx.emit(tx, AgentEvent::finished(self.name.clone(), text))
                    .await
            }
            Err(e) => {
                ctx.emit(
                    tx,
                    AgentEvent::error(
                        self.name.clone(),
                        format!("Error calling remote agent: {e}"),
                    ),
                )
                .await
            }
        }
    }
}
