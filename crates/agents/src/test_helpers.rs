//! Shared test support — a scripted mock provider.
//!
//! Public so downstream crates' integration tests can drive local
//! pipeline stages without a model backend.

use std::sync::Mutex;

use agentmesh_core::error::ProviderError;
use agentmesh_core::message::{Message, MessageToolCall};
use agentmesh_core::provider::{Provider, ProviderRequest, ProviderResponse};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request it was given. Panics if more calls are made
/// than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();

        let index = requests.len();
        if index >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                index,
                responses.len()
            );
        }
        requests.push(request);
        Ok(responses[index].clone())
    }
}

/// A provider that always fails.
pub struct FailingProvider {
    pub error: ProviderError,
}

#[async_trait::async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn complete(
        &self,
        _request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        Err(self.error.clone())
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        model: "mock-model".into(),
        usage: None,
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut message = Message::assistant(thought);
    message.tool_calls = tool_calls;
    ProviderResponse {
        message,
        model: "mock-model".into(),
        usage: None,
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}
