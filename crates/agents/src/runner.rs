//! The runner — one query in, one event stream out.
//!
//! Each invocation is a single spawned task that owns its session for
//! the whole turn: check out (or create) the session, record the user
//! message, run the root node, write the session back. Concurrency
//! exists only across sessions; within one there is exactly one
//! writer, so the tree needs no locks.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use agentmesh_core::error::Error;
use agentmesh_core::event::AgentEvent;
use agentmesh_core::node::{AgentNode, InvocationContext};
use agentmesh_core::session::{SessionService, SharedSessions};

/// Drives a composition tree against a session service.
pub struct Runner {
    app_name: String,
    root: Arc<dyn AgentNode>,
    sessions: SharedSessions,
}

impl Runner {
    pub fn new(app_name: impl Into<String>, root: Arc<dyn AgentNode>) -> Self {
        Self {
            app_name: app_name.into(),
            root,
            sessions: Arc::new(SessionService::new()),
        }
    }

    pub fn with_sessions(mut self, sessions: SharedSessions) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn root(&self) -> &Arc<dyn AgentNode> {
        &self.root
    }

    pub fn sessions(&self) -> &SharedSessions {
        &self.sessions
    }

    /// Run one turn. Events arrive on the returned receiver as the
    /// pipeline produces them; dropping the receiver cancels the turn
    /// at its next emission (completed stages' state writes stand).
    pub async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        query: &str,
    ) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(64);
        let root = self.root.clone();
        let sessions = self.sessions.clone();
        let app = self.app_name.clone();
        let user_id = user_id.to_string();
        let session_id = session_id.to_string();
        let query = query.to_string();

        tokio::spawn(async move {
            let mut session = sessions.get_or_create(&app, &user_id, &session_id).await;
            session.events.push(AgentEvent::user(query.clone()));

            info!(app = %app, session = %session_id, root = root.name(), "Invocation started");
            let mut ctx = InvocationContext::new(session, Some(query));

            match root.invoke(&mut ctx, &tx).await {
                Ok(()) => {}
                Err(Error::Canceled(reason)) => {
                    debug!(session = %session_id, reason = %reason, "Invocation abandoned by caller");
                }
                Err(e) => {
                    // Nodes convert their own failures into error
                    // events; anything escaping here still must not
                    // crash the conversation.
                    warn!(session = %session_id, error = %e, "Pipeline error");
                    let event = AgentEvent::error(root.name(), e.to_string());
                    ctx.session.events.push(event.clone());
                    let _ = tx.send(event).await;
                }
            }

            sessions.save(ctx.session).await;
        });

        rx
    }

    /// Run one turn and collect every event (for non-streaming callers).
    pub async fn run_collect(
        &self,
        user_id: &str,
        session_id: &str,
        query: &str,
    ) -> Vec<AgentEvent> {
        let mut rx = self.run(user_id, session_id, query).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmNode;
    use crate::sequential::SequentialNode;
    use crate::test_helpers::*;

    #[tokio::test]
    async fn run_collect_returns_terminal_event() {
        let provider = Arc::new(SequentialMockProvider::single_text("Hello!"));
        let node = Arc::new(LlmNode::new("writer", provider, "mock-model"));
        let runner = Runner::new("app", node);

        let events = runner.run_collect("u", "s1", "say hello").await;
        assert_eq!(events.last(), Some(&AgentEvent::finished("writer", "Hello!")));
    }

    #[tokio::test]
    async fn session_persists_across_turns() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("first"),
            make_text_response("second"),
        ]));
        let node = Arc::new(LlmNode::new("writer", provider, "mock-model"));
        let runner = Runner::new("app", node);

        runner.run_collect("u", "s1", "turn one").await;
        runner.run_collect("u", "s1", "turn two").await;

        let session = runner.sessions().get("app", "u", "s1").await.unwrap();
        // Both user messages and both finals are in history.
        assert_eq!(session.events.len(), 4);
        assert_eq!(session.first_user_message(), Some("turn one"));
        assert_eq!(session.state.get("writer_result"), Some("second"));
    }

    #[tokio::test]
    async fn sequential_pipeline_threads_state() {
        let researcher = Arc::new(LlmNode::new(
            "researcher",
            Arc::new(SequentialMockProvider::single_text("facts")),
            "mock-model",
        ));
        let writer_provider = Arc::new(SequentialMockProvider::single_text("article"));
        let writer = Arc::new(LlmNode::new("writer", writer_provider.clone(), "mock-model"));

        let root = Arc::new(SequentialNode::new("pipeline", vec![researcher, writer]));
        let runner = Runner::new("app", root);

        runner.run_collect("u", "s1", "write about rust").await;

        // The writer consumed the researcher's published result.
        assert_eq!(
            writer_provider.requests()[0].messages.last().unwrap().content,
            "facts"
        );
        let session = runner.sessions().get("app", "u", "s1").await.unwrap();
        assert_eq!(session.state.get("researcher_result"), Some("facts"));
        assert_eq!(session.state.get("writer_result"), Some("article"));
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_poison_the_session() {
        let provider = Arc::new(SequentialMockProvider::single_text("slow answer"));
        let node = Arc::new(LlmNode::new("writer", provider, "mock-model"));
        let runner = Runner::new("app", node);

        let rx = runner.run("u", "s1", "q").await;
        drop(rx);

        // The next turn on the same session still works.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(runner.sessions().get("app", "u", "s1").await.is_some());
    }
}
