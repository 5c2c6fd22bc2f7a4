//! Sequential composition — children strictly in declared order.
//!
//! Child *k* fully completes before child *k+1* starts; there is no
//! parallel fan-out. The node itself owns no model and emits no events
//! of its own — its children write the state store and the event
//! stream. Coupling between stages is entirely through the store's
//! stage-output convention, so independently authored agents chain
//! without a shared schema.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use agentmesh_core::error::Result;
use agentmesh_core::event::AgentEvent;
use agentmesh_core::node::{AgentNode, InvocationContext};

/// Runs an ordered list of children, one after another.
pub struct SequentialNode {
    id: String,
    children: Vec<Arc<dyn AgentNode>>,
}

impl SequentialNode {
    pub fn new(id: impl Into<String>, children: Vec<Arc<dyn AgentNode>>) -> Self {
        Self {
            id: id.into(),
            children,
        }
    }

    pub fn children(&self) -> &[Arc<dyn AgentNode>] {
        &self.children
    }
}

#[async_trait]
impl AgentNode for SequentialNode {
    fn name(&self) -> &str {
        &self.id
    }

    async fn invoke(
        &self,
        ctx: &mut InvocationContext,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<()> {
        for (index, child) in self.children.iter().enumerate() {
            debug!(pipeline = %self.id, stage = index, child = child.name(), "Running stage");
            child.invoke(ctx, tx).await?;
            ctx.stages_completed += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_core::session::Session;
    use std::sync::Mutex;

    /// Records the input it resolved, then optionally publishes a result.
    struct RecordingNode {
        id: String,
        output: Option<String>,
        seen_input: Mutex<Option<String>>,
    }

    impl RecordingNode {
        fn new(id: &str, output: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                output: output.map(String::from),
                seen_input: Mutex::new(None),
            })
        }

        fn seen(&self) -> Option<String> {
            self.seen_input.lock().unwrap().clone()
        }

        fn output_key_string(&self) -> String {
            format!("{}_result", self.id)
        }
    }

    #[async_trait]
    impl AgentNode for RecordingNode {
        fn name(&self) -> &str {
            &self.id
        }

        async fn invoke(
            &self,
            ctx: &mut InvocationContext,
            tx: &mpsc::Sender<AgentEvent>,
        ) -> Result<()> {
            *self.seen_input.lock().unwrap() = Some(ctx.resolve_input());
            if let Some(output) = &self.output {
                ctx.session
                    .state
                    .insert(self.output_key_string(), output.clone());
                ctx.emit(tx, AgentEvent::finished(self.id.clone(), output.clone()))
                    .await?;
            }
            Ok(())
        }
    }

    async fn run(node: &SequentialNode, query: &str) -> (InvocationContext, Vec<AgentEvent>) {
        let mut session = Session::new("app", "u", "s");
        session.events.push(AgentEvent::user(query));
        let mut ctx = InvocationContext::new(session, Some(query.to_string()));
        let (tx, mut rx) = mpsc::channel(32);
        node.invoke(&mut ctx, &tx).await.unwrap();
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (ctx, events)
    }

    #[tokio::test]
    async fn first_child_gets_user_message_second_gets_first_result() {
        let a = RecordingNode::new("a", Some("facts"));
        let b = RecordingNode::new("b", Some("summary"));
        let node = SequentialNode::new("pipeline", vec![a.clone(), b.clone()]);

        let (ctx, events) = run(&node, "original question").await;

        assert_eq!(a.seen().as_deref(), Some("original question"));
        assert_eq!(b.seen().as_deref(), Some("facts"));
        assert_eq!(ctx.session.state.get("a_result"), Some("facts"));
        assert_eq!(ctx.session.state.get("b_result"), Some("summary"));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn silent_stage_falls_back_to_original_message() {
        let a = RecordingNode::new("a", None); // writes nothing
        let b = RecordingNode::new("b", Some("done"));
        let node = SequentialNode::new("pipeline", vec![a.clone(), b.clone()]);

        let (_, _) = run(&node, "the question").await;

        // A wrote nothing, so B resolves the original user message.
        assert_eq!(b.seen().as_deref(), Some("the question"));
    }

    #[tokio::test]
    async fn strict_ordering_of_stages() {
        let a = RecordingNode::new("a", Some("one"));
        let b = RecordingNode::new("b", Some("two"));
        let c = RecordingNode::new("c", Some("three"));
        let node = SequentialNode::new("pipeline", vec![a, b.clone(), c.clone()]);

        let (ctx, events) = run(&node, "q").await;

        // C sees B's output, the most recent stage result.
        assert_eq!(c.seen().as_deref(), Some("two"));
        assert_eq!(ctx.stages_completed, 3);
        assert_eq!(
            events,
            vec![
                AgentEvent::finished("a", "one"),
                AgentEvent::finished("b", "two"),
                AgentEvent::finished("c", "three"),
            ]
        );
    }

    #[tokio::test]
    async fn empty_pipeline_completes_without_events() {
        let node = SequentialNode::new("pipeline", vec![]);
        let (ctx, events) = run(&node, "q").await;
        assert!(events.is_empty());
        assert_eq!(ctx.stages_completed, 0);
    }
}
