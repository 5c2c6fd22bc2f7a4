//! The composition-node contract.
//!
//! Every node in a pipeline — model-backed leaf, sequential container,
//! remote proxy — implements [`AgentNode`]: take the invocation
//! context, emit events into the turn's channel, return when done.
//! One invocation is one logical task; nodes suspend at their await
//! points but never spawn siblings.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::event::AgentEvent;
use crate::session::Session;

/// Sentinel passed through when a stage has no user message, no prior
/// stage output, and no recorded history to fall back on.
pub const NO_INPUT_FOUND: &str = "No input found";

/// Derive a stable identifier from a display name or URL by replacing
/// runs of non-word characters with `_`.
pub fn make_agent_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_alphanumeric() || c == '_' {
            id.push(c);
            in_run = false;
        } else if !in_run {
            id.push('_');
            in_run = true;
        }
    }
    id
}

/// Per-invocation context threaded through the composition tree.
///
/// Owns the session for the duration of the turn; the runner writes it
/// back when the root returns.
pub struct InvocationContext {
    /// The session being driven.
    pub session: Session,

    /// The user message that started this turn, if any.
    pub user_content: Option<String>,

    /// How many pipeline stages have completed so far this turn.
    /// Advanced by container nodes after each child.
    pub stages_completed: usize,
}

impl InvocationContext {
    pub fn new(session: Session, user_content: Option<String>) -> Self {
        Self {
            session,
            user_content,
            stages_completed: 0,
        }
    }

    /// Resolve the input for the node about to run.
    ///
    /// The first stage of a turn takes the explicit user message. Later
    /// stages read the most recent stage output from the state store;
    /// failing that, the original first user message from history;
    /// failing that, [`NO_INPUT_FOUND`].
    pub fn resolve_input(&self) -> String {
        if self.stages_completed == 0 {
            if let Some(user) = &self.user_content {
                return user.clone();
            }
        }
        if let Some(output) = self.session.state.last_stage_output() {
            return output.to_string();
        }
        if let Some(first) = self.session.first_user_message() {
            return first.to_string();
        }
        NO_INPUT_FOUND.to_string()
    }

    /// Emit an event: record it in the session history (partials are
    /// not history) and push it to the invocation's channel.
    ///
    /// A closed channel means the caller abandoned the turn; the error
    /// unwinds the tree so network iteration stops promptly. State
    /// writes made by completed stages stand.
    pub async fn emit(&mut self, tx: &mpsc::Sender<AgentEvent>, event: AgentEvent) -> Result<()> {
        if !matches!(event, AgentEvent::Partial { .. }) {
            self.session.events.push(event.clone());
        }
        tx.send(event)
            .await
            .map_err(|_| Error::Canceled("event receiver dropped".into()))
    }
}

/// A runnable node in the composition tree.
#[async_trait]
pub trait AgentNode: Send + Sync {
    /// Stable identifier of this node (also its event author tag).
    fn name(&self) -> &str;

    /// The state-store key this node publishes its result under, if it
    /// publishes one.
    fn output_key(&self) -> Option<&str> {
        None
    }

    /// Run one turn: read input from `ctx`, emit events into `tx`,
    /// write any final result into the state store.
    ///
    /// Runtime failures surface as `error` events, not `Err` — an `Err`
    /// here means the turn itself is over (caller gone).
    async fn invoke(
        &self,
        ctx: &mut InvocationContext,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<()>;
}
