//! Invocation events — the output stream of a composition node.
//!
//! Every node's `invoke` emits a lazy sequence of these over an mpsc
//! channel: zero or more `partial` events followed by one terminal
//! `final` or `error` event per completing node. The server forwards
//! them to clients over SSE; the session records the non-partial ones
//! as conversation history.

use serde::{Deserialize, Serialize};

/// An event emitted by an agent node during one invocation.
///
/// - `user`    — the query that started the turn (recorded in history)
/// - `partial` — an incremental text delta from a streaming model
/// - `final`   — a node's complete textual result
/// - `error`   — a node failed softly; the message is user-visible
///   content and the pipeline keeps going
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The user message that started this invocation.
    User { content: String },

    /// Partial text from a node that streams.
    Partial { author: String, content: String },

    /// A node's final result.
    Final { author: String, content: String },

    /// A node failed; the invocation completes with this as content.
    Error { author: String, message: String },
}

impl AgentEvent {
    /// The user message event for a new turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// A partial delta from `author`.
    pub fn partial(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Partial {
            author: author.into(),
            content: content.into(),
        }
    }

    /// The final result of `author`.
    pub fn finished(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Final {
            author: author.into(),
            content: content.into(),
        }
    }

    /// A soft failure of `author`.
    pub fn error(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            author: author.into(),
            message: message.into(),
        }
    }

    /// Whether this event completes its node's turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final { .. } | Self::Error { .. })
    }

    /// The textual content carried by this event.
    ///
    /// For `error` events this is the failure message — errors surface
    /// as ordinary content, not as crashes.
    pub fn content_text(&self) -> &str {
        match self {
            Self::User { content }
            | Self::Partial { author: _, content }
            | Self::Final { author: _, content } => content,
            Self::Error { author: _, message } => message,
        }
    }

    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Partial { .. } => "partial",
            Self::Final { .. } => "final",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_event_is_terminal() {
        assert!(AgentEvent::finished("writer", "done").is_terminal());
        assert!(AgentEvent::error("writer", "boom").is_terminal());
        assert!(!AgentEvent::partial("writer", "do").is_terminal());
        assert!(!AgentEvent::user("hi").is_terminal());
    }

    #[test]
    fn error_message_is_content() {
        let event = AgentEvent::error("critic", "connection reset");
        assert_eq!(event.content_text(), "connection reset");
    }

    #[test]
    fn event_serialization_tags() {
        let event = AgentEvent::finished("writer", "Hello");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"final""#));
        assert!(json.contains(r#""author":"writer""#));

        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn event_type_names() {
        assert_eq!(AgentEvent::user("x").event_type(), "user");
        assert_eq!(AgentEvent::partial("a", "x").event_type(), "partial");
        assert_eq!(AgentEvent::finished("a", "x").event_type(), "final");
        assert_eq!(AgentEvent::error("a", "x").event_type(), "error");
    }
}
