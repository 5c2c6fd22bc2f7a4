//! Wire shapes shared by the consumed and produced surfaces.
//!
//! One process's pipeline serves exactly the shapes its proxy nodes
//! consume, so composition nodes of one process can act as remote
//! peers of another.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known path a remote agent publishes its capability card under.
pub const DESCRIPTOR_PATH: &str = "/.well-known/agent-descriptor";

/// Content modes every agent here supports.
pub const SUPPORTED_CONTENT_TYPES: [&str; 2] = ["text", "text/plain"];

/// The capability card a remote agent publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub url: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub capabilities: AgentCapabilities,

    #[serde(default)]
    pub skills: Vec<serde_json::Value>,

    #[serde(default, rename = "defaultInputModes")]
    pub default_input_modes: Vec<String>,

    #[serde(default, rename = "defaultOutputModes")]
    pub default_output_modes: Vec<String>,
}

fn default_version() -> String {
    "1.0.0".into()
}

/// What the remote side can do.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCapabilities {
    #[serde(default)]
    pub streaming: bool,
}

impl AgentDescriptor {
    /// A card for an agent served at `url`.
    pub fn new(name: impl Into<String>, description: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
            version: default_version(),
            capabilities: AgentCapabilities { streaming: true },
            skills: Vec::new(),
            default_input_modes: SUPPORTED_CONTENT_TYPES.map(String::from).to_vec(),
            default_output_modes: SUPPORTED_CONTENT_TYPES.map(String::from).to_vec(),
        }
    }

    /// The id of the first advertised skill, if any.
    pub fn first_skill_id(&self) -> Option<String> {
        self.skills
            .first()
            .and_then(|s| s.get("id"))
            .and_then(|id| id.as_str())
            .map(String::from)
    }
}

/// Payload of a (streaming or single) send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub message: WireMessage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
}

impl SendRequest {
    /// A user text message with a fresh message id.
    pub fn text(text: impl Into<String>, skill: Option<String>) -> Self {
        Self {
            message: WireMessage {
                role: "user".into(),
                parts: vec![WirePart {
                    kind: "text".into(),
                    text: text.into(),
                }],
                message_id: Uuid::new_v4().to_string(),
                kind: "message".into(),
                context_id: None,
            },
            skill,
        }
    }
}

/// The message envelope inside a send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,

    pub parts: Vec<WirePart>,

    #[serde(rename = "messageId")]
    pub message_id: String,

    pub kind: String,

    /// Optional session handle; absent means a fresh one per turn.
    #[serde(default, rename = "contextId", skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl WireMessage {
    /// The first text part, if any.
    pub fn text_content(&self) -> Option<&str> {
        self.parts
            .iter()
            .find(|p| p.kind == "text")
            .map(|p| p.text.as_str())
    }
}

/// One content part of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePart {
    pub kind: String,
    pub text: String,
}
