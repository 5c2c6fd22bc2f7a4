//! Chunk extraction — normalizing heterogeneous response envelopes.
//!
//! Remote agents wrap text in half a dozen envelope shapes. Instead of
//! probing attributes ad hoc, every chunk deserializes into one
//! [`ChunkEnvelope`] and a single total function walks the documented
//! priority order. A chunk matching no shape contributes an empty
//! string — never an error.

use serde::Deserialize;
use serde_json::Value;

/// A streaming chunk in any of the known producer shapes.
///
/// Extraction priority:
/// 1. `result.artifact.parts[].text`
/// 2. `result.content`
/// 3. `result.message.content`
/// 4. `result.text`
/// 5. `content`
/// 6. `text`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkEnvelope {
    #[serde(default)]
    pub result: Option<ChunkResult>,

    #[serde(default)]
    pub content: Option<Value>,

    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkResult {
    #[serde(default)]
    pub artifact: Option<ChunkArtifact>,

    #[serde(default)]
    pub content: Option<Value>,

    #[serde(default)]
    pub message: Option<ChunkMessage>,

    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkArtifact {
    #[serde(default)]
    pub parts: Vec<ChunkPart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkPart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub content: Option<Value>,
}

/// Text from a value that may be a string or a structured payload.
/// Structured payloads (the occasional function-response object) are
/// JSON-stringified; null and empty strings yield nothing.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl ChunkEnvelope {
    /// Parse a raw chunk body; anything unparseable is an empty envelope.
    pub fn from_json(data: &str) -> Self {
        serde_json::from_str(data).unwrap_or_default()
    }

    /// Extract this chunk's text by the documented priority order.
    /// The first shape yielding a non-empty string wins; no match is
    /// an empty string.
    pub fn extract_text(&self) -> String {
        if let Some(result) = &self.result {
            if let Some(artifact) = &result.artifact {
                for part in &artifact.parts {
                    if let Some(text) = &part.text {
                        if !text.is_empty() {
                            return text.clone();
                        }
                    }
                }
            }
            if let Some(text) = result.content.as_ref().and_then(value_text) {
                return text;
            }
            if let Some(message) = &result.message {
                if let Some(text) = message.content.as_ref().and_then(value_text) {
                    return text;
                }
            }
            if let Some(text) = &result.text {
                if !text.is_empty() {
                    return text.clone();
                }
            }
        }
        if let Some(text) = self.content.as_ref().and_then(value_text) {
            return text;
        }
        if let Some(text) = &self.text {
            if !text.is_empty() {
                return text.clone();
            }
        }
        String::new()
    }
}

/// Unwrap a single non-streaming response: `result.content`, then
/// `result.message.content`, then the stringified `result`, then the
/// stringified response.
pub fn extract_final(response: &Value) -> String {
    match response.get("result") {
        Some(result) if !result.is_null() => {
            if let Some(text) = result.get("content").and_then(value_text) {
                return text;
            }
            if let Some(text) = result
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(value_text)
            {
                return text;
            }
            stringify(result)
        }
        _ => stringify(response),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
