//! Remote agent client — card discovery, streaming send, single send.
//!
//! Construction never fails: a card that cannot be fetched or parsed
//! degrades the client to URL-only operation, which is enough to send.
//! Both send paths return `Result<String, RemoteError>` so the caller
//! composes the fallback as plain value flow.

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use agentmesh_core::error::RemoteError;

use crate::chunk::{ChunkEnvelope, extract_final};
use crate::wire::{AgentDescriptor, DESCRIPTOR_PATH, SendRequest};

/// Client bound to one remote agent URL for the node's lifetime.
pub struct RemoteClient {
    http: reqwest::Client,
    url: String,
    card: Option<AgentDescriptor>,
}

impl RemoteClient {
    /// Connect to a remote agent: fetch its capability card, degrading
    /// to a URL-only client on any failure.
    pub async fn connect(url: &str) -> Self {
        let url = url.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        let card = match Self::fetch_card(&http, &url).await {
            Ok(mut card) => {
                // The card's self-reported URL may be a bind address;
                // the configured URL is the one that reached it.
                card.url = url.clone();
                debug!(url = %url, name = %card.name, "Fetched remote agent card");
                Some(card)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Card fetch failed, using URL-only client");
                None
            }
        };

        Self { http, url, card }
    }

    async fn fetch_card(http: &reqwest::Client, url: &str) -> Result<AgentDescriptor, RemoteError> {
        let response = http
            .get(format!("{url}{DESCRIPTOR_PATH}"))
            .send()
            .await
            .map_err(|e| RemoteError::Protocol {
                url: url.into(),
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(RemoteError::Protocol {
                url: url.into(),
                reason: format!("descriptor returned status {}", response.status().as_u16()),
            });
        }
        response.json().await.map_err(|e| RemoteError::Protocol {
            url: url.into(),
            reason: e.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn card(&self) -> Option<&AgentDescriptor> {
        self.card.as_ref()
    }

    /// Skill id to stamp on sends, when the card advertises one.
    pub fn default_skill(&self) -> Option<String> {
        self.card.as_ref().and_then(AgentDescriptor::first_skill_id)
    }

    /// Streaming send: consume the SSE chunk sequence, extract each
    /// chunk by the priority policy, concatenate in arrival order.
    ///
    /// Any failure establishing or consuming the stream — including an
    /// error frame before the first content chunk — is an `Err`, which
    /// the proxy turns into exactly one non-streaming fallback.
    pub async fn send_streaming(&self, request: &SendRequest) -> Result<String, RemoteError> {
        let stream_err = |reason: String| RemoteError::Stream {
            url: self.url.clone(),
            reason,
        };

        let response = self
            .http
            .post(format!("{}/message/stream", self.url))
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| stream_err(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(stream_err(format!("stream returned status {status}")));
        }

        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut accumulated = String::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes = chunk_result.map_err(|e| stream_err(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim_end_matches('\r').to_string();
                buffer = buffer[line_end + 1..].to_string();

                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    return Ok(accumulated);
                }

                // An explicit error frame aborts the streaming path,
                // even before any content arrived.
                if let Ok(value) = serde_json::from_str::<Value>(data) {
                    if let Some(error) = value.get("error") {
                        return Err(stream_err(format!("remote error frame: {error}")));
                    }
                }

                accumulated.push_str(&ChunkEnvelope::from_json(data).extract_text());
            }
        }

        Ok(accumulated)
    }

    /// Non-streaming send: one request, one JSON object back.
    pub async fn send(&self, request: &SendRequest) -> Result<String, RemoteError> {
        let send_err = |reason: String| RemoteError::Send {
            url: self.url.clone(),
            reason,
        };

        let response = self
            .http
            .post(format!("{}/message/send", self.url))
            .json(request)
            .send()
            .await
            .map_err(|e| send_err(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(send_err(format!("send returned status {status}")));
        }

        let body: Value = response.json().await.map_err(|e| send_err(e.to_string()))?;
        Ok(extract_final(&body))
    }
}
