//! Remote peer protocol for AgentMesh.
//!
//! A remote agent is reached through three consumed interfaces: a
//! capability card at a well-known path, a streaming send, and a
//! non-streaming send. `ProxyNode` wraps all three behind the ordinary
//! `AgentNode` contract — streaming first, one fallback on failure,
//! soft errors — so a pipeline cannot tell a remote stage from a local
//! one.

pub mod chunk;
pub mod client;
pub mod proxy;
pub mod wire;

pub use chunk::{ChunkEnvelope, extract_final};
pub use client::RemoteClient;
pub use proxy::ProxyNode;
pub use wire::{AgentCapabilities, AgentDescriptor, SendRequest, WireMessage, WirePart};
