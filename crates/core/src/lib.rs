//! # AgentMesh Core
//!
//! Domain types, traits, and error definitions for the AgentMesh
//! pipeline runtime. This crate has **zero framework dependencies** —
//! it defines the contracts that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The composition tree, the remote proxy engine, and the gateway
//! connector all live in their own crates and meet here: `AgentNode`
//! is the one invocation contract, `Provider` is the one generation
//! contract, and the session module owns the state store that threads
//! results between pipeline stages.

pub mod error;
pub mod event;
pub mod message;
pub mod node;
pub mod provider;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use error::{ConfigError, Error, GatewayError, ProviderError, RemoteError, Result};
pub use event::AgentEvent;
pub use message::{Message, MessageToolCall, Role};
pub use node::{AgentNode, InvocationContext, NO_INPUT_FOUND, make_agent_id};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition};
pub use session::{Session, SessionService, SharedSessions, StateStore, is_stage_output_key};
