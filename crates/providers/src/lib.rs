//! Model provider implementations for AgentMesh.
//!
//! All providers implement the `agentmesh_core::Provider` trait.
//! `resolve_model` turns a declarative model spec into the provider
//! instance a leaf agent talks to.

pub mod openai_compat;
pub mod resolve;

pub use openai_compat::OpenAiCompatProvider;
pub use resolve::resolve_model;
