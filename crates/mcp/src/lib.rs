//! Tool-gateway connector for AgentMesh.
//!
//! Agents declare tools as `mcp/<server>:<tool>` strings; this crate
//! parses and groups them by owning server, resolves the configured
//! gateway endpoint into a transport, verifies the gateway is
//! reachable (fail fast at construction, not on first use), and builds
//! one toolset per server exposing `tools/list`/`tools/call`.

pub mod endpoint;
pub mod spec;
pub mod toolset;

pub use endpoint::{GatewayEndpoint, GatewayTransport, probe, resolve};
pub use spec::{ToolSpec, group_tools};
pub use toolset::{GatewayTool, Toolset, connect_toolsets};
