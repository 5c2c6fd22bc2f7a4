//! Tool spec parsing — `mcp/<server>:<tool>` strings.

use agentmesh_core::error::GatewayError;

/// A parsed tool spec: which server owns the tool, and its bare name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub server: String,
    pub tool: String,
}

impl ToolSpec {
    /// Parse one spec. The `mcp/` prefix and a `:` separator are both
    /// required; anything else is rejected.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let rest = raw
            .strip_prefix("mcp/")
            .ok_or_else(|| GatewayError::BadToolSpec(raw.into()))?;
        let (server, tool) = rest
            .split_once(':')
            .ok_or_else(|| GatewayError::BadToolSpec(raw.into()))?;
        if server.is_empty() || tool.is_empty() {
            return Err(GatewayError::BadToolSpec(raw.into()));
        }
        Ok(Self {
            server: server.into(),
            tool: tool.into(),
        })
    }
}

/// Group tool specs by owning server.
///
/// Server order follows first appearance; tool order within a server
/// follows declaration order. Stored names drop the `mcp/` prefix and
/// the server qualifier.
pub fn group_tools(specs: &[String]) -> Result<Vec<(String, Vec<String>)>, GatewayError> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for raw in specs {
        let spec = ToolSpec::parse(raw)?;
        match groups.iter_mut().find(|(server, _)| *server == spec.server) {
            Some((_, tools)) => tools.push(spec.tool),
            None => groups.push((spec.server, vec![spec.tool])),
        }
    }
    Ok(groups)
}
