//! Gateway endpoint resolution and reachability probing.
//!
//! One configuration string selects the transport: `http://`/`https://`
//! values address the streaming transport by URL; anything else is
//! `host:port` for the stdio transport bridged over TCP. Before a
//! toolset is built the resolved address gets a bounded TCP probe so a
//! dead gateway fails startup instead of the first tool call.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

use agentmesh_core::error::GatewayError;

/// How the gateway is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayTransport {
    /// Streamable HTTP transport addressed by URL.
    Stream,
    /// Stdio transport tunneled over a TCP connection.
    StdioBridge,
}

/// A resolved gateway endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEndpoint {
    pub transport: GatewayTransport,
    pub host: String,
    pub port: u16,
    /// Set for the streaming transport only.
    pub url: Option<String>,
}

impl GatewayEndpoint {
    /// The probed TCP address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Resolve an endpoint spec into a transport and address.
pub fn resolve(spec: &str) -> Result<GatewayEndpoint, GatewayError> {
    if spec.starts_with("http://") || spec.starts_with("https://") {
        let url = reqwest::Url::parse(spec)
            .map_err(|e| GatewayError::BadEndpoint(format!("{spec}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| GatewayError::BadEndpoint(format!("{spec}: missing host")))?
            .to_string();
        let port = url.port().unwrap_or(80);
        return Ok(GatewayEndpoint {
            transport: GatewayTransport::Stream,
            host,
            port,
            url: Some(spec.to_string()),
        });
    }

    let (host, port_str) = spec
        .rsplit_once(':')
        .ok_or_else(|| GatewayError::BadEndpoint(spec.into()))?;
    if host.is_empty() {
        return Err(GatewayError::BadEndpoint(spec.into()));
    }
    let port: u16 = port_str
        .parse()
        .map_err(|_| GatewayError::BadEndpoint(format!("{spec}: bad port '{port_str}'")))?;

    Ok(GatewayEndpoint {
        transport: GatewayTransport::StdioBridge,
        host: host.into(),
        port,
        url: None,
    })
}

/// Fail fast if the gateway is unreachable.
pub async fn probe(endpoint: &GatewayEndpoint, timeout: Duration) -> Result<(), GatewayError> {
    let addr = endpoint.addr();
    debug!(endpoint = %addr, timeout_ms = timeout.as_millis() as u64, "Probing gateway");

    match tokio::time::timeout(timeout, TcpStream::connect((endpoint.host.as_str(), endpoint.port)))
        .await
    {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(GatewayError::Unreachable {
            endpoint: addr,
            reason: e.to_string(),
        }),
        Err(_) => Err(GatewayError::Unreachable {
            endpoint: addr,
            reason: format!("probe timed out after {}ms", timeout.as_millis()),
        }),
    }
}
