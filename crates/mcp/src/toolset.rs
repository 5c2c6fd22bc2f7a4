//! Gateway toolsets — one per server group, independent lifecycles.
//!
//! The gateway speaks JSON-RPC 2.0 (`initialize`, `tools/list`,
//! `tools/call`) over one of two transports: HTTP POST for streaming
//! endpoints, or a persistent newline-delimited TCP connection for the
//! bridged stdio transport (the same wire a `socat STDIO TCP:…` helper
//! would carry, without the helper process).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use agentmesh_core::error::GatewayError;
use agentmesh_core::provider::ToolDefinition;

use crate::endpoint::{GatewayEndpoint, GatewayTransport, probe, resolve};
use crate::spec::group_tools;

const PROTOCOL_VERSION: &str = "2024-11-05";
const CLIENT_NAME: &str = "agentmesh";
const CLIENT_VERSION: &str = "1.0.0";

/// A tool as listed by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl GatewayTool {
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }
}

/// Bridged stdio transport: one persistent framed TCP connection.
struct BridgeIo {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

enum GatewayConn {
    Stream { http: reqwest::Client, url: String },
    Bridge { io: Mutex<BridgeIo> },
}

/// A JSON-RPC client bound to one gateway connection.
pub struct GatewayClient {
    conn: GatewayConn,
    next_id: AtomicU64,
}

impl GatewayClient {
    /// Open a connection and run the initialize handshake.
    pub async fn connect(endpoint: &GatewayEndpoint) -> Result<Self, GatewayError> {
        let conn = match endpoint.transport {
            GatewayTransport::Stream => {
                let url = endpoint
                    .url
                    .clone()
                    .ok_or_else(|| GatewayError::BadEndpoint("stream endpoint without URL".into()))?;
                let http = reqwest::Client::builder()
                    .timeout(Duration::from_secs(60))
                    .build()
                    .map_err(|e| GatewayError::Protocol(e.to_string()))?;
                GatewayConn::Stream { http, url }
            }
            GatewayTransport::StdioBridge => {
                let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
                    .await
                    .map_err(|e| GatewayError::Unreachable {
                        endpoint: endpoint.addr(),
                        reason: e.to_string(),
                    })?;
                let (read_half, write_half) = stream.into_split();
                GatewayConn::Bridge {
                    io: Mutex::new(BridgeIo {
                        reader: BufReader::new(read_half),
                        writer: write_half,
                    }),
                }
            }
        };

        let client = Self {
            conn,
            next_id: AtomicU64::new(1),
        };

        client
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": CLIENT_NAME, "version": CLIENT_VERSION },
                }),
            )
            .await?;
        client.notify("notifications/initialized").await?;

        Ok(client)
    }

    /// Issue one request and return its `result`.
    async fn request(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "Gateway request");

        match &self.conn {
            GatewayConn::Stream { http, url } => {
                let response = http
                    .post(url)
                    .json(&envelope)
                    .send()
                    .await
                    .map_err(|e| GatewayError::Protocol(e.to_string()))?;
                let status = response.status().as_u16();
                if status != 200 {
                    return Err(GatewayError::Protocol(format!(
                        "{method} returned status {status}"
                    )));
                }
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| GatewayError::Protocol(e.to_string()))?;
                unwrap_rpc(body)
            }
            GatewayConn::Bridge { io } => {
                let mut io = io.lock().await;
                let mut line = serde_json::to_string(&envelope)
                    .map_err(|e| GatewayError::Protocol(e.to_string()))?;
                line.push('\n');
                io.writer
                    .write_all(line.as_bytes())
                    .await
                    .map_err(|e| GatewayError::Protocol(e.to_string()))?;

                // Read until the response with our id; skip server
                // notifications and stray frames.
                loop {
                    let mut response_line = String::new();
                    let n = io
                        .reader
                        .read_line(&mut response_line)
                        .await
                        .map_err(|e| GatewayError::Protocol(e.to_string()))?;
                    if n == 0 {
                        return Err(GatewayError::Protocol("gateway closed the connection".into()));
                    }
                    let trimmed = response_line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let body: Value = match serde_json::from_str(trimmed) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if body.get("id").and_then(Value::as_u64) == Some(id) {
                        return unwrap_rpc(body);
                    }
                }
            }
        }
    }

    /// Send a notification (no id, no response expected).
    async fn notify(&self, method: &str) -> Result<(), GatewayError> {
        let envelope = json!({ "jsonrpc": "2.0", "method": method });
        match &self.conn {
            GatewayConn::Stream { http, url } => {
                http.post(url)
                    .json(&envelope)
                    .send()
                    .await
                    .map_err(|e| GatewayError::Protocol(e.to_string()))?;
            }
            GatewayConn::Bridge { io } => {
                let mut io = io.lock().await;
                let mut line = serde_json::to_string(&envelope)
                    .map_err(|e| GatewayError::Protocol(e.to_string()))?;
                line.push('\n');
                io.writer
                    .write_all(line.as_bytes())
                    .await
                    .map_err(|e| GatewayError::Protocol(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// `tools/list` — everything the gateway exposes.
    async fn list_tools(&self) -> Result<Vec<GatewayTool>, GatewayError> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| GatewayError::Protocol("tools/list result has no tools array".into()))?;

        Ok(tools
            .iter()
            .filter_map(|t| {
                let name = t.get("name")?.as_str()?.to_string();
                Some(GatewayTool {
                    name,
                    description: t
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    input_schema: t
                        .get("inputSchema")
                        .cloned()
                        .unwrap_or_else(|| json!({ "type": "object" })),
                })
            })
            .collect())
    }

    /// `tools/call` — run one tool, return its text output.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, GatewayError> {
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;

        let text: String = result
            .get("content")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return Err(GatewayError::CallFailed {
                tool: name.into(),
                reason: text,
            });
        }
        Ok(text)
    }
}

fn unwrap_rpc(body: Value) -> Result<Value, GatewayError> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| error.to_string());
        return Err(GatewayError::Protocol(message));
    }
    Ok(body.get("result").cloned().unwrap_or(Value::Null))
}

/// The tools of one server, behind one gateway connection.
pub struct Toolset {
    server: String,
    tools: Vec<GatewayTool>,
    client: GatewayClient,
}

impl Toolset {
    /// Connect and scope to `filter`, preserving declaration order.
    pub async fn connect(
        endpoint: &GatewayEndpoint,
        server: &str,
        filter: &[String],
    ) -> Result<Self, GatewayError> {
        let client = GatewayClient::connect(endpoint).await?;
        let listed = client.list_tools().await?;

        let mut tools = Vec::new();
        for want in filter {
            match listed.iter().find(|t| t.name == *want) {
                Some(tool) => tools.push(tool.clone()),
                None => warn!(server, tool = %want, "Gateway does not expose requested tool"),
            }
        }

        info!(server, tools = tools.len(), "Toolset connected");
        Ok(Self {
            server: server.into(),
            tools,
            client,
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    /// Definitions for the model request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(GatewayTool::to_definition).collect()
    }

    /// Invoke a tool in this set.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<String, GatewayError> {
        if !self.has_tool(name) {
            return Err(GatewayError::ToolNotFound(name.into()));
        }
        self.client.call_tool(name, arguments).await
    }
}

/// Resolve, probe, and build one toolset per server group.
///
/// This runs once, at agent construction: a bad spec or an unreachable
/// gateway stops startup before the agent accepts any request.
pub async fn connect_toolsets(
    endpoint_spec: &str,
    tool_specs: &[String],
    probe_timeout: Duration,
) -> Result<Vec<Toolset>, GatewayError> {
    let groups = group_tools(tool_specs)?;
    if groups.is_empty() {
        return Ok(Vec::new());
    }

    let endpoint = resolve(endpoint_spec)?;
    probe(&endpoint, probe_timeout).await?;

    let mut toolsets = Vec::with_capacity(groups.len());
    for (server, tools) in &groups {
        toolsets.push(Toolset::connect(&endpoint, server, tools).await?);
    }
    Ok(toolsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Serve a minimal line-delimited JSON-RPC gateway for one connection.
    async fn serve_bridge(listener: TcpListener) {
        // `connect_toolsets` opens two connections: a throwaway probe
        // followed by the real session. Keep accepting so both are served.
        loop {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            let request: Value = match serde_json::from_str(line.trim()) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let Some(id) = request.get("id").cloned() else {
                continue; // notification
            };
            let method = request["method"].as_str().unwrap_or_default();

            let result = match method {
                "initialize" => json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "serverInfo": { "name": "test-gateway", "version": "0.0.1" },
                }),
                "tools/list" => json!({
                    "tools": [
                        { "name": "search", "description": "Web search",
                          "inputSchema": { "type": "object" } },
                        { "name": "fetch", "description": "Fetch a URL",
                          "inputSchema": { "type": "object" } },
                    ]
                }),
                "tools/call" => {
                    let name = request["params"]["name"].as_str().unwrap_or_default();
                    json!({
                        "content": [
                            { "type": "text", "text": format!("{name} ran") }
                        ]
                    })
                }
                _ => json!({}),
            };

            let response = json!({ "jsonrpc": "2.0", "id": id, "result": result });
            let mut out = serde_json::to_string(&response).unwrap();
            out.push('\n');
            write_half.write_all(out.as_bytes()).await.unwrap();
        }
        }
    }

    #[tokio::test]
    async fn bridge_toolset_lists_and_calls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_bridge(listener));

        let toolsets = connect_toolsets(
            &format!("127.0.0.1:{port}"),
            &["mcp/duckduckgo:search".to_string()],
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(toolsets.len(), 1);
        let toolset = &toolsets[0];
        assert_eq!(toolset.server(), "duckduckgo");
        assert_eq!(toolset.tool_names(), vec!["search"]);

        let defs = toolset.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "search");

        let output = toolset
            .call("search", json!({ "query": "rust" }))
            .await
            .unwrap();
        assert_eq!(output, "search ran");
    }

    #[tokio::test]
    async fn toolset_rejects_unknown_tool() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_bridge(listener));

        let toolsets = connect_toolsets(
            &format!("127.0.0.1:{port}"),
            &["mcp/srv:search".to_string()],
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let err = toolsets[0].call("shell", json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn closed_port_prevents_toolset_construction() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect_toolsets(
            &format!("127.0.0.1:{port}"),
            &["mcp/srv:tool".to_string()],
            Duration::from_millis(500),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, GatewayError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn no_tools_means_no_connection() {
        // No endpoint resolution, no probe: an agent without tools
        // must not require a gateway at all.
        let toolsets = connect_toolsets("bad-spec", &[], Duration::from_millis(100))
            .await
            .unwrap();
        assert!(toolsets.is_empty());
    }

    #[tokio::test]
    async fn stream_transport_over_http() {
        use axum::{Json, Router, routing::post};

        async fn rpc(Json(request): Json<Value>) -> Json<Value> {
            let id = request.get("id").cloned().unwrap_or(Value::Null);
            let method = request["method"].as_str().unwrap_or_default();
            let result = match method {
                "initialize" => json!({ "protocolVersion": PROTOCOL_VERSION }),
                "tools/list" => json!({
                    "tools": [{ "name": "curl", "description": "HTTP fetch",
                                "inputSchema": { "type": "object" } }]
                }),
                "tools/call" => json!({
                    "content": [{ "type": "text", "text": "fetched" }]
                }),
                _ => json!({}),
            };
            Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
        }

        let app = Router::new().route("/", post(rpc));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let toolsets = connect_toolsets(
            &format!("http://127.0.0.1:{port}/"),
            &["mcp/curl:curl".to_string()],
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let output = toolsets[0].call("curl", json!({ "url": "x" })).await.unwrap();
        assert_eq!(output, "fetched");
    }

    #[tokio::test]
    async fn call_error_flag_surfaces_as_call_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    return;
                }
                let request: Value = match serde_json::from_str(line.trim()) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let Some(id) = request.get("id").cloned() else {
                    continue;
                };
                let result = match request["method"].as_str().unwrap_or_default() {
                    "tools/list" => json!({
                        "tools": [{ "name": "search", "inputSchema": { "type": "object" } }]
                    }),
                    "tools/call" => json!({
                        "content": [{ "type": "text", "text": "rate limited" }],
                        "isError": true,
                    }),
                    _ => json!({}),
                };
                let response = json!({ "jsonrpc": "2.0", "id": id, "result": result });
                let mut out = serde_json::to_string(&response).unwrap();
                out.push('\n');
                write_half.write_all(out.as_bytes()).await.unwrap();
            }
        });

        let endpoint = resolve(&format!("127.0.0.1:{port}")).unwrap();
        let toolset = Toolset::connect(&endpoint, "srv", &["search".to_string()])
            .await
            .unwrap();

        let err = toolset.call("search", json!({})).await.unwrap_err();
        match err {
            GatewayError::CallFailed { tool, reason } => {
                assert_eq!(tool, "search");
                assert_eq!(reason, "rate limited");
            }
            other => panic!("Expected CallFailed, got: {other:?}"),
        }
    }
}
