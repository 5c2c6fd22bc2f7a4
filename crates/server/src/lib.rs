//! The served agent surface.
//!
//! A pipeline exposes itself over exactly the shapes its proxy nodes
//! consume from remote peers: the capability descriptor at the
//! well-known path, a non-streaming send, a streaming send over SSE,
//! plus session creation and a health probe. Two processes built from
//! this crate can therefore proxy each other freely.
//!
//! Streaming envelope discipline: partial progress goes out as a
//! status chunk a consuming proxy extracts nothing from; the final
//! chunk is `{"result":{"content": …}}`. An error event becomes a
//! final envelope whose content is the error message, so a remote
//! failure reads as an answer, not a dropped connection.
//!
//! Built on Axum for async HTTP.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use agentmesh_agents::Runner;
use agentmesh_core::event::AgentEvent;
use agentmesh_core::make_agent_id;
use agentmesh_core::session::Session;
use agentmesh_remote::wire::{AgentDescriptor, DESCRIPTOR_PATH, SendRequest};

/// Shared application state for the served surface.
pub struct ServerState {
    pub runner: Arc<Runner>,
    pub card: AgentDescriptor,
    /// User id the wire surface runs turns under (the agent's own id,
    /// as the original runtime does).
    pub user_id: String,
}

pub type SharedState = Arc<ServerState>;

impl ServerState {
    pub fn new(runner: Arc<Runner>, card: AgentDescriptor) -> SharedState {
        let user_id = make_agent_id(&card.name);
        Arc::new(Self {
            runner,
            card,
            user_id,
        })
    }
}

/// Build the Axum router with the full agent surface.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route(DESCRIPTOR_PATH, get(descriptor_handler))
        .route("/message/send", post(send_handler))
        .route("/message/stream", post(stream_handler))
        .route("/sessions", post(create_session_handler))
        .route("/health", get(health_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(
    state: SharedState,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, agent = %state.card.name, "Serving agent surface");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// `GET /.well-known/agent-descriptor` — the capability card.
async fn descriptor_handler(State(state): State<SharedState>) -> Json<AgentDescriptor> {
    Json(state.card.clone())
}

/// `GET /health` — liveness probe.
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// `POST /message/send` — one request, one final envelope.
async fn send_handler(
    State(state): State<SharedState>,
    Json(request): Json<SendRequest>,
) -> Json<serde_json::Value> {
    let (query, session_id) = request_parts(&request);
    info!(session = %session_id, "message/send");

    let events = state
        .runner
        .run_collect(&state.user_id, &session_id, &query)
        .await;

    let content = events
        .iter()
        .rev()
        .find(|e| e.is_terminal())
        .map(|e| e.content_text().to_string())
        .unwrap_or_default();

    Json(json!({ "result": { "content": content } }))
}

/// `POST /message/stream` — SSE chunk sequence, closed on completion.
async fn stream_handler(
    State(state): State<SharedState>,
    Json(request): Json<SendRequest>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let (query, session_id) = request_parts(&request);
    info!(session = %session_id, "message/stream");

    let rx = state.runner.run(&state.user_id, &session_id, &query).await;
    let stream = ReceiverStream::new(rx).map(|event| {
        let chunk = match &event {
            AgentEvent::Partial { content, .. } => {
                json!({ "status": "working", "updates": content })
            }
            AgentEvent::Final { content, .. } => {
                json!({ "result": { "content": content } })
            }
            AgentEvent::Error { message, .. } => {
                json!({ "result": { "content": message } })
            }
            AgentEvent::User { .. } => json!({ "status": "working" }),
        };
        Ok(SseEvent::default()
            .event(event.event_type())
            .data(chunk.to_string()))
    });

    Sse::new(stream)
}

/// The query text and session id of a send, defaulting to a fresh
/// session when the message carries no context.
fn request_parts(request: &SendRequest) -> (String, String) {
    let query = request
        .message
        .text_content()
        .unwrap_or_default()
        .to_string();
    let session_id = request
        .message
        .context_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    (query, session_id)
}

/// `POST /sessions` — create (or reset) a session.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub app: String,
    pub user_id: String,
    pub session_id: String,
}

async fn create_session_handler(
    State(state): State<SharedState>,
    Json(request): Json<CreateSessionRequest>,
) -> (StatusCode, Json<Session>) {
    let session = state
        .runner
        .sessions()
        .create(&request.app, &request.user_id, &request.session_id)
        .await;
    info!(app = %request.app, session = %request.session_id, "Session created");
    (StatusCode::CREATED, Json(session))
}
