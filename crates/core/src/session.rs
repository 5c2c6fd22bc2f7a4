//! Sessions and the shared pipeline state store.
//!
//! A session is the unit of isolation: one store instance, one event
//! history, no sharing across sessions. Within a session the store is
//! mutated by whichever node is currently running — never two at once —
//! so no locking happens below the session service.
//!
//! Sequential stages communicate through the store by convention: a
//! completing node writes its final text under its output key, and a
//! downstream stage with no explicit input scans for the most recent
//! stage-output key (see [`is_stage_output_key`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::event::AgentEvent;

/// Returns true if `key` addresses a stage output in the state store.
///
/// Two spellings count: the `_result`/`_output` suffix convention used
/// by local agents, and bare `http(s)://` URLs — the default output key
/// of a remote proxy node. Anything else is application data and is
/// skipped by input resolution.
pub fn is_stage_output_key(key: &str) -> bool {
    key.ends_with("_result")
        || key.ends_with("_output")
        || key.starts_with("http://")
        || key.starts_with("https://")
}

/// An insertion-ordered string-keyed store shared by all nodes of one
/// session.
///
/// Re-writing an existing key updates the value in place and keeps the
/// key's original position, so "reverse insertion order" means the
/// order keys first appeared.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StateStore {
    entries: Vec<(String, String)>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The most recently inserted stage output, if any.
    ///
    /// Scans keys in reverse insertion order and returns the value of
    /// the first one satisfying [`is_stage_output_key`].
    pub fn last_stage_output(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| is_stage_output_key(k))
            .map(|(_, v)| v.as_str())
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One conversation with one pipeline: state plus event history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Application (pipeline) this session belongs to.
    pub app: String,

    /// The user that owns the session.
    pub user_id: String,

    /// Caller-chosen session identifier.
    pub id: String,

    /// The shared state store.
    pub state: StateStore,

    /// Non-partial events, oldest first.
    pub events: Vec<AgentEvent>,

    /// When this session was created.
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(app: impl Into<String>, user_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            user_id: user_id.into(),
            id: id.into(),
            state: StateStore::new(),
            events: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// The first user message ever recorded in this session.
    pub fn first_user_message(&self) -> Option<&str> {
        self.events.iter().find_map(|e| match e {
            AgentEvent::User { content } => Some(content.as_str()),
            _ => None,
        })
    }
}

/// Key for looking up a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    app: String,
    user_id: String,
    id: String,
}

/// In-memory session service.
///
/// Sessions are checked out by value for the duration of an invocation
/// and written back when it completes; concurrent invocations of
/// different sessions never touch the same store.
#[derive(Default)]
pub struct SessionService {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl SessionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a session, if it exists.
    pub async fn get(&self, app: &str, user_id: &str, id: &str) -> Option<Session> {
        let key = SessionKey {
            app: app.into(),
            user_id: user_id.into(),
            id: id.into(),
        };
        self.sessions.read().await.get(&key).cloned()
    }

    /// Create a session with empty state, replacing any existing one.
    pub async fn create(&self, app: &str, user_id: &str, id: &str) -> Session {
        let session = Session::new(app, user_id, id);
        self.save(session.clone()).await;
        session
    }

    /// Fetch a session or create it with empty state.
    pub async fn get_or_create(&self, app: &str, user_id: &str, id: &str) -> Session {
        match self.get(app, user_id, id).await {
            Some(session) => session,
            None => self.create(app, user_id, id).await,
        }
    }

    /// Write a session back after an invocation.
    pub async fn save(&self, session: Session) {
        let key = SessionKey {
            app: session.app.clone(),
            user_id: session.user_id.clone(),
            id: session.id.clone(),
        };
        self.sessions.write().await.insert(key, session);
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Shared handle to a session service.
pub type SharedSessions = Arc<SessionService>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_output_key_predicate() {
        assert!(is_stage_output_key("researcher_result"));
        assert!(is_stage_output_key("draft_output"));
        assert!(is_stage_output_key("http://critic:9001"));
        assert!(is_stage_output_key("https://critic.example/"));
        assert!(!is_stage_output_key("scratchpad"));
        assert!(!is_stage_output_key("result_cache"));
    }

    #[test]
    fn store_preserves_insertion_order() {
        let mut store = StateStore::new();
        store.insert("a_result", "1");
        store.insert("b_result", "2");
        store.insert("a_result", "3"); // update keeps position
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["a_result", "b_result"]);
        assert_eq!(store.get("a_result"), Some("3"));
        assert_eq!(store.last_stage_output(), Some("2"));
    }

    #[test]
    fn last_stage_output_skips_plain_keys() {
        let mut store = StateStore::new();
        store.insert("researcher_result", "facts");
        store.insert("scratchpad", "noise");
        assert_eq!(store.last_stage_output(), Some("facts"));
    }

    #[test]
    fn url_keys_are_stage_outputs() {
        let mut store = StateStore::new();
        store.insert("http://critic:9001", "Hello");
        assert_eq!(store.last_stage_output(), Some("Hello"));
    }

    #[test]
    fn empty_store_has_no_output() {
        assert_eq!(StateStore::new().last_stage_output(), None);
    }

    #[test]
    fn session_first_user_message() {
        let mut session = Session::new("app", "user", "s1");
        assert!(session.first_user_message().is_none());
        session.events.push(AgentEvent::user("original question"));
        session.events.push(AgentEvent::finished("writer", "answer"));
        session.events.push(AgentEvent::user("follow-up"));
        assert_eq!(session.first_user_message(), Some("original question"));
    }

    #[tokio::test]
    async fn service_get_or_create() {
        let service = SessionService::new();
        assert!(service.get("app", "u", "s1").await.is_none());

        let created = service.get_or_create("app", "u", "s1").await;
        assert!(created.state.is_empty());

        let mut session = service.get_or_create("app", "u", "s1").await;
        session.state.insert("writer_result", "text");
        service.save(session).await;

        let reloaded = service.get("app", "u", "s1").await.unwrap();
        assert_eq!(reloaded.state.get("writer_result"), Some("text"));
        assert_eq!(service.count().await, 1);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let service = SessionService::new();
        let mut a = service.get_or_create("app", "u", "a").await;
        a.state.insert("x_result", "from-a");
        service.save(a).await;

        let b = service.get_or_create("app", "u", "b").await;
        assert!(b.state.is_empty());
    }
}
