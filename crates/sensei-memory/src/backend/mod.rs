//! Memory backend contract and shared record types.
//!
//! The core subsystem depends on this trait only; concrete backends live in
//! submodules (`agentcore` for the HTTP data plane, `mock` for tests).

pub mod agentcore;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::BackendCapabilities;
use crate::context::MemoryContext;
use crate::error::Result;

pub use agentcore::AgentCoreBackend;
pub use mock::{MockBackend, MockOp};

/// Role of a message within a conversational event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One message inside an event payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationalMessage {
    pub role: MessageRole,
    pub text: String,
}

impl ConversationalMessage {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            text: text.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            text: text.into(),
        }
    }
}

/// One short-term memory item: a stored message batch within a session.
///
/// Events are append-only; the backend assigns `event_id` on write and the
/// sequence within a session follows write order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub actor_id: String,
    pub session_id: String,
    pub messages: Vec<ConversationalMessage>,
    pub created_at: DateTime<Utc>,
}

/// One long-term, namespace-scoped derived fact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub record_id: String,
    pub namespace: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One page of a paginated enumeration.
///
/// A `Some` next token means the enumeration is not finished, even when
/// `items` is empty.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// Ranked hit from either memory tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Ranking mode for backends that support it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    Relevance,
    Recency,
}

/// Search parameters after capability negotiation.
///
/// Optional fields the bound backend does not support are left `None` and
/// omitted from the wire call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub since: Option<DateTime<Utc>>,
    pub namespace: Option<String>,
    pub ranking: Option<RankingMode>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// Typed access to the two-tier memory store.
///
/// All operations are create/delete only; no event or record is ever
/// mutated after creation. Deletes are idempotent at the contract level:
/// implementations report an already-deleted item as `NotFound`, which
/// callers treat as success.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Probe the optional-parameter capability set of this backend.
    ///
    /// Backends that predate the probe answer `NotFound`; callers fall back
    /// to the minimal call shape.
    async fn describe_capabilities(&self) -> Result<BackendCapabilities>;

    async fn list_actors(&self, memory_id: &str, page_token: Option<&str>) -> Result<Page<String>>;

    async fn list_sessions(
        &self,
        memory_id: &str,
        actor_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<String>>;

    async fn list_events(
        &self,
        memory_id: &str,
        actor_id: &str,
        session_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<Event>>;

    /// Append one event carrying the given messages; returns the assigned
    /// event id. The normal persistence path writes one message per event;
    /// the combined recovery path writes both messages in a single event.
    async fn create_event(
        &self,
        ctx: &MemoryContext,
        messages: &[ConversationalMessage],
    ) -> Result<String>;

    async fn delete_event(
        &self,
        memory_id: &str,
        actor_id: &str,
        session_id: &str,
        event_id: &str,
    ) -> Result<()>;

    async fn list_records(
        &self,
        memory_id: &str,
        namespace: &str,
        page_token: Option<&str>,
    ) -> Result<Page<MemoryRecord>>;

    async fn delete_record(&self, memory_id: &str, record_id: &str) -> Result<()>;

    /// Session-scoped search over recent short-term events.
    async fn search_short_term(
        &self,
        ctx: &MemoryContext,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>>;

    /// Semantic search over long-term records for an actor.
    async fn search_long_term(
        &self,
        memory_id: &str,
        actor_id: &str,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>>;
}
