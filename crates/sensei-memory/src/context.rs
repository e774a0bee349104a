//! Explicit invocation context for memory operations.
//!
//! Every core call takes a `MemoryContext` rather than reading ambient
//! state; the agent loop resolves identity once per request and threads it
//! through.

use serde::{Deserialize, Serialize};

/// Namespace leaf holding distilled user preferences.
pub const PREFERENCES_LEAF: &str = "preferences";
/// Namespace leaf holding extracted semantic facts.
pub const FACTS_LEAF: &str = "facts";
/// Root namespace aggregating all long-term records.
pub const ROOT_NAMESPACE: &str = "/";

/// Identity under which a memory call executes: the store, the actor, and
/// the conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryContext {
    pub memory_id: String,
    pub actor_id: String,
    pub session_id: String,
}

impl MemoryContext {
    pub fn new(
        memory_id: impl Into<String>,
        actor_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            memory_id: memory_id.into(),
            actor_id: actor_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Context with the conventional per-actor default session id.
    pub fn for_actor(memory_id: impl Into<String>, actor_id: impl Into<String>) -> Self {
        let actor_id = actor_id.into();
        let session_id = format!("sake_session_{actor_id}");
        Self {
            memory_id: memory_id.into(),
            actor_id,
            session_id,
        }
    }

    /// Long-term namespace for a leaf under this actor, e.g.
    /// `/users/{actor_id}/preferences`.
    pub fn namespace(&self, leaf: &str) -> String {
        format!("/users/{}/{}", self.actor_id, leaf)
    }
}
