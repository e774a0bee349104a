//! Conversational memory lifecycle for the Sake-Sensei agent.
//!
//! The store has two tiers: short-term session events (one message batch
//! per event, append-only) and long-term semantic records derived from them
//! by the backend. This crate owns the lifecycle of both:
//!
//! - [`turn::TurnWriter`] durably records each user/assistant exchange,
//!   preserving turn ordering under partial failure;
//! - [`resolver::PreferenceResolver`] merges both tiers for a query,
//!   adapting to the capability set of the bound backend;
//! - [`sweep::LifecycleSweeper`] enumerates and deletes everything,
//!   paginated, idempotent, and resumable.
//!
//! All state of record lives behind the [`backend::MemoryBackend`] trait;
//! nothing in this crate caches across calls except the once-per-binding
//! capability probe.

pub mod backend;
pub mod capability;
pub mod context;
pub mod error;
pub mod resolver;
pub mod sweep;
pub mod turn;

pub use backend::{
    AgentCoreBackend, ConversationalMessage, Event, MemoryBackend, MemoryRecord, MessageRole,
    MockBackend, Page, RankingMode, SearchHit, SearchRequest,
};
pub use capability::{negotiate, BackendCapabilities, QueryShape};
pub use context::{MemoryContext, FACTS_LEAF, PREFERENCES_LEAF, ROOT_NAMESPACE};
pub use error::{MemoryError, Result};
pub use resolver::{PreferenceResolver, PreferenceResult, DEFAULT_TOP_K};
pub use sweep::{LifecycleSweeper, SweepError, SweepReport};
pub use turn::{TurnOutcome, TurnState, TurnWriter};
