//! Turn persistence: durably record one user/assistant exchange.
//!
//! A turn is saved as two independent short-term events, user first. The
//! assistant write is never attempted before the user write (including its
//! retry) has fully resolved, so conversational causality in the event
//! sequence cannot invert. If the per-message path is degraded, a single
//! combined write recovers both messages in one event; failing that, both
//! payloads are handed back to the caller for out-of-band recovery.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{ConversationalMessage, MemoryBackend};
use crate::context::MemoryContext;
use crate::error::{MemoryError, Result};

/// Persistence state of a turn save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Pending,
    UserSaved,
    AssistantSaved,
    Committed,
    UserSaveFailed,
    AssistantSaveFailed,
    Failed,
}

/// Outcome of [`TurnWriter::persist_turn`].
///
/// A turn is never committed with only one of the two messages silently
/// dropped: either both are durable, or the failure is explicit and the
/// unsaved payloads are returned.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Both messages written as independent events, user first.
    Committed {
        user_event_id: String,
        assistant_event_id: String,
    },
    /// The per-message path failed; both messages landed in one combined
    /// event.
    Recovered { event_id: String },
    /// The user event is durable but the assistant write failed; the
    /// assistant payload is returned for the caller to buffer or surface.
    AssistantSaveFailed {
        user_event_id: String,
        assistant_message: String,
        error: MemoryError,
    },
    /// Nothing was written. Both payloads are returned for out-of-band
    /// recovery; the caller decides whether to surface a user-visible
    /// error.
    Failed {
        user_message: String,
        assistant_message: String,
        error: MemoryError,
    },
}

impl TurnOutcome {
    /// Terminal state reached by this outcome.
    pub fn state(&self) -> TurnState {
        match self {
            TurnOutcome::Committed { .. } => TurnState::Committed,
            TurnOutcome::Recovered { .. } => TurnState::UserSaveFailed,
            TurnOutcome::AssistantSaveFailed { .. } => TurnState::AssistantSaveFailed,
            TurnOutcome::Failed { .. } => TurnState::Failed,
        }
    }

    /// Whether both messages ended up durable in the store.
    pub fn is_durable(&self) -> bool {
        matches!(
            self,
            TurnOutcome::Committed { .. } | TurnOutcome::Recovered { .. }
        )
    }
}

/// Saves conversational turns into the short-term store.
pub struct TurnWriter {
    backend: Arc<dyn MemoryBackend>,
}

impl TurnWriter {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    /// Persist one exchange as two events, user strictly first.
    ///
    /// `PermissionDenied` aborts immediately as a hard error; every other
    /// failure resolves to an explicit [`TurnOutcome`].
    pub async fn persist_turn(
        &self,
        ctx: &MemoryContext,
        user_message: &str,
        assistant_message: &str,
    ) -> Result<TurnOutcome> {
        let user = ConversationalMessage::user(user_message);
        let assistant = ConversationalMessage::assistant(assistant_message);

        // User event first; the assistant attempt must not start before
        // this attempt (and its retry) has terminally resolved.
        let user_error = match self.write_with_retry(ctx, &[user.clone()], "user").await {
            Ok(user_event_id) => {
                debug!(event_id = %user_event_id, "user event saved");
                match self
                    .write_with_retry(ctx, &[assistant.clone()], "assistant")
                    .await
                {
                    Ok(assistant_event_id) => {
                        return Ok(TurnOutcome::Committed {
                            user_event_id,
                            assistant_event_id,
                        });
                    }
                    Err(error) if matches!(error, MemoryError::PermissionDenied(_)) => {
                        return Err(error);
                    }
                    Err(error) => {
                        warn!(%error, "assistant event write failed after retry");
                        return Ok(TurnOutcome::AssistantSaveFailed {
                            user_event_id,
                            assistant_message: assistant.text,
                            error,
                        });
                    }
                }
            }
            Err(error) if matches!(error, MemoryError::PermissionDenied(_)) => return Err(error),
            Err(error) => error,
        };

        // Per-message writes are degraded; attempt both messages as a
        // single combined event, exactly once.
        warn!(%user_error, "user event write failed after retry, attempting combined write");
        match self.backend.create_event(ctx, &[user, assistant]).await {
            Ok(event_id) => {
                debug!(%event_id, "turn recovered via combined write");
                Ok(TurnOutcome::Recovered { event_id })
            }
            Err(error) if matches!(error, MemoryError::PermissionDenied(_)) => Err(error),
            Err(error) => {
                warn!(%error, "combined write failed, returning payloads to caller");
                Ok(TurnOutcome::Failed {
                    user_message: user_message.to_string(),
                    assistant_message: assistant_message.to_string(),
                    error,
                })
            }
        }
    }

    /// One write attempt plus a single retry on retryable failures.
    async fn write_with_retry(
        &self,
        ctx: &MemoryContext,
        messages: &[ConversationalMessage],
        label: &str,
    ) -> Result<String> {
        match self.backend.create_event(ctx, messages).await {
            Ok(event_id) => Ok(event_id),
            Err(error) if error.is_retryable() => {
                debug!(%error, label, "event write failed, retrying once");
                self.backend.create_event(ctx, messages).await
            }
            Err(error) => Err(error),
        }
    }
}
