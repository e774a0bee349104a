//! Lifecycle sweep: enumerate and delete everything in the store.
//!
//! Two independent passes: the short-term pass walks Actor → Session →
//! Event, the long-term pass walks records under the root namespace. Every
//! enumeration follows the continuation token to exhaustion, deletes are
//! idempotent, and per-item failures are recorded rather than aborting the
//! run, so a sweep is safely re-runnable and converges.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{MemoryBackend, Page};
use crate::context::ROOT_NAMESPACE;
use crate::error::{MemoryError, Result};

/// One recorded per-item failure during a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepError {
    /// What was being enumerated or deleted, e.g. `event evt-7`.
    pub item: String,
    pub message: String,
}

/// Accumulated result of a sweep run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub actors_processed: usize,
    pub sessions_processed: usize,
    pub events_deleted: usize,
    pub records_deleted: usize,
    pub errors: Vec<SweepError>,
}

impl SweepReport {
    fn record_error(&mut self, item: impl Into<String>, error: &MemoryError) {
        let item = item.into();
        warn!(%item, %error, "sweep item failed");
        self.errors.push(SweepError {
            item,
            message: error.to_string(),
        });
    }
}

/// Enumerates and deletes all short-term events and long-term records.
pub struct LifecycleSweeper {
    backend: Arc<dyn MemoryBackend>,
}

impl LifecycleSweeper {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    /// Run both passes, accumulating into the caller's report.
    ///
    /// `PermissionDenied` or an unreachable backend on an opening list call
    /// is the only hard failure; everything else is recorded in the report
    /// and the sweep keeps going. The report is valid even when an error is
    /// returned: progress made before the failure stays counted, so the
    /// caller can still render a partial summary.
    pub async fn sweep_all(&self, memory_id: &str, report: &mut SweepReport) -> Result<()> {
        self.sweep_short_term(memory_id, report).await?;
        self.sweep_long_term(memory_id, report).await?;
        info!(
            actors = report.actors_processed,
            sessions = report.sessions_processed,
            events = report.events_deleted,
            records = report.records_deleted,
            errors = report.errors.len(),
            "sweep finished"
        );
        Ok(())
    }

    /// Short-term pass: Actor → Session → Event, delete each event.
    pub async fn sweep_short_term(&self, memory_id: &str, report: &mut SweepReport) -> Result<()> {
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_with_retry(
                    || self.backend.list_actors(memory_id, page_token.as_deref()),
                    "actors",
                    page_token.is_none(),
                    report,
                )
                .await?;
            let Some(page) = page else { break };

            for actor_id in &page.items {
                self.sweep_actor(memory_id, actor_id, report).await?;
                report.actors_processed += 1;
            }

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(())
    }

    async fn sweep_actor(
        &self,
        memory_id: &str,
        actor_id: &str,
        report: &mut SweepReport,
    ) -> Result<()> {
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_with_retry(
                    || {
                        self.backend
                            .list_sessions(memory_id, actor_id, page_token.as_deref())
                    },
                    &format!("sessions of {actor_id}"),
                    false,
                    report,
                )
                .await?;
            let Some(page) = page else { break };

            for session_id in &page.items {
                self.sweep_session(memory_id, actor_id, session_id, report)
                    .await?;
                report.sessions_processed += 1;
            }

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(())
    }

    async fn sweep_session(
        &self,
        memory_id: &str,
        actor_id: &str,
        session_id: &str,
        report: &mut SweepReport,
    ) -> Result<()> {
        info!(actor_id, session_id, "sweeping session");
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_with_retry(
                    || {
                        self.backend
                            .list_events(memory_id, actor_id, session_id, page_token.as_deref())
                    },
                    &format!("events of {session_id}"),
                    false,
                    report,
                )
                .await?;
            let Some(page) = page else { break };

            // Deletes only start once this page is fully received.
            for event in &page.items {
                match self
                    .delete_with_retry(|| {
                        self.backend
                            .delete_event(memory_id, actor_id, session_id, &event.event_id)
                    })
                    .await
                {
                    Ok(()) => report.events_deleted += 1,
                    Err(error) if error.is_not_found() => {
                        debug!(event_id = %event.event_id, "event already gone");
                    }
                    Err(error @ MemoryError::PermissionDenied(_)) => return Err(error),
                    Err(error) => {
                        report.record_error(format!("event {}", event.event_id), &error);
                    }
                }
            }

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(())
    }

    /// Long-term pass: delete every record under the root namespace.
    pub async fn sweep_long_term(&self, memory_id: &str, report: &mut SweepReport) -> Result<()> {
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_with_retry(
                    || {
                        self.backend
                            .list_records(memory_id, ROOT_NAMESPACE, page_token.as_deref())
                    },
                    "records",
                    page_token.is_none(),
                    report,
                )
                .await?;
            let Some(page) = page else { break };

            for record in &page.items {
                match self
                    .delete_with_retry(|| self.backend.delete_record(memory_id, &record.record_id))
                    .await
                {
                    Ok(()) => report.records_deleted += 1,
                    Err(error) if error.is_not_found() => {
                        debug!(record_id = %record.record_id, "record already gone");
                    }
                    Err(error @ MemoryError::PermissionDenied(_)) => return Err(error),
                    Err(error) => {
                        report.record_error(format!("record {}", record.record_id), &error);
                    }
                }
            }

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(())
    }

    /// Fetch one enumeration page with a single retry on retryable
    /// failures.
    ///
    /// An opening call that still fails is a hard error (the backend is
    /// unreachable or access is denied); a mid-run failure is recorded and
    /// `None` abandons the enclosing scope so the sweep can keep making
    /// progress elsewhere.
    async fn list_with_retry<T, F, Fut>(
        &self,
        mut fetch: F,
        scope: &str,
        opening: bool,
        report: &mut SweepReport,
    ) -> Result<Option<Page<T>>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
    {
        let error = match fetch().await {
            Ok(page) => return Ok(Some(page)),
            Err(error) if error.is_retryable() => {
                debug!(scope, %error, "page fetch failed, retrying once");
                match fetch().await {
                    Ok(page) => return Ok(Some(page)),
                    Err(error) => error,
                }
            }
            Err(error) => error,
        };

        if opening || matches!(error, MemoryError::PermissionDenied(_)) {
            return Err(error);
        }
        report.record_error(format!("list {scope}"), &error);
        Ok(None)
    }

    /// One delete attempt plus a single retry on retryable failures.
    async fn delete_with_retry<F, Fut>(&self, mut delete: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        match delete().await {
            Ok(()) => Ok(()),
            Err(error) if error.is_retryable() => {
                debug!(%error, "delete failed, retrying once");
                delete().await
            }
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ConversationalMessage, MockBackend, MockOp};

    fn transient() -> MemoryError {
        MemoryError::Transient("backend unavailable".to_string())
    }

    fn seed_session(backend: &MockBackend, actor: &str, session: &str, events: usize) {
        for i in 0..events {
            backend.seed_event(
                actor,
                session,
                vec![ConversationalMessage::user(format!("message {i}"))],
            );
        }
    }

    #[tokio::test]
    async fn test_sweep_deletes_both_tiers() {
        let backend = Arc::new(MockBackend::new());
        seed_session(&backend, "alice", "s-1", 3);
        seed_session(&backend, "bob", "s-2", 2);
        backend.seed_record("/users/alice/preferences", "likes junmai");
        backend.seed_record("/users/bob/facts", "allergic to nothing");

        let sweeper = LifecycleSweeper::new(backend.clone());
        let mut report = SweepReport::default();
        sweeper.sweep_all("mem-1", &mut report).await.unwrap();

        assert_eq!(report.actors_processed, 2);
        assert_eq!(report.sessions_processed, 2);
        assert_eq!(report.events_deleted, 5);
        assert_eq!(report.records_deleted, 2);
        assert!(report.errors.is_empty());
        assert_eq!(backend.event_count(), 0);
        assert_eq!(backend.record_count(), 0);
    }

    #[tokio::test]
    async fn test_pagination_completeness() {
        let backend = Arc::new(MockBackend::new().with_page_size(100));
        seed_session(&backend, "alice", "s-1", 150);

        let sweeper = LifecycleSweeper::new(backend.clone());
        let mut report = SweepReport::default();
        sweeper.sweep_all("mem-1", &mut report).await.unwrap();

        assert_eq!(report.events_deleted, 150);
        assert!(backend.call_count(MockOp::ListEvents) >= 2);
        assert_eq!(backend.event_count(), 0);
    }

    #[tokio::test]
    async fn test_second_run_deletes_nothing() {
        let backend = Arc::new(MockBackend::new());
        seed_session(&backend, "alice", "s-1", 4);
        backend.seed_record("/users/alice/preferences", "likes junmai");

        let sweeper = LifecycleSweeper::new(backend.clone());
        let mut first = SweepReport::default();
        sweeper.sweep_all("mem-1", &mut first).await.unwrap();
        assert_eq!(first.events_deleted, 4);
        assert_eq!(first.records_deleted, 1);

        let mut second = SweepReport::default();
        sweeper.sweep_all("mem-1", &mut second).await.unwrap();
        assert_eq!(second.events_deleted, 0);
        assert_eq!(second.records_deleted, 0);
        assert!(second.errors.is_empty());
    }

    #[tokio::test]
    async fn test_not_found_delete_is_not_an_error() {
        let backend = Arc::new(MockBackend::new());
        seed_session(&backend, "alice", "s-1", 2);
        backend.fail_next(
            MockOp::DeleteEvent,
            MemoryError::NotFound("event evt-0".to_string()),
        );

        let sweeper = LifecycleSweeper::new(backend.clone());
        let mut report = SweepReport::default();
        sweeper.sweep_all("mem-1", &mut report).await.unwrap();

        assert!(report.errors.is_empty());
        // One delete was answered NotFound, the other succeeded.
        assert_eq!(report.events_deleted, 1);
    }

    #[tokio::test]
    async fn test_persistent_delete_failure_is_counted_not_fatal() {
        let backend = Arc::new(MockBackend::new());
        seed_session(&backend, "alice", "s-1", 3);
        // Attempt and retry for the first event both fail.
        backend.fail_call(MockOp::DeleteEvent, 1, transient());
        backend.fail_call(MockOp::DeleteEvent, 2, transient());

        let sweeper = LifecycleSweeper::new(backend.clone());
        let mut report = SweepReport::default();
        sweeper.sweep_all("mem-1", &mut report).await.unwrap();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.events_deleted, 2);
    }

    #[tokio::test]
    async fn test_transient_delete_retried_once() {
        let backend = Arc::new(MockBackend::new());
        seed_session(&backend, "alice", "s-1", 1);
        backend.fail_call(MockOp::DeleteEvent, 1, transient());

        let sweeper = LifecycleSweeper::new(backend.clone());
        let mut report = SweepReport::default();
        sweeper.sweep_all("mem-1", &mut report).await.unwrap();

        assert!(report.errors.is_empty());
        assert_eq!(report.events_deleted, 1);
        assert_eq!(backend.call_count(MockOp::DeleteEvent), 2);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_hard_failure() {
        let backend = Arc::new(MockBackend::new());
        // Opening list call and its retry both fail.
        backend.fail_next(MockOp::ListActors, transient());
        backend.fail_next(MockOp::ListActors, transient());

        let sweeper = LifecycleSweeper::new(backend);
        let mut report = SweepReport::default();
        let result = sweeper.sweep_all("mem-1", &mut report).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_permission_denied_aborts() {
        let backend = Arc::new(MockBackend::new());
        seed_session(&backend, "alice", "s-1", 1);
        backend.fail_next(
            MockOp::DeleteEvent,
            MemoryError::PermissionDenied("denied".to_string()),
        );

        let sweeper = LifecycleSweeper::new(backend);
        let mut report = SweepReport::default();
        let result = sweeper.sweep_all("mem-1", &mut report).await;
        assert!(matches!(result, Err(MemoryError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_partial_progress_survives_late_hard_failure() {
        let backend = Arc::new(MockBackend::new());
        seed_session(&backend, "alice", "s-1", 2);
        // Long-term opening call and its retry fail after the short-term
        // pass has already deleted everything.
        backend.fail_next(MockOp::ListRecords, transient());
        backend.fail_next(MockOp::ListRecords, transient());

        let sweeper = LifecycleSweeper::new(backend);
        let mut report = SweepReport::default();
        let result = sweeper.sweep_all("mem-1", &mut report).await;

        assert!(result.is_err());
        assert_eq!(report.events_deleted, 2);
        assert_eq!(report.sessions_processed, 1);
    }

    #[tokio::test]
    async fn test_mid_run_enumeration_failure_is_recorded() {
        let backend = Arc::new(MockBackend::new());
        seed_session(&backend, "alice", "s-1", 1);
        backend.seed_record("/users/alice/preferences", "likes junmai");
        // Fail session enumeration for alice (attempt + retry); the
        // long-term pass must still run.
        backend.fail_next(MockOp::ListSessions, transient());
        backend.fail_next(MockOp::ListSessions, transient());

        let sweeper = LifecycleSweeper::new(backend.clone());
        let mut report = SweepReport::default();
        sweeper.sweep_all("mem-1", &mut report).await.unwrap();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.events_deleted, 0);
        assert_eq!(report.records_deleted, 1);
    }
}
