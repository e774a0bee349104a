//! Deterministic in-memory backend for reliability tests.
//!
//! Supports scripted per-operation failure injection, call counting, and a
//! configurable page size so pagination paths can be exercised without a
//! live backend.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::capability::BackendCapabilities;
use crate::context::MemoryContext;
use crate::error::{MemoryError, Result};

use super::{
    ConversationalMessage, Event, MemoryBackend, MemoryRecord, Page, SearchHit, SearchRequest,
};

/// Backend operations addressable by failure scripts and call counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    DescribeCapabilities,
    ListActors,
    ListSessions,
    ListEvents,
    CreateEvent,
    DeleteEvent,
    ListRecords,
    DeleteRecord,
    SearchShortTerm,
    SearchLongTerm,
}

#[derive(Default)]
struct MockState {
    /// actor -> session -> ordered events
    events: BTreeMap<String, BTreeMap<String, Vec<Event>>>,
    records: Vec<MemoryRecord>,
    short_term_hits: Vec<SearchHit>,
    long_term_hits: Vec<SearchHit>,
    failures: HashMap<MockOp, VecDeque<MemoryError>>,
    failures_at: HashMap<(MockOp, usize), MemoryError>,
    calls: HashMap<MockOp, usize>,
    last_short_term: Option<SearchRequest>,
    last_long_term: Option<SearchRequest>,
    /// Open enumeration cursors: id snapshot taken when the first page of
    /// an enumeration is served.
    cursors: HashMap<u64, Vec<String>>,
    next_id: u64,
}

/// Scripted mock implementation of [`MemoryBackend`].
pub struct MockBackend {
    state: Mutex<MockState>,
    capabilities: Option<BackendCapabilities>,
    page_size: usize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            capabilities: Some(BackendCapabilities::full()),
            page_size: 100,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the probed capability set; `None` makes the probe answer
    /// `NotFound`, as a backend predating the probe would.
    pub fn with_capabilities(mut self, capabilities: Option<BackendCapabilities>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Queue an error for the next call(s) of an operation. Errors are
    /// consumed in FIFO order before the operation's normal behavior runs.
    pub fn fail_next(&self, op: MockOp, error: MemoryError) {
        self.state.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Fail the `call`-th invocation (1-based) of an operation.
    pub fn fail_call(&self, op: MockOp, call: usize, error: MemoryError) {
        self.state.lock().failures_at.insert((op, call), error);
    }

    pub fn call_count(&self, op: MockOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn seed_event(&self, actor_id: &str, session_id: &str, messages: Vec<ConversationalMessage>) {
        let mut state = self.state.lock();
        let event_id = format!("evt-{}", state.next_id);
        state.next_id += 1;
        state
            .events
            .entry(actor_id.to_string())
            .or_default()
            .entry(session_id.to_string())
            .or_default()
            .push(Event {
                event_id,
                actor_id: actor_id.to_string(),
                session_id: session_id.to_string(),
                messages,
                created_at: Utc::now(),
            });
    }

    pub fn seed_record(&self, namespace: &str, content: &str) {
        let mut state = self.state.lock();
        let record_id = format!("rec-{}", state.next_id);
        state.next_id += 1;
        state.records.push(MemoryRecord {
            record_id,
            namespace: namespace.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        });
    }

    pub fn set_short_term_hits(&self, hits: Vec<SearchHit>) {
        self.state.lock().short_term_hits = hits;
    }

    pub fn set_long_term_hits(&self, hits: Vec<SearchHit>) {
        self.state.lock().long_term_hits = hits;
    }

    /// Events currently stored for a session, in write order.
    pub fn session_events(&self, actor_id: &str, session_id: &str) -> Vec<Event> {
        self.state
            .lock()
            .events
            .get(actor_id)
            .and_then(|sessions| sessions.get(session_id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn event_count(&self) -> usize {
        self.state
            .lock()
            .events
            .values()
            .flat_map(|sessions| sessions.values())
            .map(|events| events.len())
            .sum()
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().records.len()
    }

    /// The most recent short-term request as built by the negotiated shape.
    pub fn last_short_term_request(&self) -> Option<SearchRequest> {
        self.state.lock().last_short_term.clone()
    }

    pub fn last_long_term_request(&self) -> Option<SearchRequest> {
        self.state.lock().last_long_term.clone()
    }

    fn begin(&self, op: MockOp) -> Result<()> {
        let mut state = self.state.lock();
        let call = {
            let counter = state.calls.entry(op).or_insert(0);
            *counter += 1;
            *counter
        };
        if let Some(error) = state.failures_at.remove(&(op, call)) {
            return Err(error);
        }
        if let Some(queue) = state.failures.get_mut(&op)
            && let Some(error) = queue.pop_front()
        {
            return Err(error);
        }
        Ok(())
    }

    /// Serve one page of a cursor-stable enumeration.
    ///
    /// The id set is snapshotted when the first page is served; later pages
    /// are derived from that snapshot, filtered to items still present. A
    /// caller may therefore delete the items of each page before asking for
    /// the next one without skipping or replaying anything.
    fn paginate<T: Clone>(
        &self,
        items: &[T],
        id_of: impl Fn(&T) -> String,
        page_token: Option<&str>,
    ) -> Result<Page<T>> {
        let mut state = self.state.lock();
        let (cursor, start) = match page_token {
            Some(token) => {
                let parsed = token.split_once(':').and_then(|(cursor, offset)| {
                    Some((cursor.parse::<u64>().ok()?, offset.parse::<usize>().ok()?))
                });
                parsed
                    .ok_or_else(|| MemoryError::MalformedResponse(format!("bad page token: {token}")))?
            }
            None => {
                let cursor = state.next_id;
                state.next_id += 1;
                let snapshot = items.iter().map(&id_of).collect();
                state.cursors.insert(cursor, snapshot);
                (cursor, 0)
            }
        };

        let snapshot = state
            .cursors
            .get(&cursor)
            .cloned()
            .ok_or_else(|| MemoryError::MalformedResponse(format!("unknown cursor: {cursor}")))?;
        let start = start.min(snapshot.len());
        let end = (start + self.page_size).min(snapshot.len());
        let page_ids = &snapshot[start..end];

        let next_token = (end < snapshot.len()).then(|| format!("{cursor}:{end}"));
        if next_token.is_none() {
            state.cursors.remove(&cursor);
        }

        Ok(Page {
            items: items
                .iter()
                .filter(|item| page_ids.contains(&id_of(item)))
                .cloned()
                .collect(),
            next_token,
        })
    }
}

#[async_trait]
impl MemoryBackend for MockBackend {
    async fn describe_capabilities(&self) -> Result<BackendCapabilities> {
        self.begin(MockOp::DescribeCapabilities)?;
        self.capabilities
            .ok_or_else(|| MemoryError::NotFound("capability probe unsupported".to_string()))
    }

    async fn list_actors(&self, _memory_id: &str, page_token: Option<&str>) -> Result<Page<String>> {
        self.begin(MockOp::ListActors)?;
        let actors: Vec<String> = self.state.lock().events.keys().cloned().collect();
        self.paginate(&actors, |actor| actor.clone(), page_token)
    }

    async fn list_sessions(
        &self,
        _memory_id: &str,
        actor_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<String>> {
        self.begin(MockOp::ListSessions)?;
        let sessions: Vec<String> = self
            .state
            .lock()
            .events
            .get(actor_id)
            .map(|sessions| sessions.keys().cloned().collect())
            .unwrap_or_default();
        self.paginate(&sessions, |session| session.clone(), page_token)
    }

    async fn list_events(
        &self,
        _memory_id: &str,
        actor_id: &str,
        session_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<Event>> {
        self.begin(MockOp::ListEvents)?;
        let events = self.session_events(actor_id, session_id);
        self.paginate(&events, |event| event.event_id.clone(), page_token)
    }

    async fn create_event(
        &self,
        ctx: &MemoryContext,
        messages: &[ConversationalMessage],
    ) -> Result<String> {
        self.begin(MockOp::CreateEvent)?;
        let mut state = self.state.lock();
        let event_id = format!("evt-{}", state.next_id);
        state.next_id += 1;
        state
            .events
            .entry(ctx.actor_id.clone())
            .or_default()
            .entry(ctx.session_id.clone())
            .or_default()
            .push(Event {
                event_id: event_id.clone(),
                actor_id: ctx.actor_id.clone(),
                session_id: ctx.session_id.clone(),
                messages: messages.to_vec(),
                created_at: Utc::now(),
            });
        Ok(event_id)
    }

    async fn delete_event(
        &self,
        _memory_id: &str,
        actor_id: &str,
        session_id: &str,
        event_id: &str,
    ) -> Result<()> {
        self.begin(MockOp::DeleteEvent)?;
        let mut state = self.state.lock();
        let events = state
            .events
            .get_mut(actor_id)
            .and_then(|sessions| sessions.get_mut(session_id));
        match events {
            Some(events) => {
                let before = events.len();
                events.retain(|event| event.event_id != event_id);
                if events.len() == before {
                    return Err(MemoryError::NotFound(format!("event {event_id}")));
                }
                Ok(())
            }
            None => Err(MemoryError::NotFound(format!("session {session_id}"))),
        }
    }

    async fn list_records(
        &self,
        _memory_id: &str,
        namespace: &str,
        page_token: Option<&str>,
    ) -> Result<Page<MemoryRecord>> {
        self.begin(MockOp::ListRecords)?;
        let records: Vec<MemoryRecord> = self
            .state
            .lock()
            .records
            .iter()
            .filter(|record| {
                namespace == crate::context::ROOT_NAMESPACE
                    || record.namespace.starts_with(namespace)
            })
            .cloned()
            .collect();
        self.paginate(&records, |record| record.record_id.clone(), page_token)
    }

    async fn delete_record(&self, _memory_id: &str, record_id: &str) -> Result<()> {
        self.begin(MockOp::DeleteRecord)?;
        let mut state = self.state.lock();
        let before = state.records.len();
        state.records.retain(|record| record.record_id != record_id);
        if state.records.len() == before {
            return Err(MemoryError::NotFound(format!("record {record_id}")));
        }
        Ok(())
    }

    async fn search_short_term(
        &self,
        _ctx: &MemoryContext,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>> {
        self.begin(MockOp::SearchShortTerm)?;
        let mut state = self.state.lock();
        state.last_short_term = Some(request.clone());
        Ok(state.short_term_hits.clone())
    }

    async fn search_long_term(
        &self,
        _memory_id: &str,
        _actor_id: &str,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>> {
        self.begin(MockOp::SearchLongTerm)?;
        let mut state = self.state.lock();
        state.last_long_term = Some(request.clone());
        Ok(state.long_term_hits.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enumeration_is_stable_under_page_deletion() {
        let backend = MockBackend::new().with_page_size(100);
        for i in 0..150 {
            backend.seed_event(
                "alice",
                "s-1",
                vec![ConversationalMessage::user(format!("message {i}"))],
            );
        }

        let first = backend.list_events("mem-1", "alice", "s-1", None).await.unwrap();
        assert_eq!(first.items.len(), 100);
        let token = first.next_token.clone().unwrap();

        // Delete everything the first page served before asking for the
        // next page, as the sweeper does.
        for event in &first.items {
            backend
                .delete_event("mem-1", "alice", "s-1", &event.event_id)
                .await
                .unwrap();
        }

        let second = backend
            .list_events("mem-1", "alice", "s-1", Some(&token))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 50);
        assert!(second.next_token.is_none());

        // Nothing was skipped or served twice.
        let mut seen: Vec<&str> = first
            .items
            .iter()
            .chain(second.items.iter())
            .map(|event| event.event_id.as_str())
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 150);
    }
}
