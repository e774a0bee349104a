//! HTTP client for the managed memory data plane.
//!
//! Talks to the regional AgentCore-style REST surface with typed JSON
//! bodies. Request signing is owned by the surrounding deployment; this
//! client carries an injected bearer token and maps HTTP statuses onto the
//! subsystem error taxonomy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::capability::BackendCapabilities;
use crate::context::MemoryContext;
use crate::error::{MemoryError, Result};

use super::{
    ConversationalMessage, Event, MemoryBackend, MemoryRecord, Page, RankingMode, SearchHit,
    SearchRequest,
};

const DEFAULT_REGION: &str = "us-west-2";

/// Truncate error bodies to avoid leaking large or sensitive responses.
const MAX_ERROR_BODY: usize = 512;

/// HTTP-backed [`MemoryBackend`] implementation.
pub struct AgentCoreBackend {
    client: Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl AgentCoreBackend {
    /// Create a client for a region's data-plane endpoint.
    pub fn new(region: impl Into<String>) -> Self {
        let region = region.into();
        let region = if region.is_empty() {
            DEFAULT_REGION.to_string()
        } else {
            region
        };
        Self {
            client: Client::new(),
            base_url: format!("https://bedrock-agentcore.{region}.amazonaws.com"),
            bearer_token: None,
        }
    }

    /// Override the endpoint, e.g. for a local or test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    fn events_path(memory_id: &str, actor_id: &str, session_id: &str) -> String {
        format!(
            "/memories/{}/actor/{}/sessions/{}/events",
            urlencoding::encode(memory_id),
            urlencoding::encode(actor_id),
            urlencoding::encode(session_id),
        )
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| MemoryError::MalformedResponse(format!("{e}: {}", truncate(&body))))
    }

    async fn send_no_body(&self, builder: RequestBuilder) -> Result<()> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        Ok(())
    }
}

fn truncate(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < MAX_ERROR_BODY)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}... [truncated]", &body[..cut])
    } else {
        body.to_string()
    }
}

async fn error_for_response(response: Response) -> MemoryError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = format!("{status}: {}", truncate(&body));

    match status {
        StatusCode::NOT_FOUND => MemoryError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MemoryError::PermissionDenied(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            MemoryError::Transient(message)
        }
        status if status.is_server_error() => MemoryError::Transient(message),
        _ => MemoryError::MalformedResponse(message),
    }
}

/// Decode the items of a list response one by one, skipping any that fail.
///
/// Enumeration must keep going past a single undecodable item; only a body
/// that does not decode as a list response at all is a `MalformedResponse`.
fn decode_items<T: DeserializeOwned>(values: Vec<serde_json::Value>, kind: &str) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(error) => {
                warn!(%error, kind, "skipping undecodable item in list response");
                None
            }
        })
        .collect()
}

// Wire types (camelCase per the data-plane convention)

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListActorsResponse {
    #[serde(default)]
    actor_summaries: Vec<serde_json::Value>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActorSummary {
    actor_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSessionsResponse {
    #[serde(default)]
    session_summaries: Vec<serde_json::Value>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionSummary {
    session_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEventsResponse {
    #[serde(default)]
    events: Vec<serde_json::Value>,
    next_token: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    role: super::MessageRole,
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    event_id: String,
    actor_id: String,
    session_id: String,
    #[serde(default)]
    messages: Vec<WireMessage>,
    created_at: DateTime<Utc>,
}

impl From<WireEvent> for Event {
    fn from(event: WireEvent) -> Self {
        Event {
            event_id: event.event_id,
            actor_id: event.actor_id,
            session_id: event.session_id,
            messages: event
                .messages
                .into_iter()
                .map(|m| ConversationalMessage {
                    role: m.role,
                    text: m.text,
                })
                .collect(),
            created_at: event.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateEventRequest {
    messages: Vec<WireMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEventResponse {
    event_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRecordsRequest<'a> {
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListRecordsResponse {
    #[serde(default)]
    memory_record_summaries: Vec<serde_json::Value>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord {
    memory_record_id: String,
    namespace: String,
    #[serde(default)]
    content: String,
    created_at: DateTime<Utc>,
}

impl From<WireRecord> for MemoryRecord {
    fn from(record: WireRecord) -> Self {
        MemoryRecord {
            record_id: record.memory_record_id,
            namespace: record.namespace,
            content: record.content,
            created_at: record.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireSearchRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ranking: Option<RankingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    actor_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

impl<'a> WireSearchRequest<'a> {
    fn from_request(request: &'a SearchRequest) -> Self {
        Self {
            query: &request.query,
            max_results: request.limit,
            since: request.since,
            namespace: request.namespace.as_deref(),
            ranking: request.ranking,
            actor_id: None,
            session_id: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WireSearchHit>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSearchHit {
    content: String,
    score: Option<f64>,
    namespace: Option<String>,
}

#[async_trait]
impl MemoryBackend for AgentCoreBackend {
    async fn describe_capabilities(&self) -> Result<BackendCapabilities> {
        self.send(self.request(Method::GET, "/capabilities")).await
    }

    async fn list_actors(&self, memory_id: &str, page_token: Option<&str>) -> Result<Page<String>> {
        let path = format!("/memories/{}/actors", urlencoding::encode(memory_id));
        let mut builder = self.request(Method::GET, &path);
        if let Some(token) = page_token {
            builder = builder.query(&[("nextToken", token)]);
        }
        let response: ListActorsResponse = self.send(builder).await?;
        let actors: Vec<ActorSummary> = decode_items(response.actor_summaries, "actor");
        Ok(Page {
            items: actors.into_iter().map(|a| a.actor_id).collect(),
            next_token: response.next_token,
        })
    }

    async fn list_sessions(
        &self,
        memory_id: &str,
        actor_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<String>> {
        let path = format!(
            "/memories/{}/actor/{}/sessions",
            urlencoding::encode(memory_id),
            urlencoding::encode(actor_id),
        );
        let mut builder = self.request(Method::GET, &path);
        if let Some(token) = page_token {
            builder = builder.query(&[("nextToken", token)]);
        }
        let response: ListSessionsResponse = self.send(builder).await?;
        let sessions: Vec<SessionSummary> = decode_items(response.session_summaries, "session");
        Ok(Page {
            items: sessions.into_iter().map(|s| s.session_id).collect(),
            next_token: response.next_token,
        })
    }

    async fn list_events(
        &self,
        memory_id: &str,
        actor_id: &str,
        session_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<Event>> {
        let path = Self::events_path(memory_id, actor_id, session_id);
        let mut builder = self.request(Method::GET, &path);
        if let Some(token) = page_token {
            builder = builder.query(&[("nextToken", token)]);
        }
        let response: ListEventsResponse = self.send(builder).await?;
        let events: Vec<WireEvent> = decode_items(response.events, "event");
        Ok(Page {
            items: events.into_iter().map(Event::from).collect(),
            next_token: response.next_token,
        })
    }

    async fn create_event(
        &self,
        ctx: &MemoryContext,
        messages: &[ConversationalMessage],
    ) -> Result<String> {
        let path = Self::events_path(&ctx.memory_id, &ctx.actor_id, &ctx.session_id);
        let body = CreateEventRequest {
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    text: m.text.clone(),
                })
                .collect(),
        };
        let response: CreateEventResponse =
            self.send(self.request(Method::POST, &path).json(&body)).await?;
        Ok(response.event_id)
    }

    async fn delete_event(
        &self,
        memory_id: &str,
        actor_id: &str,
        session_id: &str,
        event_id: &str,
    ) -> Result<()> {
        let path = format!(
            "{}/{}",
            Self::events_path(memory_id, actor_id, session_id),
            urlencoding::encode(event_id),
        );
        self.send_no_body(self.request(Method::DELETE, &path)).await
    }

    async fn list_records(
        &self,
        memory_id: &str,
        namespace: &str,
        page_token: Option<&str>,
    ) -> Result<Page<MemoryRecord>> {
        let path = format!("/memories/{}/records/list", urlencoding::encode(memory_id));
        let body = ListRecordsRequest {
            namespace,
            next_token: page_token,
        };
        let response: ListRecordsResponse =
            self.send(self.request(Method::POST, &path).json(&body)).await?;
        let records: Vec<WireRecord> = decode_items(response.memory_record_summaries, "record");
        Ok(Page {
            items: records.into_iter().map(MemoryRecord::from).collect(),
            next_token: response.next_token,
        })
    }

    async fn delete_record(&self, memory_id: &str, record_id: &str) -> Result<()> {
        let path = format!(
            "/memories/{}/records/{}",
            urlencoding::encode(memory_id),
            urlencoding::encode(record_id),
        );
        self.send_no_body(self.request(Method::DELETE, &path)).await
    }

    async fn search_short_term(
        &self,
        ctx: &MemoryContext,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>> {
        let path = format!(
            "/memories/{}/search/events",
            urlencoding::encode(&ctx.memory_id),
        );
        let mut body = WireSearchRequest::from_request(request);
        body.actor_id = Some(&ctx.actor_id);
        body.session_id = Some(&ctx.session_id);
        let response: SearchResponse =
            self.send(self.request(Method::POST, &path).json(&body)).await?;
        Ok(collect_hits(response))
    }

    async fn search_long_term(
        &self,
        memory_id: &str,
        actor_id: &str,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>> {
        let path = format!("/memories/{}/search/records", urlencoding::encode(memory_id));
        let mut body = WireSearchRequest::from_request(request);
        body.actor_id = Some(actor_id);
        let response: SearchResponse =
            self.send(self.request(Method::POST, &path).json(&body)).await?;
        Ok(collect_hits(response))
    }
}

fn collect_hits(response: SearchResponse) -> Vec<SearchHit> {
    response
        .results
        .into_iter()
        .map(|hit| SearchHit {
            content: hit.content,
            score: hit.score,
            namespace: hit.namespace,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> AgentCoreBackend {
        AgentCoreBackend::new("us-west-2").with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_list_actors_follows_token_parameter() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/memories/mem-1/actors"))
            .and(query_param("nextToken", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "actorSummaries": [{"actorId": "alice"}, {"actorId": "bob"}],
                "nextToken": "100"
            })))
            .mount(&server)
            .await;

        let page = backend(&server)
            .list_actors("mem-1", Some("50"))
            .await
            .unwrap();
        assert_eq!(page.items, vec!["alice", "bob"]);
        assert_eq!(page.next_token.as_deref(), Some("100"));
    }

    #[tokio::test]
    async fn test_create_event_returns_assigned_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/memories/mem-1/actor/alice/sessions/s-1/events"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"eventId": "evt-42"})),
            )
            .mount(&server)
            .await;

        let ctx = MemoryContext::new("mem-1", "alice", "s-1");
        let event_id = backend(&server)
            .create_event(&ctx, &[ConversationalMessage::user("hello")])
            .await
            .unwrap();
        assert_eq!(event_id, "evt-42");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/memories/mem-1/records/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/memories/mem-1/records/denied"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/memories/mem-1/records/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let backend = backend(&server);
        assert!(matches!(
            backend.delete_record("mem-1", "gone").await,
            Err(MemoryError::NotFound(_))
        ));
        assert!(matches!(
            backend.delete_record("mem-1", "denied").await,
            Err(MemoryError::PermissionDenied(_))
        ));
        let flaky = backend.delete_record("mem-1", "flaky").await.unwrap_err();
        assert!(flaky.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_list_item_is_skipped() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/memories/mem-1/actor/alice/sessions/s-1/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "events": [
                    {"eventId": "evt-1", "actorId": "alice", "sessionId": "s-1",
                     "messages": [], "createdAt": "2026-08-01T00:00:00Z"},
                    {"eventId": 7},
                    {"eventId": "evt-2", "actorId": "alice", "sessionId": "s-1",
                     "messages": [], "createdAt": "2026-08-02T00:00:00Z"}
                ],
                "nextToken": "50"
            })))
            .mount(&server)
            .await;

        // One undecodable event must not poison the page; the rest of the
        // enumeration (items and token) still comes through.
        let page = backend(&server)
            .list_events("mem-1", "alice", "s-1", None)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].event_id, "evt-1");
        assert_eq!(page.items[1].event_id, "evt-2");
        assert_eq!(page.next_token.as_deref(), Some("50"));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/memories/mem-1/actors"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = backend(&server).list_actors("mem-1", None).await;
        assert!(matches!(result, Err(MemoryError::MalformedResponse(_))));
    }
}
