//! Preference resolution across both memory tiers.
//!
//! Merges session-scoped short-term search with namespace-scoped long-term
//! semantic search. The backend capability set is probed once per resolver
//! and cached; the narrowest supported call shape is used from then on. A
//! tier that is unreachable degrades the result to `partial = true` instead
//! of failing the request.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::backend::{MemoryBackend, SearchHit};
use crate::capability::{negotiate, BackendCapabilities, QueryShape};
use crate::context::{MemoryContext, FACTS_LEAF, PREFERENCES_LEAF};
use crate::error::{MemoryError, Result};

/// Default number of hits requested per tier and namespace.
pub const DEFAULT_TOP_K: usize = 5;

/// Recency window applied to short-term search when the backend supports a
/// recency filter.
const SHORT_TERM_WINDOW_DAYS: i64 = 30;

/// Merged preference lookup result.
///
/// `partial = true` means one tier was unreachable and the result is valid
/// but incomplete; callers must not treat it as an error.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PreferenceResult {
    pub short_term: Vec<SearchHit>,
    pub long_term: Vec<SearchHit>,
    pub partial: bool,
}

impl PreferenceResult {
    pub fn is_empty(&self) -> bool {
        self.short_term.is_empty() && self.long_term.is_empty()
    }
}

/// Resolves a user's historical preferences for a query.
pub struct PreferenceResolver {
    backend: Arc<dyn MemoryBackend>,
    capabilities: OnceCell<BackendCapabilities>,
    top_k: usize,
}

impl PreferenceResolver {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self {
            backend,
            capabilities: OnceCell::new(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Probe once per resolver binding; a failed probe means the minimal
    /// call signature.
    async fn shape(&self) -> Box<dyn QueryShape> {
        let caps = self
            .capabilities
            .get_or_init(|| async {
                match self.backend.describe_capabilities().await {
                    Ok(caps) => {
                        debug!(?caps, "backend capabilities probed");
                        caps
                    }
                    Err(error) => {
                        debug!(%error, "capability probe unavailable, using minimal shape");
                        BackendCapabilities::minimal()
                    }
                }
            })
            .await;
        negotiate(*caps)
    }

    /// Resolve merged preferences for an actor and query.
    ///
    /// Long-term search covers the actor's preferences and facts
    /// namespaces; a failed semantic search falls back to listing records
    /// in that namespace before the tier is declared unavailable. Only
    /// `PermissionDenied` propagates as a hard error.
    pub async fn resolve_preferences(
        &self,
        ctx: &MemoryContext,
        query: &str,
    ) -> Result<PreferenceResult> {
        let shape = self.shape().await;
        let mut result = PreferenceResult::default();

        for leaf in [PREFERENCES_LEAF, FACTS_LEAF] {
            let namespace = ctx.namespace(leaf);
            match self.long_term_hits(ctx, shape.as_ref(), query, &namespace).await {
                Ok(hits) => result.long_term.extend(hits),
                Err(error @ MemoryError::PermissionDenied(_)) => return Err(error),
                Err(error) => {
                    warn!(%error, namespace, "long-term tier unavailable");
                    result.partial = true;
                }
            }
        }

        let since = Utc::now() - Duration::days(SHORT_TERM_WINDOW_DAYS);
        let request = shape.short_term(query, self.top_k, Some(since));
        match self.backend.search_short_term(ctx, &request).await {
            Ok(hits) => result.short_term = hits,
            Err(error @ MemoryError::PermissionDenied(_)) => return Err(error),
            Err(error) => {
                warn!(%error, "short-term tier unavailable");
                result.partial = true;
            }
        }

        Ok(result)
    }

    /// Semantic search with a list fallback for degraded backends.
    async fn long_term_hits(
        &self,
        ctx: &MemoryContext,
        shape: &dyn QueryShape,
        query: &str,
        namespace: &str,
    ) -> Result<Vec<SearchHit>> {
        let request = shape.long_term(query, self.top_k, namespace);
        match self
            .backend
            .search_long_term(&ctx.memory_id, &ctx.actor_id, &request)
            .await
        {
            Ok(hits) => Ok(hits),
            Err(error @ MemoryError::PermissionDenied(_)) => Err(error),
            Err(error) => {
                debug!(%error, namespace, "semantic search failed, listing records instead");
                let page = self
                    .backend
                    .list_records(&ctx.memory_id, namespace, None)
                    .await?;
                Ok(page
                    .items
                    .into_iter()
                    .take(self.top_k)
                    .map(|record| SearchHit {
                        content: record.content,
                        score: None,
                        namespace: Some(record.namespace),
                    })
                    .collect())
            }
        }
    }
}
