//! Capability negotiation for heterogeneous backend shapes.
//!
//! Deployed memory backends differ in which optional search parameters they
//! accept. Instead of reflecting on the bound API at call time, the
//! resolver probes the capability set once per backend binding and then
//! dispatches through a [`QueryShape`] implementation matching the detected
//! shape. Unsupported parameters are omitted from the built request rather
//! than causing a hard failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{RankingMode, SearchRequest};

/// Optional search parameters a backend may accept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendCapabilities {
    pub result_limit: bool,
    pub recency_filter: bool,
    pub namespace_filter: bool,
    pub ranking_mode: bool,
}

impl BackendCapabilities {
    /// Every optional parameter supported.
    pub fn full() -> Self {
        Self {
            result_limit: true,
            recency_filter: true,
            namespace_filter: true,
            ranking_mode: true,
        }
    }

    /// Required call signature only.
    pub fn minimal() -> Self {
        Self {
            result_limit: false,
            recency_filter: false,
            namespace_filter: false,
            ranking_mode: false,
        }
    }

    pub fn is_full(&self) -> bool {
        *self == Self::full()
    }

    pub fn is_minimal(&self) -> bool {
        *self == Self::minimal()
    }
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self::minimal()
    }
}

/// Builds the narrowest search call the bound backend accepts.
pub trait QueryShape: Send + Sync {
    /// Session-scoped, recency-bounded short-term request.
    fn short_term(
        &self,
        query: &str,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> SearchRequest;

    /// Namespace-scoped semantic long-term request.
    fn long_term(&self, query: &str, limit: usize, namespace: &str) -> SearchRequest;
}

/// Backend accepts the complete optional-parameter set.
struct FullShape;

impl QueryShape for FullShape {
    fn short_term(&self, query: &str, limit: usize, since: Option<DateTime<Utc>>) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            limit: Some(limit),
            since,
            namespace: None,
            ranking: Some(RankingMode::Recency),
        }
    }

    fn long_term(&self, query: &str, limit: usize, namespace: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            limit: Some(limit),
            since: None,
            namespace: Some(namespace.to_string()),
            ranking: Some(RankingMode::Relevance),
        }
    }
}

/// Backend accepts a subset of the optional parameters; each field is
/// included only when the probed capability set allows it.
struct ScopedShape(BackendCapabilities);

impl QueryShape for ScopedShape {
    fn short_term(&self, query: &str, limit: usize, since: Option<DateTime<Utc>>) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            limit: self.0.result_limit.then_some(limit),
            since: if self.0.recency_filter { since } else { None },
            namespace: None,
            ranking: self.0.ranking_mode.then_some(RankingMode::Recency),
        }
    }

    fn long_term(&self, query: &str, limit: usize, namespace: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            limit: self.0.result_limit.then_some(limit),
            since: None,
            namespace: self.0.namespace_filter.then(|| namespace.to_string()),
            ranking: self.0.ranking_mode.then_some(RankingMode::Relevance),
        }
    }
}

/// Required call signature only; used when the probe itself is unavailable.
struct MinimalShape;

impl QueryShape for MinimalShape {
    fn short_term(&self, query: &str, _limit: usize, _since: Option<DateTime<Utc>>) -> SearchRequest {
        SearchRequest::new(query)
    }

    fn long_term(&self, query: &str, _limit: usize, _namespace: &str) -> SearchRequest {
        SearchRequest::new(query)
    }
}

/// Select the query shape matching a probed capability set.
pub fn negotiate(caps: BackendCapabilities) -> Box<dyn QueryShape> {
    if caps.is_full() {
        Box::new(FullShape)
    } else if caps.is_minimal() {
        Box::new(MinimalShape)
    } else {
        Box::new(ScopedShape(caps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_shape_carries_everything() {
        let shape = negotiate(BackendCapabilities::full());
        let now = Utc::now();
        let request = shape.short_term("q", 5, Some(now));
        assert_eq!(request.limit, Some(5));
        assert_eq!(request.since, Some(now));
        assert_eq!(request.ranking, Some(RankingMode::Recency));

        let request = shape.long_term("q", 5, "/users/alice/preferences");
        assert_eq!(request.namespace.as_deref(), Some("/users/alice/preferences"));
        assert_eq!(request.ranking, Some(RankingMode::Relevance));
    }

    #[test]
    fn test_minimal_shape_drops_optional_parameters() {
        let shape = negotiate(BackendCapabilities::minimal());
        let request = shape.short_term("q", 5, Some(Utc::now()));
        assert_eq!(request, SearchRequest::new("q"));

        let request = shape.long_term("q", 5, "/users/alice/facts");
        assert_eq!(request, SearchRequest::new("q"));
    }

    #[test]
    fn test_scoped_shape_honours_individual_flags() {
        let caps = BackendCapabilities {
            result_limit: true,
            recency_filter: false,
            namespace_filter: true,
            ranking_mode: false,
        };
        let shape = negotiate(caps);

        let request = shape.short_term("q", 3, Some(Utc::now()));
        assert_eq!(request.limit, Some(3));
        assert!(request.since.is_none());
        assert!(request.ranking.is_none());

        let request = shape.long_term("q", 3, "/users/alice/facts");
        assert_eq!(request.namespace.as_deref(), Some("/users/alice/facts"));
    }
}
