//! Search execution: the primary enforcement point.
//!
//! A denied filter or empty search terms short-circuit to an empty result
//! without touching the network. Everything else becomes exactly one
//! bounded call to the [`SearchClient`].

use std::time::Duration;

use crate::backend::SearchClient;
use crate::error::BackendError;
use crate::models::{CollectionFilter, ParsedQuery, SearchHit, SearchRequest};

/// Search tuning taken from `[search]` and `[results]`.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub use_hybrid: bool,
    pub limit: u32,
    pub min_relevance: f64,
    pub timeout: Duration,
}

pub struct SearchExecutor<'a> {
    client: &'a dyn SearchClient,
    settings: &'a SearchSettings,
}

impl<'a> SearchExecutor<'a> {
    pub fn new(client: &'a dyn SearchClient, settings: &'a SearchSettings) -> Self {
        Self { client, settings }
    }

    /// Build the request for `parsed` under `filter`, or `None` when no
    /// search may be issued.
    pub fn build_request(&self, parsed: &ParsedQuery, filter: &CollectionFilter) -> Option<SearchRequest> {
        if !filter.granted || parsed.search_terms.trim().is_empty() {
            return None;
        }
        Some(SearchRequest {
            query: parsed.search_terms.clone(),
            filter: filter.clone(),
            limit: self.settings.limit.clamp(1, 100),
            use_hybrid: self.settings.use_hybrid,
            min_relevance: self.settings.min_relevance,
        })
    }

    /// Run the search. Transport failures and timeouts are errors, never an
    /// empty result, so "no matches" stays distinguishable from "search
    /// failed".
    pub async fn execute(
        &self,
        parsed: &ParsedQuery,
        filter: &CollectionFilter,
    ) -> Result<Vec<SearchHit>, BackendError> {
        let Some(request) = self.build_request(parsed, filter) else {
            tracing::debug!(granted = filter.granted, "search skipped");
            return Ok(Vec::new());
        };

        match tokio::time::timeout(self.settings.timeout, self.client.search(&request)).await {
            Ok(Ok(hits)) => {
                tracing::info!(hits = hits.len(), "search completed");
                Ok(hits)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "search failed");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.settings.timeout, "search timed out");
                Err(BackendError::Timeout)
            }
        }
    }
}
