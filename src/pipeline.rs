//! End-to-end search pipeline.
//!
//! ```text
//! raw input ─▶ parse ─▶ identity ─▶ collection ─▶ search ─▶ process ─▶ assemble
//!                          │            │
//!                          └────────────┴──▶ denied ─▶ PipelineError::AccessDenied
//! ```
//!
//! Every external client sits behind a trait object so tests can swap in
//! fakes. Nothing is cached between runs: each call to [`SearchPipeline::run`]
//! makes at most one directory lookup, one collection lookup and one search.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{CollectionClient, R2rClient, SearchClient};
use crate::collection::{CollectionResolver, PermissionPolicy};
use crate::config::Config;
use crate::context::ContextAssembler;
use crate::directory::{DirectoryClient, IdentityResolver, LdapDirectory};
use crate::error::PipelineError;
use crate::models::{AssembledContext, CollectionFilter, ParsedQuery, ScopeLookup, UserIdentity};
use crate::query;
use crate::results::{self, ResultSettings};
use crate::search::{SearchExecutor, SearchSettings};

/// Per-stage settings derived from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Minimum search-term length in characters; `0` disables the check.
    pub min_query_chars: usize,
    pub directory_timeout: Duration,
    pub collection_timeout: Duration,
    pub search: SearchSettings,
    pub results: ResultSettings,
    pub include_metadata: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_query_chars: config.query.min_chars,
            directory_timeout: config.directory.timeout(),
            collection_timeout: config.search.collection_timeout(),
            search: SearchSettings {
                use_hybrid: config.search.use_hybrid_search,
                limit: config.search.limit,
                min_relevance: config.results.min_relevance_score,
                timeout: config.search.timeout(),
            },
            results: ResultSettings::new(&config.results, &config.links.nextcloud_base_url),
            include_metadata: config.results.include_metadata,
        }
    }
}

pub struct SearchPipeline {
    directory: Arc<dyn DirectoryClient>,
    collections: Arc<dyn CollectionClient>,
    search: Arc<dyn SearchClient>,
    policy: PermissionPolicy,
    settings: PipelineSettings,
}

impl SearchPipeline {
    pub fn new(
        directory: Arc<dyn DirectoryClient>,
        collections: Arc<dyn CollectionClient>,
        search: Arc<dyn SearchClient>,
        policy: PermissionPolicy,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            directory,
            collections,
            search,
            policy,
            settings,
        }
    }

    /// Wire the production LDAP and R2R clients from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let r2r = Arc::new(R2rClient::new(&config.search)?);
        let policy = PermissionPolicy::from_config(&config.permissions);
        if !policy.is_enforced() {
            tracing::warn!("permission enforcement is DISABLED; do not run this in production");
        }

        Ok(Self::new(
            Arc::new(LdapDirectory::new(&config.directory)),
            r2r.clone(),
            r2r,
            policy,
            PipelineSettings::from_config(config),
        ))
    }

    pub fn policy(&self) -> &PermissionPolicy {
        &self.policy
    }

    /// Run one search on behalf of `user`.
    ///
    /// Returns [`PipelineError::AccessDenied`] before any search call when the
    /// user cannot be mapped to a collection, and
    /// [`PipelineError::SearchUnavailable`] when the search itself fails. A
    /// granted search with no surviving hits is `Ok` with a "no matches"
    /// context.
    pub async fn run(
        &self,
        raw: &str,
        user: &UserIdentity,
    ) -> Result<AssembledContext, PipelineError> {
        let parsed = query::parse(raw);
        tracing::debug!(
            terms = %parsed.search_terms,
            has_instructions = parsed.has_instructions(),
            "query parsed"
        );
        self.check_length(&parsed)?;

        let filter = self.resolve_filter(user).await;
        if !filter.granted {
            return Err(PipelineError::AccessDenied);
        }

        let executor = SearchExecutor::new(self.search.as_ref(), &self.settings.search);
        let hits = executor
            .execute(&parsed, &filter)
            .await
            .map_err(PipelineError::SearchUnavailable)?;

        let processed = results::process(hits, &self.settings.results);
        tracing::info!(
            matched = processed.matched,
            returned = processed.chunks.len(),
            "results processed"
        );

        let assembler = ContextAssembler::new(self.settings.include_metadata);
        Ok(assembler.assemble(&parsed.search_terms, &processed, &parsed.instructions))
    }

    /// Identity and collection resolution only. No search is issued.
    pub async fn resolve_filter(&self, user: &UserIdentity) -> CollectionFilter {
        let lookup = match self.policy {
            PermissionPolicy::Enforced => {
                IdentityResolver::new(self.directory.as_ref(), self.settings.directory_timeout)
                    .resolve(&user.email)
                    .await
            }
            // The directory is never consulted when bypassing.
            PermissionPolicy::Bypass { .. } => ScopeLookup::NotFound,
        };

        CollectionResolver::new(self.collections.as_ref(), self.settings.collection_timeout)
            .resolve(&lookup, &self.policy)
            .await
    }

    fn check_length(&self, parsed: &ParsedQuery) -> Result<(), PipelineError> {
        let min = self.settings.min_query_chars;
        if min > 0 && parsed.search_terms.chars().count() < min {
            return Err(PipelineError::QueryTooShort {
                query: parsed.search_terms.clone(),
                min,
            });
        }
        Ok(())
    }
}

// ============ CLI entry points ============

/// `citegate search`: print the assembled context, or the user-facing
/// error message on stderr.
pub async fn run_search(config: &Config, input: &str, email: &str, json: bool) -> Result<()> {
    let pipeline = SearchPipeline::from_config(config)?;
    match pipeline.run(input, &UserIdentity::new(email)).await {
        Ok(context) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&context)?);
            } else {
                println!("{}", context.text);
                if !context.sources.is_empty() {
                    println!();
                    println!("Sources:");
                    for source in &context.sources {
                        match &source.link {
                            Some(link) => println!("  [{}] {}", source.citation_id, link),
                            None => println!("  [{}]", source.citation_id),
                        }
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            Err(e.into())
        }
    }
}

/// `citegate resolve`: print the collection filter the user would search
/// under.
pub async fn run_resolve(config: &Config, email: &str) -> Result<()> {
    let pipeline = SearchPipeline::from_config(config)?;
    let filter = pipeline.resolve_filter(&UserIdentity::new(email)).await;
    println!("{}", serde_json::to_string_pretty(&filter)?);
    if !filter.granted {
        bail!("{} is not authorized to search", email);
    }
    Ok(())
}

/// `citegate health`: probe the search backend.
pub async fn run_health(config: &Config) -> Result<()> {
    let client = R2rClient::new(&config.search)?;
    let status = client.health().await?;
    println!("search backend: HTTP {}", status);
    if !(200..300).contains(&status) {
        bail!("search backend is unhealthy (HTTP {})", status);
    }
    Ok(())
}
