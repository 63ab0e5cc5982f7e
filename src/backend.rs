//! Search backend clients.
//!
//! Two single-method seams, [`CollectionClient`] and [`SearchClient`], keep
//! the pipeline independent of the wire protocol. [`R2rClient`] implements
//! both against an R2R-compatible HTTP API:
//!
//! | Call | Request |
//! |------|---------|
//! | collection lookup | `GET {collections_api_url}/{GUID}?owner_id=...` |
//! | search | `POST {api_url}` with `{query, search_settings}` |
//!
//! Both calls carry `Authorization: Bearer <token>`. Neither retries; the
//! caller owns any retry policy.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::{SearchConfig, Secret};
use crate::error::BackendError;
use crate::models::{AuthorizationScope, HitMetadata, SearchHit, SearchRequest};

const USER_AGENT: &str = concat!("citegate/", env!("CARGO_PKG_VERSION"));

/// Maps an authorization scope to the backend collection holding the
/// documents that scope may read.
#[async_trait]
pub trait CollectionClient: Send + Sync {
    /// `Ok(None)` means the backend has no collection for this scope.
    async fn lookup_collection(
        &self,
        scope: &AuthorizationScope,
    ) -> Result<Option<String>, BackendError>;
}

/// Executes one filtered search.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, BackendError>;
}

/// HTTP client for an R2R-compatible retrieval service.
#[derive(Clone)]
pub struct R2rClient {
    http: Client,
    search_url: String,
    collections_url: String,
    owner_id: String,
    bearer_token: Secret,
    search_timeout: Duration,
    collection_timeout: Duration,
}

impl R2rClient {
    pub fn new(config: &SearchConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.collection_timeout().min(config.timeout()))
            .build()?;

        Ok(Self {
            http,
            search_url: config.api_url.trim().trim_end_matches('/').to_string(),
            collections_url: config
                .collections_api_url
                .trim()
                .trim_end_matches('/')
                .to_string(),
            owner_id: config.default_owner_id.clone(),
            bearer_token: config.bearer_token.clone(),
            search_timeout: config.timeout(),
            collection_timeout: config.collection_timeout(),
        })
    }

    /// Probe the backend's health endpoint, derived from the search URL.
    ///
    /// Returns the HTTP status code of the probe.
    pub async fn health(&self) -> Result<u16, BackendError> {
        let resp = self
            .http
            .get(health_url(&self.search_url))
            .timeout(self.collection_timeout)
            .send()
            .await?;
        Ok(resp.status().as_u16())
    }
}

#[async_trait]
impl CollectionClient for R2rClient {
    async fn lookup_collection(
        &self,
        scope: &AuthorizationScope,
    ) -> Result<Option<String>, BackendError> {
        let url = format!("{}/{}", self.collections_url, scope.guid());
        let resp = self
            .http
            .get(url)
            .bearer_auth(self.bearer_token.expose())
            .query(&[("owner_id", self.owner_id.as_str())])
            .timeout(self.collection_timeout)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::status(status.as_u16(), &body));
        }

        let json: Value = resp.json().await?;
        Ok(parse_collection_response(&json))
    }
}

#[async_trait]
impl SearchClient for R2rClient {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, BackendError> {
        let resp = self
            .http
            .post(&self.search_url)
            .bearer_auth(self.bearer_token.expose())
            .json(&search_body(request))
            .timeout(self.search_timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::status(status.as_u16(), &body));
        }

        let json: Value = resp.json().await?;
        parse_search_response(&json)
    }
}

/// Build the JSON body for a search call.
pub fn search_body(request: &SearchRequest) -> Value {
    let mut settings = json!({
        "use_hybrid_search": request.use_hybrid,
        "limit": request.limit,
    });
    if let Some(collection_id) = &request.filter.collection_id {
        settings["filters"] = json!({
            "collection_ids": { "$in": [collection_id] }
        });
    }
    json!({
        "query": request.query,
        "search_settings": settings,
    })
}

/// `.../v3/retrieval/search` → `.../v3/retrieval/health`.
pub fn health_url(search_url: &str) -> String {
    match search_url.strip_suffix("/search") {
        Some(prefix) => format!("{}/health", prefix),
        None => format!("{}/health", search_url),
    }
}

fn parse_collection_response(json: &Value) -> Option<String> {
    match json.get("results")?.get("id")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        _ => None,
    }
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(default)]
    text: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    metadata: Value,
    #[serde(default)]
    document_id: Option<Value>,
}

/// Read hits from either `results.chunk_search_results` or a bare
/// `results` array.
pub fn parse_search_response(json: &Value) -> Result<Vec<SearchHit>, BackendError> {
    let results = json
        .get("results")
        .ok_or_else(|| BackendError::invalid("missing results"))?;

    let raw: &[Value] = match results {
        Value::Object(map) => match map.get("chunk_search_results") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(Value::Null) | None => &[],
            Some(_) => return Err(BackendError::invalid("chunk_search_results is not an array")),
        },
        Value::Array(items) => items.as_slice(),
        _ => return Err(BackendError::invalid("results is neither an object nor an array")),
    };

    raw.iter()
        .map(|item| {
            let hit: RawHit = serde_json::from_value(item.clone())
                .map_err(|e| BackendError::invalid(format!("malformed hit: {}", e)))?;
            let mut metadata = HitMetadata::from_value(&hit.metadata);
            if metadata.document_id.is_none() {
                metadata.document_id = hit
                    .document_id
                    .as_ref()
                    .and_then(|v| HitMetadata::from_value(&json!({ "document_id": v })).document_id);
            }
            Ok(SearchHit {
                text: hit.text,
                score: hit.score.unwrap_or(0.0),
                metadata,
            })
        })
        .collect()
}
