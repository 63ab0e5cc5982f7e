//! Core data models used throughout the search pipeline.
//!
//! Every type here is request-scoped: it is created while a single search
//! runs and dropped when that search returns. Nothing is cached or persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw query input split into what to search for and how to present it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub search_terms: String,
    /// Presentation directive for the downstream model; empty when absent.
    pub instructions: String,
}

impl ParsedQuery {
    pub fn new(search_terms: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            search_terms: search_terms.into().trim().to_string(),
            instructions: instructions.into().trim().to_string(),
        }
    }

    /// The whole input becomes the search terms.
    pub fn simple(input: impl Into<String>) -> Self {
        Self::new(input, "")
    }

    pub fn has_instructions(&self) -> bool {
        !self.instructions.is_empty()
    }
}

/// The end user a search runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub email: String,
}

impl UserIdentity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

/// Directory-assigned stable identifier for a user, uppercase hyphenated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AuthorizationScope {
    guid: String,
}

impl AuthorizationScope {
    /// Build a scope from an already normalized identifier.
    pub fn new(guid: impl AsRef<str>) -> Self {
        Self {
            guid: guid.as_ref().trim().to_uppercase(),
        }
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }
}

/// Outcome of resolving an email against the directory.
///
/// Only [`ScopeLookup::Resolved`] ever grants anything. The other variants
/// differ for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeLookup {
    Resolved(AuthorizationScope),
    /// No entry, or an entry without a usable scope attribute.
    NotFound,
    /// More than one directory entry matched the email.
    Ambiguous,
    /// Directory unreachable, bind failed, or the lookup timed out.
    Unavailable,
}

/// The search-backend constraint for one request.
///
/// `granted == false` means the request yields nothing, whatever else
/// happens downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionFilter {
    pub collection_id: Option<String>,
    pub granted: bool,
}

impl CollectionFilter {
    pub fn granted(collection_id: Option<String>) -> Self {
        Self {
            collection_id,
            granted: true,
        }
    }

    pub fn denied() -> Self {
        Self {
            collection_id: None,
            granted: false,
        }
    }
}

/// One search call, built once and sent once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub filter: CollectionFilter,
    pub limit: u32,
    pub use_hybrid: bool,
    /// Relevance threshold in force for this request. Recorded for
    /// diagnostics only: the backend takes no threshold, and hits are
    /// filtered afterwards by [`crate::results::process`].
    pub min_relevance: f64,
}

/// Metadata attached to a retrieved chunk. All fields are optional because
/// the backend passes through whatever the ingester stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HitMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
}

impl HitMetadata {
    /// Read metadata leniently from a JSON object.
    ///
    /// Blank strings count as absent. Numeric ids are accepted as strings,
    /// and numeric strings are accepted for `chunk_index` and `page`.
    pub fn from_value(value: &Value) -> Self {
        Self {
            title: string_field(value, "title"),
            source: string_field(value, "source"),
            filename: string_field(value, "filename"),
            document_id: string_field(value, "document_id"),
            chunk_index: int_field(value, "chunk_index"),
            page: int_field(value, "page").or_else(|| int_field(value, "page_number")),
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int_field(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One retrieved chunk, in backend relevance order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub score: f64,
    pub metadata: HitMetadata,
}

/// A stable, human-readable reference to a retrieved chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    /// Never empty.
    pub citation_id: String,
    pub file_id: Option<String>,
    /// Absolute URL or `None`, never a partial string.
    pub link: Option<String>,
}

/// A hit that survived processing, paired with its citation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitedChunk {
    pub citation: Citation,
    /// Text clipped to the configured per-chunk limit.
    pub text: String,
    pub score: f64,
    pub metadata: HitMetadata,
}

/// Output of the result processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessedResults {
    /// Hits that passed the relevance filter, before bounding.
    pub matched: usize,
    pub chunks: Vec<CitedChunk>,
}

/// The terminal artifact handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    /// Parallel to the chunks rendered into `text`, in the same order.
    pub sources: Vec<Citation>,
}
