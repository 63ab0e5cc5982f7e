//! Error taxonomy.
//!
//! Client errors ([`DirectoryError`], [`BackendError`]) stay inside the
//! pipeline. Callers only ever see [`PipelineError`], where every
//! authorization failure has been collapsed into
//! [`PipelineError::AccessDenied`] so that "directory down" and "no such
//! account" are indistinguishable from the outside.

use std::fmt;

/// Failures talking to the directory service.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory connection failed: {0}")]
    Connect(#[source] ldap3::LdapError),
    #[error("directory bind failed: {0}")]
    Bind(#[source] ldap3::LdapError),
    #[error("directory search failed: {0}")]
    Search(#[source] ldap3::LdapError),
    #[error("directory lookup timed out")]
    Timeout,
}

/// Failures talking to the search backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid backend response: {message}")]
    InvalidResponse { message: String },
    #[error("backend call timed out")]
    Timeout,
}

impl BackendError {
    /// Build a status error, keeping only a bounded prefix of the body.
    pub fn status(status: u16, body: &str) -> Self {
        BackendError::Status {
            status,
            body: body.chars().take(500).collect(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        BackendError::InvalidResponse {
            message: message.into(),
        }
    }
}

/// Why a request was denied. Logged, never returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    IdentityUnavailable,
    IdentityNotFound,
    IdentityAmbiguous,
    NoCollection,
    CollectionLookupFailed,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenialReason::IdentityUnavailable => "identity_unavailable",
            DenialReason::IdentityNotFound => "identity_not_found",
            DenialReason::IdentityAmbiguous => "identity_ambiguous",
            DenialReason::NoCollection => "no_collection",
            DenialReason::CollectionLookupFailed => "collection_lookup_failed",
        };
        f.write_str(s)
    }
}

/// Errors surfaced to whoever called the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("search query must be at least {min} characters, got '{query}'")]
    QueryTooShort { query: String, min: usize },
    #[error("access denied")]
    AccessDenied,
    #[error("search unavailable: {0}")]
    SearchUnavailable(#[source] BackendError),
}

impl PipelineError {
    /// Machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::QueryTooShort { .. } => "bad_request",
            PipelineError::AccessDenied => "access_denied",
            PipelineError::SearchUnavailable(_) => "search_unavailable",
        }
    }

    /// Only backend outages are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::SearchUnavailable(_))
    }

    /// Text suitable for showing to the end user.
    ///
    /// Access denial and search failure read differently from each other and
    /// from the "no matching documents" context.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::QueryTooShort { query, min } => format!(
                "Search query too short: '{}'. Please use at least {} characters.",
                query, min
            ),
            PipelineError::AccessDenied => "Access denied. You are not authorized to search \
                 this document collection. Please contact your system administrator to \
                 request access."
                .to_string(),
            PipelineError::SearchUnavailable(_) => "The document search service is \
                 temporarily unavailable. Please try again later."
                .to_string(),
        }
    }
}
