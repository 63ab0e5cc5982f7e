//! Collection resolution: authorization scope → search collection filter.
//!
//! The permission policy is a closed set of two variants so every caller has
//! to handle the bypass case explicitly. [`PermissionPolicy::Enforced`] is
//! the default and fails closed on every ambiguity or error.

use std::time::Duration;

use crate::backend::CollectionClient;
use crate::config::PermissionsConfig;
use crate::error::DenialReason;
use crate::models::{CollectionFilter, ScopeLookup};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionPolicy {
    /// Resolve the caller's collection through the directory and backend.
    Enforced,
    /// Skip identity resolution and grant the configured default collection
    /// (or an unfiltered search when there is none). For non-production
    /// testing only.
    Bypass { default_collection_id: Option<String> },
}

impl PermissionPolicy {
    pub fn from_config(config: &PermissionsConfig) -> Self {
        if config.enforce {
            PermissionPolicy::Enforced
        } else {
            PermissionPolicy::Bypass {
                default_collection_id: config
                    .default_collection_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(String::from),
            }
        }
    }

    pub fn is_enforced(&self) -> bool {
        matches!(self, PermissionPolicy::Enforced)
    }
}

pub struct CollectionResolver<'a> {
    client: &'a dyn CollectionClient,
    timeout: Duration,
}

impl<'a> CollectionResolver<'a> {
    pub fn new(client: &'a dyn CollectionClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Turn an identity outcome into a collection filter.
    ///
    /// Under [`PermissionPolicy::Enforced`] at most one backend lookup is
    /// made, and only for a resolved scope. Backend errors are treated like
    /// a miss.
    pub async fn resolve(&self, lookup: &ScopeLookup, policy: &PermissionPolicy) -> CollectionFilter {
        let scope = match (policy, lookup) {
            (PermissionPolicy::Bypass { default_collection_id }, _) => {
                tracing::warn!("permission enforcement disabled, using default collection");
                return CollectionFilter::granted(default_collection_id.clone());
            }
            (PermissionPolicy::Enforced, ScopeLookup::Resolved(scope)) => scope,
            (PermissionPolicy::Enforced, ScopeLookup::NotFound) => {
                return deny(DenialReason::IdentityNotFound)
            }
            (PermissionPolicy::Enforced, ScopeLookup::Ambiguous) => {
                return deny(DenialReason::IdentityAmbiguous)
            }
            (PermissionPolicy::Enforced, ScopeLookup::Unavailable) => {
                return deny(DenialReason::IdentityUnavailable)
            }
        };

        match tokio::time::timeout(self.timeout, self.client.lookup_collection(scope)).await {
            Ok(Ok(Some(collection_id))) => {
                tracing::debug!(scope = %scope.guid(), %collection_id, "collection resolved");
                CollectionFilter::granted(Some(collection_id))
            }
            Ok(Ok(None)) => deny(DenialReason::NoCollection),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "collection lookup failed");
                deny(DenialReason::CollectionLookupFailed)
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "collection lookup timed out");
                deny(DenialReason::CollectionLookupFailed)
            }
        }
    }
}

fn deny(reason: DenialReason) -> CollectionFilter {
    tracing::warn!(%reason, "access denied");
    CollectionFilter::denied()
}
