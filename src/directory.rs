//! Identity resolution: email → authorization scope via the directory.
//!
//! [`IdentityResolver`] enforces the request-level contract (email sanity,
//! one round trip, timeout, ambiguity handling, scope normalization).
//! [`DirectoryClient`] is the single-method seam to the directory itself;
//! [`LdapDirectory`] is the production implementation.
//!
//! # Normalization
//!
//! The scope attribute is read as:
//! - 16 raw bytes → UUID, rendered uppercase and hyphenated;
//! - text → optional `{}` braces stripped, parsed as a UUID, uppercased.
//!
//! Anything else is treated as "no scope", never as a guessed value.

use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::time::Duration;
use uuid::Uuid;

use crate::config::{DirectoryConfig, Secret};
use crate::error::DirectoryError;
use crate::models::{AuthorizationScope, ScopeLookup};

const UNBIND_TIMEOUT: Duration = Duration::from_secs(1);

/// Raw value of the scope attribute as the directory returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeValue {
    Binary(Vec<u8>),
    Text(String),
}

/// One directory entry matched by the email filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryEntry {
    /// `None` when the entry lacks the configured scope attribute.
    pub scope: Option<ScopeValue>,
}

/// Seam to the directory service.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Issue one filtered lookup for `email` and return every matching entry.
    async fn lookup_scope(&self, email: &str) -> Result<Vec<DirectoryEntry>, DirectoryError>;
}

/// Request-level identity resolution on top of a [`DirectoryClient`].
pub struct IdentityResolver<'a> {
    client: &'a dyn DirectoryClient,
    timeout: Duration,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(client: &'a dyn DirectoryClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Resolve `email` to a scope. Never fabricates a scope: every failure
    /// mode maps to a non-`Resolved` variant.
    pub async fn resolve(&self, email: &str) -> ScopeLookup {
        let email = email.trim();
        if !is_plausible_email(email) {
            tracing::debug!("identity missing or malformed, skipping directory lookup");
            return ScopeLookup::NotFound;
        }

        let entries = match tokio::time::timeout(self.timeout, self.client.lookup_scope(email)).await
        {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "directory lookup failed");
                return ScopeLookup::Unavailable;
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "directory lookup timed out");
                return ScopeLookup::Unavailable;
            }
        };

        match entries.as_slice() {
            [] => ScopeLookup::NotFound,
            [entry] => match entry.scope.as_ref().and_then(normalize_scope) {
                Some(scope) => ScopeLookup::Resolved(scope),
                None => {
                    tracing::warn!("directory entry has no usable scope attribute");
                    ScopeLookup::NotFound
                }
            },
            many => {
                tracing::warn!(matches = many.len(), "email matched multiple directory entries");
                ScopeLookup::Ambiguous
            }
        }
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
        None => false,
    }
}

/// Normalize a raw scope attribute into an [`AuthorizationScope`].
pub fn normalize_scope(value: &ScopeValue) -> Option<AuthorizationScope> {
    let uuid = match value {
        ScopeValue::Binary(bytes) => Uuid::from_slice(bytes).ok()?,
        ScopeValue::Text(text) => {
            let cleaned = text.trim().trim_start_matches('{').trim_end_matches('}').trim();
            match Uuid::parse_str(cleaned) {
                Ok(uuid) => uuid,
                // Binary GUIDs that happen to be valid UTF-8 arrive as text.
                Err(_) if text.len() == 16 => Uuid::from_slice(text.as_bytes()).ok()?,
                Err(_) => return None,
            }
        }
    };
    Some(AuthorizationScope::new(uuid.hyphenated().to_string()))
}

// ============ LDAP implementation ============

/// Directory client backed by LDAP / Active Directory.
///
/// Binds with a fixed service account, never the end user's credentials.
/// The connection lives for exactly one lookup and is unbound on every exit
/// path.
pub struct LdapDirectory {
    server_uri: String,
    bind_user: String,
    bind_password: Secret,
    search_base: String,
    user_filter: String,
    scope_attribute: String,
    timeout: Duration,
}

impl LdapDirectory {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            server_uri: config.server_uri.clone(),
            bind_user: config.bind_user.clone(),
            bind_password: config.bind_password.clone(),
            search_base: config.search_base.clone(),
            user_filter: config.user_filter.clone(),
            scope_attribute: config.guid_attribute.clone(),
            timeout: config.timeout(),
        }
    }

    async fn search_entries(
        &self,
        ldap: &mut ldap3::Ldap,
        email: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        ldap.simple_bind(&self.bind_user, self.bind_password.expose())
            .await
            .and_then(|r| r.success())
            .map_err(DirectoryError::Bind)?;

        let filter = render_filter(&self.user_filter, email);
        let (entries, _) = ldap
            .search(
                &self.search_base,
                Scope::Subtree,
                &filter,
                vec![self.scope_attribute.as_str(), "mail"],
            )
            .await
            .and_then(|r| r.success())
            .map_err(DirectoryError::Search)?;

        Ok(entries
            .into_iter()
            .map(|raw| scope_from_entry(&SearchEntry::construct(raw), &self.scope_attribute))
            .collect())
    }
}

#[async_trait]
impl DirectoryClient for LdapDirectory {
    async fn lookup_scope(&self, email: &str) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.server_uri)
            .await
            .map_err(DirectoryError::Connect)?;

        let driver = tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::debug!(error = %e, "directory connection closed with error");
            }
        });

        let result = tokio::time::timeout(self.timeout, self.search_entries(&mut ldap, email))
            .await
            .unwrap_or(Err(DirectoryError::Timeout));

        // Release on success and failure alike.
        match tokio::time::timeout(UNBIND_TIMEOUT, ldap.unbind()).await {
            Ok(Err(e)) => tracing::debug!(error = %e, "directory unbind failed"),
            Err(_) => tracing::debug!("directory unbind timed out"),
            Ok(Ok(())) => {}
        }
        driver.abort();

        result
    }
}

/// Substitute the escaped email into the configured filter template.
pub fn render_filter(template: &str, email: &str) -> String {
    template.replace("{email}", &ldap3::ldap_escape(email))
}

fn scope_from_entry(entry: &SearchEntry, attribute: &str) -> DirectoryEntry {
    let binary = find_attr(&entry.bin_attrs, attribute)
        .and_then(|values| values.first())
        .map(|bytes| ScopeValue::Binary(bytes.clone()));
    let text = || {
        find_attr(&entry.attrs, attribute)
            .and_then(|values| values.first())
            .map(|s| ScopeValue::Text(s.clone()))
    };
    DirectoryEntry {
        scope: binary.or_else(text),
    }
}

/// Attribute names are case-insensitive in LDAP.
fn find_attr<'e, V>(
    attrs: &'e std::collections::HashMap<String, V>,
    name: &str,
) -> Option<&'e V> {
    attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}
