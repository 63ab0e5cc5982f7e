//! TOML configuration for the search pipeline.
//!
//! All settings are read from a single file (default
//! `./config/citegate.toml`). Secrets may be left out of the file and
//! supplied through the environment instead:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `CITEGATE_BEARER_TOKEN` | `[search].bearer_token` |
//! | `CITEGATE_LDAP_BIND_PASSWORD` | `[directory].bind_password` |
//!
//! # Example
//!
//! ```toml
//! [search]
//! api_url = "http://r2r.internal:7272/v3/retrieval/search"
//! collections_api_url = "http://r2r.internal:7272/v3/collections/name"
//!
//! [directory]
//! server_uri = "ldap://ad.internal:389"
//! bind_user = "svc-search@corp.example"
//! search_base = "DC=corp,DC=example"
//!
//! [links]
//! nextcloud_base_url = "https://cloud.corp.example"
//! ```

use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const BEARER_TOKEN_ENV: &str = "CITEGATE_BEARER_TOKEN";
pub const BIND_PASSWORD_ENV: &str = "CITEGATE_LDAP_BIND_PASSWORD";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub search: SearchConfig,
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub results: ResultsConfig,
    pub links: LinksConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A configuration value that must never show up in logs.
#[derive(Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        self.0.trim()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Secret(<empty>)")
        } else {
            f.write_str("Secret(<redacted>)")
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub api_url: String,
    pub collections_api_url: String,
    #[serde(default)]
    pub bearer_token: Secret,
    #[serde(default = "default_owner_id")]
    pub default_owner_id: String,
    #[serde(default = "default_true")]
    pub use_hybrid_search: bool,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_collection_timeout_secs")]
    pub collection_timeout_secs: u64,
}

fn default_owner_id() -> String {
    "00000000-0000-0000-0000-000000000000".to_string()
}
fn default_true() -> bool {
    true
}
fn default_search_limit() -> u32 {
    10
}
fn default_search_timeout_secs() -> u64 {
    30
}
fn default_collection_timeout_secs() -> u64 {
    10
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn collection_timeout(&self) -> Duration {
        Duration::from_secs(self.collection_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DirectoryConfig {
    pub server_uri: String,
    #[serde(default)]
    pub bind_user: String,
    #[serde(default)]
    pub bind_password: Secret,
    pub search_base: String,
    #[serde(default = "default_user_filter")]
    pub user_filter: String,
    #[serde(default = "default_guid_attribute")]
    pub guid_attribute: String,
    #[serde(default = "default_directory_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_user_filter() -> String {
    "(mail={email})".to_string()
}
fn default_guid_attribute() -> String {
    "objectGUID".to_string()
}
fn default_directory_timeout_secs() -> u64 {
    10
}

impl DirectoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PermissionsConfig {
    /// Turning this off skips identity resolution entirely. Never disable it
    /// outside of test deployments.
    #[serde(default = "default_true")]
    pub enforce: bool,
    #[serde(default)]
    pub default_collection_id: Option<String>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            enforce: true,
            default_collection_id: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResultsConfig {
    #[serde(default = "default_max_chunks_in_context")]
    pub max_chunks_in_context: usize,
    #[serde(default = "default_max_chars_per_chunk")]
    pub max_chars_per_chunk: usize,
    #[serde(default)]
    pub min_relevance_score: f64,
    #[serde(default = "default_true")]
    pub include_metadata: bool,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            max_chunks_in_context: default_max_chunks_in_context(),
            max_chars_per_chunk: default_max_chars_per_chunk(),
            min_relevance_score: 0.0,
            include_metadata: true,
        }
    }
}

fn default_max_chunks_in_context() -> usize {
    8
}
fn default_max_chars_per_chunk() -> usize {
    1200
}

#[derive(Debug, Deserialize, Clone)]
pub struct LinksConfig {
    pub nextcloud_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
        }
    }
}

fn default_min_chars() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    apply_env_secrets(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;

    Ok(config)
}

/// Parse without touching the environment or validating.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Fill secrets that are missing from the file from the environment.
///
/// Values present in the file take precedence.
pub fn apply_env_secrets<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if config.search.bearer_token.is_empty() {
        if let Some(token) = lookup(BEARER_TOKEN_ENV) {
            config.search.bearer_token = Secret::new(token);
        }
    }
    if config.directory.bind_password.is_empty() {
        if let Some(password) = lookup(BIND_PASSWORD_ENV) {
            config.directory.bind_password = Secret::new(password);
        }
    }
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate search backend
    validate_http_url("search.api_url", &config.search.api_url)?;
    validate_http_url(
        "search.collections_api_url",
        &config.search.collections_api_url,
    )?;

    if config.search.bearer_token.is_empty() {
        bail!(
            "search.bearer_token is required (set it in the config or via {})",
            BEARER_TOKEN_ENV
        );
    }

    if !(1..=100).contains(&config.search.limit) {
        bail!("search.limit must be in [1, 100]");
    }

    if !(5..=300).contains(&config.search.timeout_secs) {
        bail!("search.timeout_secs must be in [5, 300]");
    }

    if config.search.collection_timeout_secs == 0 {
        bail!("search.collection_timeout_secs must be > 0");
    }

    // Validate directory
    if config.permissions.enforce {
        if !config.directory.server_uri.starts_with("ldap://")
            && !config.directory.server_uri.starts_with("ldaps://")
        {
            bail!(
                "directory.server_uri must start with ldap:// or ldaps://, got '{}'",
                config.directory.server_uri
            );
        }
        if !config.directory.user_filter.contains("{email}") {
            bail!("directory.user_filter must contain the {{email}} placeholder");
        }
        if config.directory.guid_attribute.trim().is_empty() {
            bail!("directory.guid_attribute must not be empty");
        }
        if config.directory.timeout_secs == 0 {
            bail!("directory.timeout_secs must be > 0");
        }
    }

    // Validate result bounds
    if !(1..=20).contains(&config.results.max_chunks_in_context) {
        bail!("results.max_chunks_in_context must be in [1, 20]");
    }

    if !(100..=5000).contains(&config.results.max_chars_per_chunk) {
        bail!("results.max_chars_per_chunk must be in [100, 5000]");
    }

    if !(0.0..=1.0).contains(&config.results.min_relevance_score) {
        bail!("results.min_relevance_score must be in [0.0, 1.0]");
    }

    validate_http_url("links.nextcloud_base_url", &config.links.nextcloud_base_url)?;

    Ok(())
}

fn validate_http_url(key: &str, value: &str) -> Result<()> {
    let url = Url::parse(value.trim())
        .with_context(|| format!("{} is not a valid URL: '{}'", key, value))?;
    match url.scheme() {
        "http" | "https" => {}
        other => bail!("{} must use http or https, got '{}'", key, other),
    }
    if url.host_str().is_none() {
        bail!("{} must include a host", key);
    }
    Ok(())
}
