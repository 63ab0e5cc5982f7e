//! Citation derivation from opaque hit metadata.
//!
//! Both the citation id and the file id are picked by walking an ordered
//! rule table; the first rule that yields a value wins. Keeping the rules as
//! data makes the precedence visible in one place and testable per rule.
//!
//! | Citation id precedence | File id patterns (on `filename`) |
//! |------------------------|----------------------------------|
//! | `title`                | `<namespace>:<digits>` (suffix after the last `:`) |
//! | `source`               | `files_<digits>` |
//! | `filename`             | `<digits>` |
//! | `"Untitled"`           | |

use reqwest::Url;

use crate::models::{Citation, HitMetadata};

/// Placeholder used when no metadata field names the document.
pub const UNTITLED: &str = "Untitled";

type IdRule = (&'static str, fn(&HitMetadata) -> Option<&str>);
type FileIdRule = (&'static str, fn(&str) -> Option<&str>);

const CITATION_ID_RULES: &[IdRule] = &[
    ("title", title_field),
    ("source", source_field),
    ("filename", filename_field),
];

const FILE_ID_RULES: &[FileIdRule] = &[
    ("namespaced", namespaced_id),
    ("files_prefixed", files_prefixed_id),
    ("bare", bare_id),
];

fn title_field(meta: &HitMetadata) -> Option<&str> {
    meta.title.as_deref()
}

fn source_field(meta: &HitMetadata) -> Option<&str> {
    meta.source.as_deref()
}

fn filename_field(meta: &HitMetadata) -> Option<&str> {
    meta.filename.as_deref()
}

fn namespaced_id(filename: &str) -> Option<&str> {
    let (_, suffix) = filename.rsplit_once(':')?;
    digits(suffix.trim())
}

fn files_prefixed_id(filename: &str) -> Option<&str> {
    digits(filename.strip_prefix("files_")?)
}

fn bare_id(filename: &str) -> Option<&str> {
    digits(filename)
}

fn digits(s: &str) -> Option<&str> {
    (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())).then_some(s)
}

/// Choose the human-readable citation id. Never returns an empty string.
pub fn citation_id(meta: &HitMetadata) -> String {
    CITATION_ID_RULES
        .iter()
        .find_map(|(_, field)| field(meta).map(str::trim).filter(|v| !v.is_empty()))
        .unwrap_or(UNTITLED)
        .to_string()
}

/// Extract the numeric file id embedded in the `filename` field.
pub fn file_id(meta: &HitMetadata) -> Option<String> {
    let filename = meta.filename.as_deref()?.trim();
    FILE_ID_RULES
        .iter()
        .find_map(|(_, rule)| rule(filename))
        .map(str::to_string)
}

/// Build `<base>/f/<file_id>`, or `None` if the result would not be an
/// absolute http(s) URL.
pub fn file_link(base_url: &str, file_id: &str) -> Option<String> {
    let base = base_url.trim().trim_end_matches('/');
    let link = format!("{}/f/{}", base, file_id);
    let parsed = Url::parse(&link).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    Some(link)
}

/// Derive the full citation for a hit. Missing or unparseable file ids
/// degrade to a citation without a link.
pub fn derive(meta: &HitMetadata, base_url: &str) -> Citation {
    let citation_id = citation_id(meta);
    let file_id = file_id(meta);
    let link = file_id.as_deref().and_then(|id| file_link(base_url, id));
    if file_id.is_some() && link.is_none() {
        tracing::debug!(citation_id = %citation_id, "file link unresolvable, citing without link");
    }
    Citation {
        citation_id,
        file_id,
        link,
    }
}
