//! Query parsing: raw input → search terms + presentation instructions.
//!
//! Input forms are tried in order and the first that matches wins:
//!
//! 1. **Structured block** fenced by `---` lines:
//!
//!    ```text
//!    ---
//!    search: "strategy frameworks"
//!    instructions: "present as a table"
//!    ---
//!    ```
//!
//! 2. **Pipe-delimited**: `strategy frameworks | present as a table`. Only the
//!    first `|` splits; later pipes stay in the instructions.
//! 3. **Natural language**: `Search for strategy frameworks. Present them as
//!    a table.` A small fixed set of directive phrases marks where the
//!    instructions begin.
//! 4. **Simple**: the whole input is the search terms.
//!
//! Parsing never fails. Empty input yields empty search terms, which the
//! pipeline rejects before any network call.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::ParsedQuery;

const BLOCK_FENCE: &str = "---";
const SEARCH_FIELD: &str = "search:";
const INSTRUCTIONS_FIELD: &str = "instructions:";

/// `Query: ... Instructions: ...` on one or more lines.
static LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*query:\s*(?P<terms>.+?)\s*instructions:\s*(?P<directive>.*)$")
        .expect("static regex")
});

/// `Search for X. Present as Y`, where the leading verb is dropped.
static SEARCH_THEN_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*(?:search\s+for|find|look\s+for)\s+(?P<terms>.+?)[.!?]\s+(?P<directive>(?:please|format|present|show|make\s+sure\s+to)\b.*)$",
    )
    .expect("static regex")
});

/// `X. Please format Y`.
static CLAUSE_THEN_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*(?P<terms>.+?)[.!?]\s+(?P<directive>(?:please|format|present|show|make\s+sure\s+to)\b.*)$",
    )
    .expect("static regex")
});

/// Parse raw user input. Always returns a usable [`ParsedQuery`].
pub fn parse(raw: &str) -> ParsedQuery {
    let input = raw.trim();
    if input.is_empty() {
        return ParsedQuery::simple("");
    }

    parse_structured_block(input)
        .or_else(|| parse_pipe_delimited(input))
        .or_else(|| parse_natural_language(input))
        .unwrap_or_else(|| ParsedQuery::simple(input))
}

fn parse_structured_block(input: &str) -> Option<ParsedQuery> {
    let body = input.strip_prefix(BLOCK_FENCE)?;
    let end = body.find(BLOCK_FENCE)?;

    let mut terms = None;
    let mut instructions = None;
    for line in body[..end].lines().map(str::trim) {
        if let Some(value) = strip_field(line, SEARCH_FIELD) {
            terms = Some(value);
        } else if let Some(value) = strip_field(line, INSTRUCTIONS_FIELD) {
            instructions = Some(value);
        }
    }

    let terms = terms.filter(|t| !t.is_empty())?;
    Some(ParsedQuery::new(terms, instructions.unwrap_or_default()))
}

fn strip_field<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let prefix = line.get(..field.len())?;
    if !prefix.eq_ignore_ascii_case(field) {
        return None;
    }
    Some(unquote(line[field.len()..].trim()))
}

fn unquote(value: &str) -> &str {
    value.trim_matches(|c| c == '"' || c == '\'').trim()
}

fn parse_pipe_delimited(input: &str) -> Option<ParsedQuery> {
    let (terms, instructions) = input.split_once('|')?;
    // Nothing before the pipe: not a confident split.
    if terms.trim().is_empty() {
        return None;
    }
    Some(ParsedQuery::new(terms, instructions))
}

fn parse_natural_language(input: &str) -> Option<ParsedQuery> {
    [&*LABELLED, &*SEARCH_THEN_DIRECTIVE, &*CLAUSE_THEN_DIRECTIVE]
        .into_iter()
        .find_map(|re| {
            let caps = re.captures(input)?;
            let terms = caps.name("terms")?.as_str().trim();
            if terms.is_empty() {
                return None;
            }
            let directive = caps.name("directive").map_or("", |m| m.as_str());
            Some(ParsedQuery::new(terms, directive))
        })
}
