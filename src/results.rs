//! Result processing: filter, bound, clip and cite retrieved hits.
//!
//! 1. Drop hits scoring below `min_relevance_score`.
//! 2. Keep the `max_chunks_in_context` best hits; ties keep backend order.
//! 3. Clip each text to `max_chars_per_chunk` characters on a word boundary.
//! 4. Derive a [`Citation`](crate::models::Citation) for each survivor.

use std::cmp::Ordering;

use crate::citation;
use crate::config::ResultsConfig;
use crate::models::{CitedChunk, ProcessedResults, SearchHit};

const ELLIPSIS: &str = "...";
/// Longest `[...]` span still treated as a citation marker.
const MAX_MARKER_CHARS: usize = 120;

#[derive(Debug, Clone)]
pub struct ResultSettings {
    pub min_relevance_score: f64,
    pub max_chunks_in_context: usize,
    pub max_chars_per_chunk: usize,
    pub nextcloud_base_url: String,
}

impl ResultSettings {
    pub fn new(results: &ResultsConfig, nextcloud_base_url: &str) -> Self {
        Self {
            min_relevance_score: results.min_relevance_score,
            max_chunks_in_context: results.max_chunks_in_context,
            max_chars_per_chunk: results.max_chars_per_chunk,
            nextcloud_base_url: nextcloud_base_url.to_string(),
        }
    }
}

pub fn process(hits: Vec<SearchHit>, settings: &ResultSettings) -> ProcessedResults {
    let mut relevant: Vec<SearchHit> = hits
        .into_iter()
        .filter(|hit| hit.score >= settings.min_relevance_score)
        .collect();
    let matched = relevant.len();

    // sort_by is stable, so equal scores keep backend order.
    relevant.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    relevant.truncate(settings.max_chunks_in_context);

    let chunks = relevant
        .into_iter()
        .map(|hit| CitedChunk {
            citation: citation::derive(&hit.metadata, &settings.nextcloud_base_url),
            text: clip(hit.text.trim(), settings.max_chars_per_chunk),
            score: hit.score,
            metadata: hit.metadata,
        })
        .collect();

    ProcessedResults { matched, chunks }
}

/// Clip `text` to at most `max_chars` characters, ellipsis included.
///
/// Cuts at the last whitespace inside the budget when there is one in its
/// second half, and never inside an unclosed `[...]` marker.
pub fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let budget = max_chars.saturating_sub(ELLIPSIS.len());
    if budget == 0 {
        return ELLIPSIS.chars().take(max_chars).collect();
    }

    let hard_end = text
        .char_indices()
        .nth(budget)
        .map_or(text.len(), |(idx, _)| idx);
    let window = &text[..hard_end];

    let mut end = match window.rfind(char::is_whitespace) {
        Some(idx) if window[..idx].chars().count() >= budget / 2 => idx,
        _ => hard_end,
    };

    if let Some(open_idx) = unclosed_marker(text, &window[..end]) {
        end = open_idx;
    }

    let mut clipped = text[..end].trim_end().to_string();
    clipped.push_str(ELLIPSIS);
    clipped
}

/// Byte offset of a `[...]` marker that `head` would cut in half, if backing
/// off to it is worth it.
///
/// Only a marker that closes within [`MAX_MARKER_CHARS`] counts. A stray `[`
/// is ignored unless backing off still keeps half of `head`.
fn unclosed_marker(text: &str, head: &str) -> Option<usize> {
    let open_idx = head.rfind('[')?;
    if head[open_idx..].contains(']') {
        return None;
    }
    let closes_soon = text[open_idx..]
        .find(']')
        .is_some_and(|rel| text[open_idx..open_idx + rel].chars().count() <= MAX_MARKER_CHARS);
    let keeps_half = head[..open_idx].chars().count() >= head.chars().count() / 2;
    (closes_soon || keeps_half).then_some(open_idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HitMetadata;

    fn hit(title: &str, score: f64, text: &str) -> SearchHit {
        SearchHit {
            text: text.to_string(),
            score,
            metadata: HitMetadata {
                title: Some(title.to_string()),
                ..Default::default()
            },
        }
    }

    fn settings(min: f64, max_chunks: usize, max_chars: usize) -> ResultSettings {
        ResultSettings {
            min_relevance_score: min,
            max_chunks_in_context: max_chunks,
            max_chars_per_chunk: max_chars,
            nextcloud_base_url: "https://cloud.example.com".to_string(),
        }
    }

    fn titles(results: &ProcessedResults) -> Vec<&str> {
        results
            .chunks
            .iter()
            .map(|c| c.citation.citation_id.as_str())
            .collect()
    }

    #[test]
    fn test_relevance_filter() {
        let out = process(
            vec![hit("Doc A", 0.9, "a"), hit("Doc B", 0.1, "b")],
            &settings(0.3, 8, 1200),
        );
        assert_eq!(out.matched, 1);
        assert_eq!(titles(&out), ["Doc A"]);
    }

    #[test]
    fn test_bound_keeps_best_and_is_stable_on_ties() {
        let out = process(
            vec![
                hit("low", 0.2, ""),
                hit("tie-1", 0.7, ""),
                hit("top", 0.9, ""),
                hit("tie-2", 0.7, ""),
            ],
            &settings(0.0, 3, 1200),
        );
        assert_eq!(out.matched, 4);
        assert_eq!(titles(&out), ["top", "tie-1", "tie-2"]);
    }

    #[test]
    fn test_nothing_passes() {
        let out = process(vec![hit("a", 0.1, "x")], &settings(0.5, 8, 1200));
        assert_eq!(out.matched, 0);
        assert!(out.chunks.is_empty());
    }

    #[test]
    fn test_chunks_respect_char_limit() {
        let long = "lorem ipsum dolor ".repeat(50);
        let out = process(vec![hit("a", 1.0, &long)], &settings(0.0, 8, 100));
        let text = &out.chunks[0].text;
        assert!(text.chars().count() <= 100);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_clip_short_text_untouched() {
        assert_eq!(clip("short text", 100), "short text");
    }

    #[test]
    fn test_clip_on_word_boundary() {
        let clipped = clip("alpha beta gamma delta epsilon", 20);
        assert_eq!(clipped, "alpha beta gamma...");
        assert!(clipped.chars().count() <= 20);
    }

    #[test]
    fn test_clip_without_whitespace_cuts_hard() {
        let clipped = clip(&"x".repeat(50), 10);
        assert_eq!(clipped, "xxxxxxx...");
    }

    #[test]
    fn test_clip_avoids_open_citation_marker() {
        let text = "numbers [Quarterly Report 2024] here";
        let clipped = clip(text, 25);
        assert_eq!(clipped, "numbers...");
    }

    #[test]
    fn test_clip_ignores_stray_bracket_near_start() {
        let text = format!("See [appendix notes {}", "word ".repeat(400));
        let clipped = clip(&text, 1200);
        assert!(clipped.chars().count() <= 1200);
        assert!(clipped.chars().count() > 1100);
        assert!(clipped.starts_with("See [appendix notes word"));
        assert!(clipped.ends_with("word..."));

        let text = format!("[draft {}", "policy text ".repeat(300));
        let clipped = clip(&text, 1200);
        assert!(clipped.chars().count() > 1100);
        assert!(clipped.starts_with("[draft policy"));
    }

    #[test]
    fn test_clip_backs_off_late_unclosed_bracket() {
        let text = format!("{}[note that never closes", "word ".repeat(20));
        let clipped = clip(&text, 110);
        assert_eq!(clipped, format!("{}...", "word ".repeat(20).trim_end()));
    }

    #[test]
    fn test_clip_counts_chars_not_bytes() {
        let text = "äöü ".repeat(40);
        let clipped = clip(&text, 20);
        assert!(clipped.chars().count() <= 20);
        assert!(clipped.starts_with("äöü"));
    }

    #[test]
    fn test_citations_attached() {
        let mut h = hit("Doc A", 0.9, "a");
        h.metadata.filename = Some("files__default:8060008".to_string());
        let out = process(vec![h], &settings(0.0, 8, 1200));
        assert_eq!(
            out.chunks[0].citation.link.as_deref(),
            Some("https://cloud.example.com/f/8060008")
        );
    }
}
