//! Context assembly: processed results → text block for the downstream
//! model plus a parallel list of sources for the UI.
//!
//! The rendered block has three parts, always in this order:
//!
//! 1. the retrieved chunks, each headed by its bracketed citation id;
//! 2. fixed citation rules (no numeric `[1]` citations, cite as
//!    `[Document Title][link]`);
//! 3. the user's presentation instructions, if any, in their own section.
//!
//! An empty result set renders an explicit "no authorized documents matched"
//! notice rather than an empty string.

use crate::models::{AssembledContext, CitedChunk, HitMetadata, ProcessedResults};

const SEPARATOR: &str = "--------------------------------------------------";

const CITATION_RULES: &str = "\
## CITATION RULES (MUST FOLLOW EXACTLY)
- Cite using the exact Citation ID shown in brackets for each result, never numbers.
- WRONG: [1], [2], [3]. Numeric citations are forbidden.
- When a result has a Link, cite it as [Citation ID][Link], e.g. [Document Title][https://cloud.example.com/f/8060008].
- When a result has no Link, cite it as [Citation ID] and do not invent one.

## GROUNDING
- Answer strictly from the search results above. If they do not support an answer, reply exactly: I don't know.
- After every sentence that uses the results, append its citation.
- Begin directly with the answer text. No preface.";

const NO_MATCHES: &str = "\
The search completed, but none of the documents this user is authorized to see matched the query.
Tell the user that no matching authorized documents were found. Do not answer from general knowledge and do not invent citations.";

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    include_metadata: bool,
}

impl ContextAssembler {
    pub fn new(include_metadata: bool) -> Self {
        Self { include_metadata }
    }

    pub fn assemble(
        &self,
        search_terms: &str,
        results: &ProcessedResults,
        instructions: &str,
    ) -> AssembledContext {
        if results.chunks.is_empty() {
            return AssembledContext {
                text: format!(
                    "=== SEARCH RESULTS ===\nNo authorized documents matched the query: '{}'\n\n{}",
                    search_terms, NO_MATCHES
                ),
                sources: Vec::new(),
            };
        }

        let mut parts = vec![
            "=== SEARCH RESULTS ===".to_string(),
            format!("Search Query: {}", search_terms),
            format!(
                "Found {} authorized results (showing top {}):",
                results.matched,
                results.chunks.len()
            ),
            String::new(),
        ];

        for chunk in &results.chunks {
            parts.push(chunk_header(chunk));
            if self.include_metadata {
                if let Some(line) = metadata_line(&chunk.metadata) {
                    parts.push(line);
                }
            }
            parts.push("Content:".to_string());
            parts.push(chunk.text.clone());
            parts.push(SEPARATOR.to_string());
        }

        parts.push(String::new());
        parts.push(CITATION_RULES.to_string());

        let instructions = instructions.trim();
        if !instructions.is_empty() {
            parts.push(String::new());
            parts.push(
                "## PRESENTATION INSTRUCTIONS FROM THE USER (formatting only, not retrieved content)"
                    .to_string(),
            );
            parts.push(instructions.to_string());
        }

        AssembledContext {
            text: parts.join("\n"),
            sources: results.chunks.iter().map(|c| c.citation.clone()).collect(),
        }
    }
}

fn chunk_header(chunk: &CitedChunk) -> String {
    let citation = &chunk.citation;
    let mut header = format!("[{}] Citation ID: {}", citation.citation_id, citation.citation_id);
    if let Some(file_id) = &citation.file_id {
        header.push_str(&format!(" | File ID: {}", file_id));
    }
    if let Some(link) = &citation.link {
        header.push_str(&format!(" | Link: {}", link));
    }
    header.push_str(&format!(" | Relevance: {:.3}", chunk.score));
    header
}

fn metadata_line(meta: &HitMetadata) -> Option<String> {
    let mut fields = Vec::new();
    if let Some(v) = &meta.document_id {
        fields.push(format!("document_id: {}", v));
    }
    if let Some(v) = &meta.filename {
        fields.push(format!("filename: {}", v));
    }
    if let Some(v) = meta.chunk_index {
        fields.push(format!("chunk_index: {}", v));
    }
    if let Some(v) = meta.page {
        fields.push(format!("page: {}", v));
    }
    (!fields.is_empty()).then(|| format!("Metadata: {}", fields.join(", ")))
}
