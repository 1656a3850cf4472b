//! Prompts sent to LM providers.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the requested output shape
//!    means editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without a
//!    live provider, making prompt regressions easy to catch.

use crate::report::{CategoryDescriptor, DocumentMeta};

/// System prompt for the full document analysis call.
pub const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are a careful PDF text analyst. Given the document content and metadata, \
determine its volume, overall text complexity, topics, and category, and \
return strictly valid JSON matching the requested shape. Do not use Markdown; \
return exactly one JSON object and nothing else.";

/// System prompt for the classify-or-create-category call.
pub const CATEGORY_SYSTEM_PROMPT: &str = "\
You classify documents into an existing category or define a new one. \
Return strictly valid JSON with the fields: decision \
(matched_existing|created_new), category {label, score, basis, keywords}, \
existing_label, new_category_def {label, description, keywords}. Return \
exactly one JSON object and nothing else.";

/// Build the user prompt for the analysis call.
///
/// `text` is the first page only (token-cost bound); the prompt says so,
/// and points the model at the metadata for whole-document numbers so it
/// does not extrapolate page or byte counts from one page of prose.
pub fn build_analysis_prompt(text: &str, meta: &DocumentMeta, text_limit: usize) -> String {
    let meta_json = serde_json::to_string(meta).unwrap_or_else(|_| "{}".into());
    format!(
        "Input for PDF analysis.\n\
         Important: TEXT is only the first page of the document.\n\
         Estimate volume and reading time from META; when word_count_hint is \
         present treat it as the primary source of truth.\n\
         Do not invent page_count or byte_size — use the META values or null.\n\
         Also determine the document category from TEXT and/or \
         META.source_name (file name or last URL segment).\n\
         Return the fields: doc_language, volume {{word_count, char_count, \
         page_count, byte_size, reading_time_min, method}}, complexity \
         {{score 0-100, level, estimated_grade, drivers, notes}}, topics \
         (array, max 6, each {{label, score, keywords, rationale}}), category \
         {{label, score, basis, keywords}}, limitations \
         {{short_or_noisy_input, comments}}.\n\n\
         TEXT (first page, may be truncated):\n{}\n\n\
         META (JSON):\n{}",
        truncate(text, text_limit),
        meta_json
    )
}

/// Build the user prompt for the category decision call.
pub fn build_category_prompt(
    text: &str,
    meta: &DocumentMeta,
    existing: &[CategoryDescriptor],
    text_limit: usize,
) -> String {
    let meta_json = serde_json::to_string(meta).unwrap_or_else(|_| "{}".into());
    let existing_json = serde_json::to_string(existing).unwrap_or_else(|_| "[]".into());
    format!(
        "Decide whether this document belongs to one of the existing \
         categories; if none fits, define a new category.\n\
         When matching an existing category set decision=matched_existing and \
         existing_label to its label; otherwise set decision=created_new and \
         fill new_category_def.\n\n\
         EXISTING CATEGORIES (JSON):\n{}\n\n\
         TEXT (first page, may be truncated):\n{}\n\n\
         META (JSON):\n{}",
        existing_json,
        truncate(text, text_limit),
        meta_json
    )
}

/// Truncate on a char boundary — documents are multi-lingual and a byte
/// slice could split a code point.
fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_prompt_embeds_meta() {
        let meta = DocumentMeta {
            page_count: Some(12),
            source_name: Some("handbook.pdf".into()),
            ..Default::default()
        };
        let p = build_analysis_prompt("Hello world", &meta, 20_000);
        assert!(p.contains("Hello world"));
        assert!(p.contains("handbook.pdf"));
        assert!(p.contains("\"page_count\":12"));
    }

    #[test]
    fn prompt_truncates_on_char_boundary() {
        let text = "яблоко ".repeat(10_000);
        let p = build_analysis_prompt(&text, &DocumentMeta::default(), 100);
        // The embedded text must be cut to 100 chars, not explode mid-code-point.
        assert!(p.len() < text.len());
    }

    #[test]
    fn category_prompt_lists_existing() {
        let existing = vec![crate::report::CategoryDescriptor {
            label: "Science".into(),
            description: Some("research papers".into()),
            keywords: vec!["research".into()],
        }];
        let p = build_category_prompt("text", &DocumentMeta::default(), &existing, 1000);
        assert!(p.contains("Science"));
        assert!(p.contains("matched_existing"));
    }
}
