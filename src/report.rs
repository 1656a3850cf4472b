//! Typed result model for the analysis pipeline.
//!
//! [`AnalysisReport`] is the wire contract callers depend on: after
//! normalization every field is present and correctly typed regardless of
//! what the LM returned. The loosely-typed LM output never decodes
//! directly into these structs — see [`crate::pipeline::normalize`] for
//! the decode-then-coerce pass that builds them.
//!
//! Two metadata types replace the original prefix-key convention:
//! [`DocumentMeta`] is the public view serialised into LM prompts, while
//! [`ReadingMetrics`] stays host-side and only feeds post-processing.

use crate::config::ReadTimeMode;
use serde::{Deserialize, Serialize};

// ── Extraction ───────────────────────────────────────────────────────────

/// Everything the extractor learned about a document.
///
/// Owned by the caller for the duration of one analysis; never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Extracted text — first page by default, possibly truncated.
    pub text: String,
    /// Prompt-safe metadata derived from the document.
    pub meta: DocumentMeta,
}

/// Metadata sent to the LM alongside the document text.
///
/// Everything here is safe to embed in a prompt. Host-side reading-time
/// internals live in [`ReadingMetrics`] instead and never reach the LM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub page_count: Option<u64>,
    pub byte_size: Option<u64>,
    /// Estimated total word count (content-based when metrics succeeded,
    /// first-page heuristic otherwise).
    pub word_count_hint: Option<u64>,
    /// ISO-639-1 code detected from the first page, when detection worked.
    pub language_hint: Option<String>,
    /// File name or last URL path segment.
    pub source_name: Option<String>,
    /// Heading-like lines from the leading pages, when enabled.
    pub toc_preview: Option<String>,
}

/// Extraction result: the document plus host-side reading metrics.
///
/// `metrics` is `None` when the content scan failed; extraction itself
/// still succeeds and the heuristic word estimate stands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub document: ExtractedDocument,
    pub metrics: Option<ReadingMetrics>,
}

// ── Reading metrics ──────────────────────────────────────────────────────

/// Pages seen per classification bucket during the accurate scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageClassCounts {
    pub text: u32,
    pub mixed: u32,
    pub slide: u32,
    pub empty: u32,
}

/// Deterministic reading-time breakdown for one document.
///
/// Recomputed per call from the document bytes; never mutated after
/// construction. Two runs over the same bytes with the same mode produce
/// identical values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingMetrics {
    pub total_minutes: f64,
    pub text_minutes: f64,
    pub nontext_minutes: f64,
    pub word_count: u64,
    pub effective_wpm: u32,
    pub page_classes: PageClassCounts,
    pub image_seconds: u64,
    pub table_seconds: u64,
    pub code_seconds: u64,
    pub slide_seconds: u64,
    /// Mode the numbers were produced under (fast mode carries no nontext
    /// time).
    pub mode: ReadTimeMode,
}

impl ReadingMetrics {
    /// Sum of all nontext seconds buckets.
    pub fn nontext_total_seconds(&self) -> u64 {
        self.image_seconds + self.table_seconds + self.code_seconds + self.slide_seconds
    }

    /// Method marker recorded in `volume.method.word_count`.
    pub fn word_count_method(&self) -> &'static str {
        match self.mode {
            ReadTimeMode::Accurate => "content_based_full_scan",
            ReadTimeMode::Fast => "content_based_fast_scan",
        }
    }
}

// ── Analysis report ──────────────────────────────────────────────────────

/// Complexity level on the five-step scale used for WPM adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl ComplexityLevel {
    /// Reading-speed multiplier applied to the base WPM.
    pub fn wpm_factor(self) -> f64 {
        match self {
            ComplexityLevel::VeryLow => 1.10,
            ComplexityLevel::Low => 1.00,
            ComplexityLevel::Medium => 0.85,
            ComplexityLevel::High => 0.70,
            ComplexityLevel::VeryHigh => 0.55,
        }
    }

    /// Parse a level from the strings LMs actually produce, including
    /// Russian labels and free spacing ("very high", "очень высокая").
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_lowercase().replace(['-', '_'], " ");
        match s.as_str() {
            "very low" | "очень низкая" | "очень низкий" => Some(Self::VeryLow),
            "low" | "низкая" | "низкий" => Some(Self::Low),
            "medium" | "average" | "средняя" | "средний" => Some(Self::Medium),
            "high" | "высокая" | "высокий" => Some(Self::High),
            "very high" | "очень высокая" | "очень высокий" => Some(Self::VeryHigh),
            _ => None,
        }
    }
}

/// How each volume number was obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMethod {
    pub word_count: String,
    pub char_count: String,
}

impl Default for VolumeMethod {
    fn default() -> Self {
        Self {
            word_count: "precomputed".into(),
            char_count: "estimated_no_spaces".into(),
        }
    }
}

/// Document volume block of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub word_count: u64,
    pub char_count: u64,
    pub page_count: Option<u64>,
    pub byte_size: Option<u64>,
    pub reading_time_min: f64,
    pub method: VolumeMethod,
}

/// Complexity block of the report. `score` is always on the 0–100 scale
/// after normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Complexity {
    pub score: u32,
    pub level: ComplexityLevel,
    pub estimated_grade: String,
    pub drivers: Vec<String>,
    pub notes: String,
}

/// One detected topic. At most six survive normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub label: String,
    pub score: f64,
    pub keywords: Vec<String>,
    pub rationale: String,
}

/// Assigned category with the basis the assignment rests on
/// ("llm", "filename", "none", "unknown").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    pub score: f64,
    pub basis: String,
    pub keywords: Vec<String>,
}

impl Category {
    /// The neutral category used when nothing better is known.
    pub fn uncategorized() -> Self {
        Self {
            label: "uncategorized".into(),
            score: 0.0,
            basis: "none".into(),
            keywords: Vec::new(),
        }
    }
}

/// Caveats block of the report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Limitations {
    pub short_or_noisy_input: bool,
    pub comments: String,
}

/// The canonical analysis result.
///
/// Invariant: every field is present and schema-valid after normalization,
/// regardless of what the LM returned. `reading_time_min` is always ≥ 0
/// and consistent with `word_count / effective_wpm` plus nontext time when
/// content-based metrics were available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub doc_language: String,
    pub volume: Volume,
    pub complexity: Complexity,
    pub topics: Vec<Topic>,
    pub category: Category,
    pub limitations: Limitations,
}

// ── Category decision ────────────────────────────────────────────────────

/// Verdict of the classify-or-create flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryVerdict {
    MatchedExisting,
    CreatedNew,
}

/// Definition of a newly synthesised category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategoryDef {
    pub label: String,
    pub description: String,
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<String>>,
}

/// Result of [`crate::Analyzer::classify_or_create_category`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDecision {
    pub decision: CategoryVerdict,
    pub category: Category,
    pub existing_label: Option<String>,
    pub new_category_def: Option<NewCategoryDef>,
}

impl CategoryDecision {
    /// The guaranteed-safe decision used when no LM is reachable: a
    /// neutral `created_new` with an `unknown` basis. Callers are never
    /// blocked on category assignment.
    pub fn neutral() -> Self {
        Self {
            decision: CategoryVerdict::CreatedNew,
            category: Category {
                label: "uncategorized".into(),
                score: 0.0,
                basis: "unknown".into(),
                keywords: Vec::new(),
            },
            existing_label: None,
            new_category_def: Some(NewCategoryDef {
                label: "uncategorized".into(),
                description: "assigned without LM assistance".into(),
                keywords: Vec::new(),
                examples: None,
            }),
        }
    }
}

/// An existing category descriptor supplied by the caller to the
/// classify-or-create flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDescriptor {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parses_english_and_russian() {
        assert_eq!(ComplexityLevel::parse("medium"), Some(ComplexityLevel::Medium));
        assert_eq!(ComplexityLevel::parse("very-high"), Some(ComplexityLevel::VeryHigh));
        assert_eq!(ComplexityLevel::parse("Very_Low"), Some(ComplexityLevel::VeryLow));
        assert_eq!(
            ComplexityLevel::parse("очень высокая"),
            Some(ComplexityLevel::VeryHigh)
        );
        assert_eq!(ComplexityLevel::parse("средняя"), Some(ComplexityLevel::Medium));
        assert_eq!(ComplexityLevel::parse("banana"), None);
    }

    #[test]
    fn level_serialises_snake_case() {
        let s = serde_json::to_string(&ComplexityLevel::VeryHigh).unwrap();
        assert_eq!(s, "\"very_high\"");
    }

    #[test]
    fn wpm_factors_descend() {
        let mut prev = f64::MAX;
        for level in [
            ComplexityLevel::VeryLow,
            ComplexityLevel::Low,
            ComplexityLevel::Medium,
            ComplexityLevel::High,
            ComplexityLevel::VeryHigh,
        ] {
            assert!(level.wpm_factor() < prev);
            prev = level.wpm_factor();
        }
    }

    #[test]
    fn neutral_decision_shape() {
        let d = CategoryDecision::neutral();
        assert_eq!(d.decision, CategoryVerdict::CreatedNew);
        assert_eq!(d.category.basis, "unknown");
        assert!(d.existing_label.is_none());
    }
}
