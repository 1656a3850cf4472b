//! Heuristic analysis: the no-LM fallback.
//!
//! A pure function of the extracted document and optional precomputed
//! reading metrics. It always succeeds — this path is what guarantees the
//! orchestrator's "a schema-valid report is always produced" contract
//! even with zero network connectivity.

use crate::config::AnalysisConfig;
use crate::pipeline::stats;
use crate::report::{
    AnalysisReport, Category, Complexity, ComplexityLevel, DocumentMeta, Limitations,
    ReadingMetrics, Topic, Volume, VolumeMethod,
};

/// Words on the first page below this mark the document as low-content.
const LOW_CONTENT_WORDS: u64 = 150;

/// Filename keyword table used when `filename_category_hints` is enabled.
/// Each entry: (keywords, label, category score, topic keywords).
const FILENAME_HINTS: &[(&[&str], &str, f64, &[&str])] = &[
    (
        &["tech", "programming", "code", "dev", "github"],
        "Technology",
        0.8,
        &["programming", "software"],
    ),
    (
        &["ml", "ai", "machine", "learning", "neural", "data"],
        "Machine Learning",
        0.8,
        &["ML", "AI", "data"],
    ),
    (
        &["science", "research", "paper", "journal"],
        "Science",
        0.7,
        &["research", "science"],
    ),
    (
        &["business", "economy", "finance", "market"],
        "Business",
        0.7,
        &["economy", "finance"],
    ),
];

/// Produce an approximate-but-valid report without any LM involvement.
pub fn analyze(
    text: &str,
    meta: &DocumentMeta,
    metrics: Option<&ReadingMetrics>,
    config: &AnalysisConfig,
) -> AnalysisReport {
    let (first_page_words, _) = stats::count_words_and_chars(text);

    let lang = meta
        .language_hint
        .clone()
        .or_else(|| stats::detect_language(text))
        .unwrap_or_else(|| "en".into());

    // Content-based totals win over the first-page extrapolation.
    let (total_words, reading_time_min, wc_method) = match metrics {
        Some(m) if m.word_count > 0 => (
            m.word_count,
            stats::round2(m.total_minutes),
            m.word_count_method(),
        ),
        _ => {
            let words = meta.word_count_hint.unwrap_or(first_page_words);
            (
                words,
                stats::estimate_reading_time_min(Some(&lang), words),
                "precomputed",
            )
        }
    };

    let avg_cpw = stats::avg_chars_per_word(text, first_page_words);
    let char_count = stats::estimate_char_count(avg_cpw, total_words);

    let (score, level, note) = if first_page_words < LOW_CONTENT_WORDS {
        (15, ComplexityLevel::Low, "very little text")
    } else {
        (40, ComplexityLevel::Medium, "heuristic estimate without LM")
    };

    let (category, topics) = guess_category(meta, config);

    AnalysisReport {
        doc_language: lang,
        volume: Volume {
            word_count: total_words,
            char_count,
            page_count: meta.page_count,
            byte_size: meta.byte_size,
            reading_time_min,
            method: VolumeMethod {
                word_count: wc_method.into(),
                char_count: "estimated_no_spaces".into(),
            },
        },
        complexity: Complexity {
            score,
            level,
            estimated_grade: "school".into(),
            drivers: vec!["heuristic estimate".into()],
            notes: note.into(),
        },
        topics,
        category,
        limitations: Limitations {
            short_or_noisy_input: first_page_words < LOW_CONTENT_WORDS,
            comments: note.into(),
        },
    }
}

/// Category guess from the source name.
///
/// With `filename_category_hints` enabled, keyword matches map onto a
/// small fixed table; otherwise the label is the neutral file stem (or
/// `uncategorized` when no source name exists).
fn guess_category(meta: &DocumentMeta, config: &AnalysisConfig) -> (Category, Vec<Topic>) {
    let source_name = meta.source_name.as_deref().unwrap_or("");

    if config.filename_category_hints && !source_name.is_empty() {
        let lowered = source_name.to_lowercase();
        for (keywords, label, score, topic_keywords) in FILENAME_HINTS {
            if keywords.iter().any(|k| lowered.contains(k)) {
                let category = Category {
                    label: (*label).into(),
                    score: *score,
                    basis: "filename".into(),
                    keywords: Vec::new(),
                };
                let topics = vec![Topic {
                    label: (*label).into(),
                    score: *score,
                    keywords: topic_keywords.iter().map(|s| s.to_string()).collect(),
                    rationale: "filename keyword match".into(),
                }];
                return (category, topics);
            }
        }
    }

    let general_topic = vec![Topic {
        label: "General".into(),
        score: 0.5,
        keywords: Vec::new(),
        rationale: "default topic".into(),
    }];

    match file_stem(source_name) {
        Some(stem) => (
            Category {
                label: stem,
                score: 0.6,
                basis: "filename".into(),
                keywords: Vec::new(),
            },
            general_topic,
        ),
        None => (Category::uncategorized(), general_topic),
    }
}

/// File stem of the source name, rejected when empty or implausibly long.
fn file_stem(source_name: &str) -> Option<String> {
    let base = source_name.rsplit('/').next()?;
    let stem = base.split('.').next()?.trim();
    if stem.is_empty() || stem.chars().count() > 50 {
        None
    } else {
        Some(stem.to_string())
    }
}
