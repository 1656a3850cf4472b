//! Content-based reading-time estimation.
//!
//! ## Why spawn_blocking?
//!
//! Scanning every page of a large PDF is CPU-bound work on decompressed
//! content streams. `tokio::task::spawn_blocking` moves it onto the
//! blocking pool so the async workers keep serving network futures.
//!
//! ## Accounting model
//!
//! Each page is classified by its word and image counts; text and mixed
//! pages feed the running word total, slides get a clamped per-slide
//! allowance, and tables/code lines add fixed nontext seconds. Reading
//! speed is the language base (200 WPM English-like, 180 otherwise)
//! scaled by the complexity level, floored at 60 WPM.
//!
//! The estimator is deterministic: the same bytes with the same mode
//! always produce identical metrics. It has no internal fallback — a PDF
//! that cannot be opened is the caller's problem (the orchestrator
//! substitutes the heuristic word math there).

use crate::config::{AnalysisConfig, ReadTimeMode};
use crate::error::AnalysisError;
use crate::pipeline::stats::{self, round2};
use crate::report::{ComplexityLevel, PageClassCounts, ReadingMetrics};
use lopdf::{Document, Object};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static TABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(table|таблица|табл)\b").unwrap());

static CODE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)[;{}()\[\]]|^\s*(def |class |#include|fn |for\s*\(|while\s*\()"#).unwrap());

/// Seconds charged per table keyword occurrence.
const TABLE_SECONDS: u64 = 12;
/// Seconds charged per code-like line.
const CODE_LINE_SECONDS: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageClass {
    Text,
    Mixed,
    Slide,
    Empty,
}

/// Classify one page from its word and image counts.
fn classify_page(words: u64, images: u32) -> PageClass {
    if words >= 200 {
        PageClass::Text
    } else if words >= 80 {
        PageClass::Mixed
    } else if images > 0 {
        PageClass::Slide
    } else {
        PageClass::Empty
    }
}

/// Estimate reading time for a PDF given as raw bytes.
///
/// `lang` and `complexity_level` tune the effective WPM; pass `None` for
/// the level when it is not yet known (the orchestrator re-derives the
/// final number once the LM has reported one).
pub async fn estimate(
    bytes: Vec<u8>,
    lang: Option<String>,
    complexity_level: Option<ComplexityLevel>,
    config: &AnalysisConfig,
) -> Result<ReadingMetrics, AnalysisError> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        estimate_blocking(&bytes, lang.as_deref(), complexity_level, &config)
    })
    .await
    .map_err(|e| AnalysisError::Internal(format!("readtime task panicked: {e}")))?
}

/// Blocking implementation of the estimate.
pub fn estimate_blocking(
    bytes: &[u8],
    lang: Option<&str>,
    complexity_level: Option<ComplexityLevel>,
    config: &AnalysisConfig,
) -> Result<ReadingMetrics, AnalysisError> {
    let doc = Document::load_mem(bytes).map_err(|e| AnalysisError::ExtractionFailed {
        source_name: "<bytes>".into(),
        detail: e.to_string(),
    })?;

    let pages = doc.get_pages();
    let page_count = pages.len();

    let mut mode = config.readtime_mode;
    if mode == ReadTimeMode::Accurate && page_count > config.max_pages_accurate {
        debug!(
            "accurate mode requested but pages={} > max={}, using fast mode",
            page_count, config.max_pages_accurate
        );
        mode = ReadTimeMode::Fast;
    }

    let metrics = match mode {
        ReadTimeMode::Accurate => accurate_estimate(&doc, lang, complexity_level, config),
        ReadTimeMode::Fast => fast_estimate(&doc, lang, complexity_level),
    };

    debug!(
        "readtime mode={:?} pages={:?} words={} text_min={:.2} nontext_min={:.2} total={:.2}",
        metrics.mode,
        metrics.page_classes,
        metrics.word_count,
        metrics.text_minutes,
        metrics.nontext_minutes,
        metrics.total_minutes
    );

    Ok(metrics)
}

fn accurate_estimate(
    doc: &Document,
    lang: Option<&str>,
    complexity_level: Option<ComplexityLevel>,
    config: &AnalysisConfig,
) -> ReadingMetrics {
    let mut total_words = 0u64;
    let mut image_seconds = 0u64;
    let mut table_seconds = 0u64;
    let mut code_seconds = 0u64;
    let mut slide_seconds = 0u64;
    let mut classes = PageClassCounts::default();

    for (&page_no, &page_id) in doc.get_pages().iter() {
        let text = doc.extract_text(&[page_no]).unwrap_or_default();
        let words = stats::count_words(&text);
        let images = count_page_images(doc, page_id);
        let tables = TABLE_RE.find_iter(&text).count() as u64;
        let code_lines = text
            .lines()
            .filter(|line| CODE_LINE_RE.is_match(line))
            .count() as u64;

        match classify_page(words, images) {
            PageClass::Text => {
                classes.text += 1;
                total_words += words;
                image_seconds += images as u64 * config.per_image_seconds.0 as u64;
            }
            PageClass::Mixed => {
                classes.mixed += 1;
                total_words += words;
                image_seconds += images as u64 * config.per_image_seconds.0 as u64;
            }
            PageClass::Slide => {
                classes.slide += 1;
                let slide_time = (6.0 + words as f64 / 10.0).clamp(8.0, 25.0);
                slide_seconds += slide_time as u64;
            }
            PageClass::Empty => classes.empty += 1,
        }

        table_seconds += tables * TABLE_SECONDS;
        code_seconds += (code_lines as f64 * CODE_LINE_SECONDS) as u64;
    }

    let eff_wpm = stats::effective_wpm(stats::base_wpm(lang), complexity_level);
    let text_minutes = round2(total_words as f64 / eff_wpm.max(1) as f64);
    let nontext_total = image_seconds + table_seconds + code_seconds + slide_seconds;
    let nontext_minutes = round2(nontext_total as f64 / 60.0);

    ReadingMetrics {
        total_minutes: round2(text_minutes + nontext_minutes),
        text_minutes,
        nontext_minutes,
        word_count: total_words,
        effective_wpm: eff_wpm,
        page_classes: classes,
        image_seconds,
        table_seconds,
        code_seconds,
        slide_seconds,
        mode: ReadTimeMode::Accurate,
    }
}

/// Fast mode: sample the first page, extrapolate, skip nontext time.
fn fast_estimate(
    doc: &Document,
    lang: Option<&str>,
    complexity_level: Option<ComplexityLevel>,
) -> ReadingMetrics {
    let pages = doc.get_pages();
    let page_count = pages.len() as u64;

    let first_text = pages
        .keys()
        .next()
        .map(|&no| doc.extract_text(&[no]).unwrap_or_default())
        .unwrap_or_default();
    let w1 = stats::count_words(&first_text);

    let total_words = if page_count > 0 && w1 >= 30 {
        (w1 as f64).clamp(60.0, 900.0) as u64 * page_count
    } else if page_count > 0 {
        300 * page_count
    } else {
        w1.max(300)
    };

    let eff_wpm = stats::effective_wpm(stats::base_wpm(lang), complexity_level);
    let text_minutes = round2(total_words as f64 / eff_wpm.max(1) as f64);

    ReadingMetrics {
        total_minutes: text_minutes,
        text_minutes,
        nontext_minutes: 0.0,
        word_count: total_words,
        effective_wpm: eff_wpm,
        page_classes: PageClassCounts::default(),
        image_seconds: 0,
        table_seconds: 0,
        code_seconds: 0,
        slide_seconds: 0,
        mode: ReadTimeMode::Fast,
    }
}

/// Count image XObjects referenced by a page's resources.
///
/// Every lookup is tolerant: a malformed resource tree counts as zero
/// images rather than failing the page.
fn count_page_images(doc: &Document, page_id: (u32, u16)) -> u32 {
    let page_dict = match doc.get_object(page_id).and_then(Object::as_dict) {
        Ok(d) => d,
        Err(_) => return 0,
    };

    let resources = match page_dict.get(b"Resources") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Dictionary(d)) => d,
            _ => return 0,
        },
        Ok(Object::Dictionary(d)) => d,
        _ => return 0,
    };

    let xobjects = match resources.get(b"XObject") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Dictionary(d)) => d,
            _ => return 0,
        },
        Ok(Object::Dictionary(d)) => d,
        _ => return 0,
    };

    let mut images = 0u32;
    for (_name, entry) in xobjects.iter() {
        let stream = match entry {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(Object::Stream(s)) => s,
                _ => continue,
            },
            Object::Stream(s) => s,
            _ => continue,
        };
        if let Ok(Object::Name(subtype)) = stream.dict.get(b"Subtype") {
            if subtype == b"Image" {
                images += 1;
            }
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_thresholds() {
        assert_eq!(classify_page(250, 0), PageClass::Text);
        assert_eq!(classify_page(200, 3), PageClass::Text);
        assert_eq!(classify_page(120, 0), PageClass::Mixed);
        assert_eq!(classify_page(40, 1), PageClass::Slide);
        assert_eq!(classify_page(5, 1), PageClass::Slide);
        assert_eq!(classify_page(10, 0), PageClass::Empty);
        assert_eq!(classify_page(0, 0), PageClass::Empty);
    }

    #[test]
    fn table_regex_matches_variants() {
        assert_eq!(TABLE_RE.find_iter("Table 1 shows… see табл. 2 and Таблица 3").count(), 3);
        assert_eq!(TABLE_RE.find_iter("portable tables").count(), 0);
    }

    #[test]
    fn code_line_regex() {
        assert!(CODE_LINE_RE.is_match("let x = f(y);"));
        assert!(CODE_LINE_RE.is_match("    def main:"));
        assert!(CODE_LINE_RE.is_match("for (int i = 0;"));
        assert!(!CODE_LINE_RE.is_match("An ordinary English sentence."));
    }

    #[test]
    fn slide_time_clamps() {
        for (words, expect) in [(0u64, 8.0), (20, 8.0), (100, 16.0), (400, 25.0)] {
            let t = (6.0 + words as f64 / 10.0).clamp(8.0, 25.0);
            assert_eq!(t, expect, "words={words}");
        }
    }

    // Document-level behaviour (idempotence, the fast-mode ceiling, word
    // accounting) is exercised in tests/pipeline.rs against a generated PDF.
}
