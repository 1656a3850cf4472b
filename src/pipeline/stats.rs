//! Deterministic text statistics shared across pipeline stages.
//!
//! Everything here is a pure function: word and character counting,
//! language detection, words-per-minute math, and the first-page
//! total-word extrapolation used before (or instead of) a full content
//! scan.

use crate::report::ComplexityLevel;
use lingua::{Language, LanguageDetector, LanguageDetectorBuilder};
use once_cell::sync::Lazy;
use regex::Regex;

/// Letters and digits in any script count as word characters.
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://").unwrap());

static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Detector is expensive to build; share one across the process.
/// The language set mirrors the documents the pipeline is tuned for.
static DETECTOR: Lazy<LanguageDetector> = Lazy::new(|| {
    LanguageDetectorBuilder::from_languages(&[
        Language::English,
        Language::Russian,
        Language::German,
        Language::French,
        Language::Spanish,
    ])
    .build()
});

/// Count word-like tokens (letters/digits runs). Used by the page
/// classifier, where URLs and stray punctuation should still count the
/// words inside them.
pub fn count_words(text: &str) -> u64 {
    WORD_RE.find_iter(text).count() as u64
}

/// Rough word and character counts for prose.
///
/// Words: whitespace tokens minus URLs and one-character fragments.
/// Characters: the whitespace-normalised text with spaces removed — the
/// "no spaces" convention the volume block reports.
pub fn count_words_and_chars(text: &str) -> (u64, u64) {
    let mut words = 0u64;
    for token in text.split_whitespace() {
        if URL_RE.is_match(token) {
            continue;
        }
        if WORD_RE
            .find_iter(token)
            .map(|m| m.as_str().chars().count())
            .sum::<usize>()
            <= 1
        {
            continue;
        }
        words += 1;
    }
    (words, char_count_no_spaces(text))
}

/// Characters excluding all whitespace.
pub fn char_count_no_spaces(text: &str) -> u64 {
    SPACE_RE
        .replace_all(text.trim(), " ")
        .replace(' ', "")
        .chars()
        .count() as u64
}

/// Best-effort ISO-639-1 language detection on a bounded sample.
pub fn detect_language(text: &str) -> Option<String> {
    let sample: String = text.chars().take(5000).collect();
    if sample.trim().is_empty() {
        return None;
    }
    DETECTOR
        .detect_language_of(&sample)
        .map(|lang| lang.iso_code_639_1().to_string().to_lowercase())
}

/// Base reading speed: 200 WPM for English-like documents, 180 otherwise.
pub fn base_wpm(lang: Option<&str>) -> u32 {
    match lang {
        Some(l) if l.to_lowercase().starts_with("en") => 200,
        _ => 180,
    }
}

/// Complexity-adjusted reading speed with a 60 WPM floor.
pub fn effective_wpm(base: u32, level: Option<ComplexityLevel>) -> u32 {
    let factor = level.unwrap_or_default().wpm_factor();
    ((base as f64 * factor) as u32).max(60)
}

/// Metadata-only reading-time estimate in minutes, one decimal.
pub fn estimate_reading_time_min(lang: Option<&str>, word_count: u64) -> f64 {
    round1(word_count as f64 / base_wpm(lang).max(1) as f64)
}

/// Extrapolate a total word count from the first page.
///
/// - w1 ≥ 30 with a known page count: words/page = clamp(w1, 60..900),
///   total = words/page × pages.
/// - Otherwise with page count and byte size: words/page ≈
///   clamp(bytes/pages/6, 60..900).
/// - Otherwise: flat 300 words per page (or 300 total when even the page
///   count is unknown).
pub fn estimate_total_words(w1: u64, page_count: Option<u64>, byte_size: Option<u64>) -> u64 {
    match (page_count, byte_size) {
        (Some(pages), _) if pages > 0 && w1 >= 30 => clamp_f(w1 as f64, 60.0, 900.0) as u64 * pages,
        (Some(pages), Some(bytes)) if pages > 0 => {
            let approx_wpp = bytes as f64 / pages.max(1) as f64 / 6.0;
            clamp_f(approx_wpp, 60.0, 900.0) as u64 * pages
        }
        (Some(pages), None) if pages > 0 => 300 * pages,
        _ => 300,
    }
}

/// Average characters per word on the first page, clamped to a plausible
/// 4.5–6.5 band so a noisy page cannot distort the estimate.
pub fn avg_chars_per_word(first_page_text: &str, w1: u64) -> f64 {
    let no_spaces = char_count_no_spaces(first_page_text);
    clamp_f(no_spaces as f64 / w1.max(1) as f64, 4.5, 6.5)
}

/// Total character estimate from the per-word average.
pub fn estimate_char_count(avg_cpw: f64, total_words: u64) -> u64 {
    (total_words as f64 * avg_cpw).round() as u64
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn clamp_f(v: f64, lo: f64, hi: f64) -> f64 {
    v.clamp(lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_counting_filters_urls_and_fragments() {
        let (words, _) = count_words_and_chars("Visit https://example.com for more a b info");
        // "Visit", "for", "more", "info" — the URL and one-letter tokens drop.
        assert_eq!(words, 4);
    }

    #[test]
    fn char_count_ignores_whitespace() {
        assert_eq!(char_count_no_spaces("ab  cd\n e"), 5);
    }

    #[test]
    fn count_words_spans_scripts() {
        assert_eq!(count_words("hello мир 42"), 3);
    }

    #[test]
    fn base_wpm_english_vs_rest() {
        assert_eq!(base_wpm(Some("en")), 200);
        assert_eq!(base_wpm(Some("en-US")), 200);
        assert_eq!(base_wpm(Some("ru")), 180);
        assert_eq!(base_wpm(None), 180);
    }

    #[test]
    fn effective_wpm_has_floor() {
        assert_eq!(effective_wpm(180, Some(ComplexityLevel::Medium)), 153);
        assert_eq!(effective_wpm(60, Some(ComplexityLevel::VeryHigh)), 60);
        assert_eq!(effective_wpm(200, None), 170); // medium default
    }

    #[test]
    fn total_words_first_page_extrapolation() {
        // Healthy first page: clamp(w1) × pages.
        assert_eq!(estimate_total_words(250, Some(10), Some(100_000)), 2500);
        // Clamped at 900 words/page.
        assert_eq!(estimate_total_words(2000, Some(10), None), 9000);
        // Thin first page, byte-size estimate: 120000/10/6 = 2000 → clamp 900.
        assert_eq!(estimate_total_words(5, Some(10), Some(120_000)), 9000);
        // Nothing but a page count.
        assert_eq!(estimate_total_words(5, Some(4), None), 1200);
        // Nothing at all.
        assert_eq!(estimate_total_words(5, None, None), 300);
    }

    #[test]
    fn reading_time_rounds_to_one_decimal() {
        assert_eq!(estimate_reading_time_min(Some("en"), 1000), 5.0);
        assert_eq!(estimate_reading_time_min(Some("ru"), 450), 2.5);
    }

    #[test]
    fn avg_cpw_is_clamped() {
        assert_eq!(avg_chars_per_word("aaaaaaaaaaaaaaaaaaaa", 1), 6.5);
        assert_eq!(avg_chars_per_word("a", 100), 4.5);
    }

    #[test]
    fn language_detection_best_effort() {
        assert_eq!(detect_language(""), None);
        let en = detect_language("The quick brown fox jumps over the lazy dog near the river bank.");
        assert_eq!(en.as_deref(), Some("en"));
        let ru = detect_language("Быстрая коричневая лиса перепрыгнула через ленивую собаку у реки.");
        assert_eq!(ru.as_deref(), Some("ru"));
    }
}
