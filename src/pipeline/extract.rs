//! Input resolution and content extraction.
//!
//! Accepts a local path or an HTTP(S) URL, validates the `%PDF` magic
//! bytes before any parsing so callers get a meaningful error rather than
//! a parser crash, and extracts the first page's text (full text is a
//! debugging policy) together with page/byte counts, a language hint, and
//! an optional table-of-contents preview.
//!
//! The content-based reading scan runs as part of extraction; when it
//! fails the extraction still succeeds and the first-page word
//! extrapolation stands in for the content-based total.

use crate::config::{AnalysisConfig, TextPolicy};
use crate::error::AnalysisError;
use crate::pipeline::{readtime, stats};
use crate::report::{DocumentMeta, ExtractedDocument, Extraction};
use lopdf::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info, warn};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve an input to PDF bytes plus a human-friendly source name.
async fn resolve_bytes(
    input: &str,
    config: &AnalysisConfig,
) -> Result<(Vec<u8>, Option<String>), AnalysisError> {
    if input.trim().is_empty() {
        return Err(AnalysisError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_bytes(input, config.download_timeout_secs).await
    } else {
        let path = Path::new(input);
        let bytes = std::fs::read(path).map_err(|_| AnalysisError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Ok((bytes, source_name))
    }
}

/// Download a URL, following redirects and rejecting non-2xx responses.
async fn download_bytes(
    url: &str,
    timeout_secs: u64,
) -> Result<(Vec<u8>, Option<String>), AnalysisError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AnalysisError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            AnalysisError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AnalysisError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(AnalysisError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let source_name = filename_from_url(url);

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            AnalysisError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AnalysisError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    Ok((bytes.to_vec(), source_name))
}

/// Last path segment of the URL, when it carries an extension.
fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        None
    } else {
        Some(last.to_string())
    }
}

/// Extract a document from a local path or URL.
///
/// # Errors
/// - [`AnalysisError::FileNotFound`] / [`AnalysisError::DownloadFailed`] /
///   [`AnalysisError::DownloadTimeout`] while resolving the input;
/// - [`AnalysisError::NotAPdf`] when the bytes lack the `%PDF` signature;
/// - [`AnalysisError::ExtractionFailed`] when the PDF cannot be parsed.
pub async fn extract(input: &str, config: &AnalysisConfig) -> Result<Extraction, AnalysisError> {
    let (bytes, source_name) = resolve_bytes(input, config).await?;
    extract_from_bytes(bytes, source_name, config).await
}

/// Extract from bytes already in memory (database blobs, uploads).
pub async fn extract_from_bytes(
    bytes: Vec<u8>,
    source_name: Option<String>,
    config: &AnalysisConfig,
) -> Result<Extraction, AnalysisError> {
    if !bytes.starts_with(b"%PDF") {
        return Err(AnalysisError::NotAPdf {
            source_name: source_name.unwrap_or_else(|| "<bytes>".into()),
        });
    }

    let byte_size = bytes.len() as u64;

    // Parse on the blocking pool; lopdf work is CPU-bound.
    let cfg = config.clone();
    let parse_bytes = bytes.clone();
    let parse_source = source_name.clone();
    let parsed = tokio::task::spawn_blocking(move || parse_pdf(&parse_bytes, parse_source, &cfg))
        .await
        .map_err(|e| AnalysisError::Internal(format!("extract task panicked: {e}")))??;

    let ParsedPdf {
        text,
        page_count,
        first_page_words,
        language_hint,
        toc_preview,
    } = parsed;

    let mut word_count_hint =
        stats::estimate_total_words(first_page_words, page_count, Some(byte_size));

    // Content-based scan; failure here downgrades to the heuristic totals.
    let metrics = match readtime::estimate(bytes, language_hint.clone(), None, config).await {
        Ok(m) => {
            if m.word_count > 0 {
                word_count_hint = m.word_count;
            }
            Some(m)
        }
        Err(e) => {
            debug!("Reading-time metrics unavailable, keeping heuristic words: {e}");
            None
        }
    };

    Ok(Extraction {
        document: ExtractedDocument {
            text,
            meta: DocumentMeta {
                page_count,
                byte_size: Some(byte_size),
                word_count_hint: Some(word_count_hint),
                language_hint,
                source_name,
                toc_preview,
            },
        },
        metrics,
    })
}

struct ParsedPdf {
    text: String,
    page_count: Option<u64>,
    first_page_words: u64,
    language_hint: Option<String>,
    toc_preview: Option<String>,
}

fn parse_pdf(
    bytes: &[u8],
    source_name: Option<String>,
    config: &AnalysisConfig,
) -> Result<ParsedPdf, AnalysisError> {
    let doc = Document::load_mem(bytes).map_err(|e| AnalysisError::ExtractionFailed {
        source_name: source_name.unwrap_or_else(|| "<bytes>".into()),
        detail: e.to_string(),
    })?;

    let pages = doc.get_pages();
    let page_numbers: Vec<u32> = pages.keys().copied().collect();
    let page_count = Some(page_numbers.len() as u64);

    let first_page_text = page_numbers
        .first()
        .map(|&no| page_text(&doc, no))
        .unwrap_or_default();

    let text = match config.text_policy {
        TextPolicy::First => first_page_text.clone(),
        TextPolicy::Full => {
            let mut parts = Vec::with_capacity(page_numbers.len());
            for &no in &page_numbers {
                let t = page_text(&doc, no);
                if !t.is_empty() {
                    parts.push(t);
                }
            }
            parts.join("\n\n")
        }
    };

    let (first_page_words, _) = stats::count_words_and_chars(&first_page_text);
    let language_hint = stats::detect_language(&first_page_text);

    let toc_preview = if config.toc_preview {
        let leading: Vec<String> = page_numbers
            .iter()
            .take(config.toc_max_pages)
            .map(|&no| page_text(&doc, no))
            .collect();
        build_toc_preview(&leading, config.toc_max_chars)
    } else {
        None
    };

    Ok(ParsedPdf {
        text,
        page_count,
        first_page_words,
        language_hint,
        toc_preview,
    })
}

/// Per-page text, tolerating pages the extractor chokes on.
fn page_text(doc: &Document, page_no: u32) -> String {
    match doc.extract_text(&[page_no]) {
        Ok(t) => t,
        Err(e) => {
            warn!("Text extract failed on page {}: {}", page_no, e);
            String::new()
        }
    }
}

// ── TOC preview ──────────────────────────────────────────────────────────

static TOC_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(contents|table of contents|содержание|оглавление)\s*$").unwrap()
});

/// Numbered heading: "2", "3.1", "4.2.1 Title".
static NUMBERED_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+(\.\d+)*\.?\s+\S").unwrap());

/// Dot leaders ending in a page number: "Introduction ....... 7".
static DOT_LEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{3,}\s*\d+\s*$").unwrap());

/// Collect heading-like lines from the leading pages into a short outline
/// preview. Returns `None` when nothing heading-like is found.
fn build_toc_preview(pages: &[String], max_chars: usize) -> Option<String> {
    let mut lines: Vec<&str> = Vec::new();

    for page in pages {
        for line in page.lines() {
            let trimmed = line.trim_end();
            if trimmed.trim().is_empty() || trimmed.chars().count() > 100 {
                continue;
            }
            if TOC_MARKER_RE.is_match(trimmed)
                || DOT_LEADER_RE.is_match(trimmed)
                || NUMBERED_HEADING_RE.is_match(trimmed)
            {
                lines.push(trimmed.trim());
            }
        }
    }

    if lines.is_empty() {
        return None;
    }

    let mut preview = String::new();
    for line in lines {
        if preview.chars().count() + line.chars().count() + 1 > max_chars {
            break;
        }
        if !preview.is_empty() {
            preview.push('\n');
        }
        preview.push_str(line);
    }

    if preview.is_empty() {
        None
    } else {
        Some(preview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_variants() {
        assert_eq!(
            filename_from_url("https://example.com/papers/attention.pdf").as_deref(),
            Some("attention.pdf")
        );
        assert_eq!(filename_from_url("https://example.com/"), None);
        assert_eq!(filename_from_url("not a url"), None);
    }

    #[tokio::test]
    async fn rejects_non_pdf_bytes() {
        let config = AnalysisConfig::default();
        let err = extract_from_bytes(b"PK\x03\x04zipfile".to_vec(), Some("a.zip".into()), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let config = AnalysisConfig::default();
        let err = extract("/definitely/not/here.pdf", &config).await.unwrap_err();
        assert!(matches!(err, AnalysisError::FileNotFound { .. }));
    }

    #[test]
    fn toc_preview_picks_heading_lines() {
        let page = "\
Annual Report\n\
Contents\n\
1. Introduction\n\
2.1 Market overview\n\
Strategy .......... 12\n\
This is an ordinary paragraph of body text that should not appear.\n";
        let preview = build_toc_preview(&[page.to_string()], 1000).unwrap();
        assert!(preview.contains("Contents"));
        assert!(preview.contains("1. Introduction"));
        assert!(preview.contains("2.1 Market overview"));
        assert!(preview.contains("Strategy"));
        assert!(!preview.contains("ordinary paragraph"));
    }

    #[test]
    fn toc_preview_respects_char_cap() {
        let page = (1..100)
            .map(|i| format!("{i}. Section heading number {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let preview = build_toc_preview(&[page], 120).unwrap();
        assert!(preview.chars().count() <= 120);
    }

    #[test]
    fn toc_preview_none_for_plain_prose() {
        let page = "Just a paragraph with no structure at all".to_string();
        assert_eq!(build_toc_preview(&[page], 500), None);
    }
}
