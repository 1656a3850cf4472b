//! Error types for the pdfsight library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AnalysisError`] — **Fatal**: the analysis cannot proceed at all
//!   (bad input file, not a PDF, download failed, every provider down AND
//!   no document to fall back on). Returned as `Err(AnalysisError)` from
//!   the top-level facade functions.
//!
//! * [`ProviderError`] — **Per-step**: the outcome of one attempt against
//!   one LM provider. The router inspects the variant to decide between
//!   retrying the same provider, failing over to the next one, or giving
//!   up. It never escapes the router except wrapped in
//!   [`AnalysisError::ProviderExhausted`].
//!
//! The separation keeps "no LM available" invisible to facade callers —
//! the orchestrator degrades to the heuristic analyzer instead of raising.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdfsight library.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but the download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read but do not start with the `%PDF` signature.
    #[error("Content from '{source_name}' is not a PDF (missing %PDF header)")]
    NotAPdf { source_name: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF signature was present but the document cannot be parsed.
    #[error("Failed to parse PDF from '{source_name}': {detail}")]
    ExtractionFailed { source_name: String, detail: String },

    // ── LM errors ─────────────────────────────────────────────────────────
    /// Every configured provider failed; carries the last provider's error.
    #[error("All LM providers failed. Last error from '{provider}': {detail}")]
    ProviderExhausted { provider: String, detail: String },

    /// No provider credential is configured at all.
    #[error("No LM providers configured. Set at least one API key.")]
    NoProvidersConfigured,

    /// The repair ladder could not recover a JSON object from the LM text.
    #[error("LM response is not parseable as JSON: {preview}")]
    ResponseUnparseable { preview: String },

    /// The normalized result failed schema validation and is unusable.
    #[error("Normalized result violates the output schema: {detail}")]
    SchemaViolation { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task join failures and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outcome of a single attempt against a single LM provider.
///
/// The router's failover loop branches on these variants:
/// auth errors skip the provider, transient errors retry it with backoff,
/// everything else fails over immediately.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credential rejected (401/403, bad key, token fetch refused).
    #[error("authentication failed for '{provider}': {detail}")]
    Auth { provider: String, detail: String },

    /// Retryable condition: 429, 503, other 5xx, connect error, timeout.
    #[error("'{provider}' temporarily unavailable: {detail}")]
    Transient { provider: String, detail: String },

    /// The call succeeded but the content was empty or unusable.
    #[error("empty response from '{provider}'")]
    Empty { provider: String },

    /// Anything else: malformed response body, unexpected status, 4xx.
    #[error("'{provider}' failed: {detail}")]
    Other { provider: String, detail: String },
}

impl ProviderError {
    /// Provider name the error originated from.
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Auth { provider, .. }
            | ProviderError::Transient { provider, .. }
            | ProviderError::Empty { provider }
            | ProviderError::Other { provider, .. } => provider,
        }
    }

    /// Whether the same provider is worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_exhausted_display_names_last_provider() {
        let e = AnalysisError::ProviderExhausted {
            provider: "perplexity".into(),
            detail: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("perplexity"), "got: {msg}");
        assert!(msg.contains("503"), "got: {msg}");
    }

    #[test]
    fn not_a_pdf_display() {
        let e = AnalysisError::NotAPdf {
            source_name: "report.docx".into(),
        };
        assert!(e.to_string().contains("report.docx"));
    }

    #[test]
    fn transient_classification() {
        let e = ProviderError::Transient {
            provider: "gemini".into(),
            detail: "429".into(),
        };
        assert!(e.is_transient());
        assert_eq!(e.provider(), "gemini");

        let e = ProviderError::Auth {
            provider: "gemini".into(),
            detail: "invalid key".into(),
        };
        assert!(!e.is_transient());
    }
}
