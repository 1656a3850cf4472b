//! # pdfsight
//!
//! Turn raw PDF bytes into a structured, schema-valid description of a
//! document — volume, reading time, complexity, topics, and category —
//! by combining a deterministic content-metrics engine with fallible
//! external LM providers.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF (path | URL | bytes)
//!  │
//!  ├─ 1. Extract    magic check, first-page text, counts, language, TOC
//!  ├─ 2. Readtime   per-page classification → deterministic metrics
//!  ├─ 3. Route      ordered providers, token lifecycle, retry + failover
//!  ├─ 4. Repair     recover a JSON object from loose LM output
//!  ├─ 5. Normalize  aliases, rescaling, defaults → typed report
//!  └─ 6. Validate   JSON-Schema gate (heuristic fallback if 3–5 failed)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfsight::{analyze_document, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Providers auto-detected from GEMINI_API_KEY / PERPLEXITY_API_KEY /
//!     // GIGACHAT_AUTH_KEY; with none set the heuristic path answers.
//!     let config = AnalysisConfig::from_env();
//!     let report = analyze_document("document.pdf", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! * A schema-valid [`AnalysisReport`] is always produced for a readable
//!   PDF, even with zero network connectivity (heuristic fallback).
//! * Reading-time numbers are consistent with the deterministic content
//!   scan whenever one succeeded, regardless of what the LM claimed.
//! * Category assignment never blocks callers: failures yield a neutral
//!   `created_new` decision.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_document, extract, extract_from_bytes, Analyzer};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, ReadTimeMode, TextPolicy};
pub use error::{AnalysisError, ProviderError};
pub use llm::{
    ChatClient, ChatRequest, Completion, Credential, LlmRouter, ProviderSpec, TokenManager,
};
pub use report::{
    AnalysisReport, Category, CategoryDecision, CategoryDescriptor, CategoryVerdict, Complexity,
    ComplexityLevel, DocumentMeta, ExtractedDocument, Extraction, Limitations, ReadingMetrics,
    Topic, Volume,
};
