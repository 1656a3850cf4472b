//! Analysis orchestration: the facade tying the pipeline together.
//!
//! ## The fallback boundary
//!
//! [`Analyzer::analyze`] is the single place where "LM unreachable"
//! becomes invisible to callers: any failure on the LM path — provider
//! exhaustion, unparseable output, a missed deadline — degrades to the
//! heuristic analyzer instead of propagating. The public contract only
//! raises when no document could be read at all.
//!
//! ## Post-processing
//!
//! LMs invent their own reading-time estimates. Whenever content-based
//! metrics exist, the final `reading_time_min` is recomputed here from
//! the actual word count and the LM-reported complexity level, so the
//! returned number is always consistent with the deterministic scan.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::llm::LlmRouter;
use crate::pipeline::{extract as extraction, heuristic, normalize, repair, stats};
use crate::prompts;
use crate::report::{
    AnalysisReport, CategoryDecision, CategoryDescriptor, CategoryVerdict, DocumentMeta,
    Extraction, NewCategoryDef, ReadingMetrics,
};
use crate::schema;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fraction of the overall budget granted to extraction when one call
/// covers extract + analyze; the LM stage is the slow part.
const EXTRACT_TIME_SHARE: f64 = 0.3;

/// Facade over the whole pipeline. Owns the provider router (and with it
/// every token cache); construct once and share across requests.
pub struct Analyzer {
    config: AnalysisConfig,
    router: LlmRouter,
}

impl Analyzer {
    /// Build an analyzer with providers discovered from the environment.
    ///
    /// A credential-free environment is not an error: the router stays
    /// empty and every analysis answers from the heuristic path.
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let router = LlmRouter::from_env(&config)?;
        if router.is_empty() {
            warn!("No LM providers configured; analyses will use the heuristic path");
        } else {
            info!("LM providers (failover order): {:?}", router.provider_names());
        }
        Ok(Self { config, router })
    }

    /// Build an analyzer around a pre-constructed router (tests, custom
    /// provider stacks).
    pub fn with_router(config: AnalysisConfig, router: LlmRouter) -> Self {
        Self { config, router }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Extract a document from a local path or URL.
    pub async fn extract(&self, input: &str) -> Result<Extraction, AnalysisError> {
        extraction::extract(input, &self.config).await
    }

    /// Extract from in-memory PDF bytes.
    pub async fn extract_bytes(
        &self,
        bytes: Vec<u8>,
        source_name: Option<String>,
    ) -> Result<Extraction, AnalysisError> {
        extraction::extract_from_bytes(bytes, source_name, &self.config).await
    }

    /// Analyze extracted text and metadata into a schema-valid report.
    ///
    /// Never fails for "no LM available" — the heuristic analyzer covers
    /// that case. The configured `analysis_timeout_secs` bounds the LM
    /// path; on expiry the heuristic result is returned instead.
    pub async fn analyze(
        &self,
        text: &str,
        meta: &DocumentMeta,
        metrics: Option<&ReadingMetrics>,
    ) -> Result<AnalysisReport, AnalysisError> {
        let deadline = Duration::from_secs(self.config.analysis_timeout_secs);
        Ok(self.analyze_with_deadline(text, meta, metrics, deadline).await)
    }

    /// Convenience: extract then analyze, splitting the time budget
    /// 30% extraction / 70% LM.
    pub async fn analyze_input(&self, input: &str) -> Result<AnalysisReport, AnalysisError> {
        let total = self.config.analysis_timeout_secs as f64;
        let extract_deadline = Duration::from_secs_f64(total * EXTRACT_TIME_SHARE);
        let analyze_deadline = Duration::from_secs_f64(total * (1.0 - EXTRACT_TIME_SHARE));

        let extraction = tokio::time::timeout(extract_deadline, self.extract(input))
            .await
            .map_err(|_| AnalysisError::DownloadTimeout {
                url: input.to_string(),
                secs: extract_deadline.as_secs(),
            })??;

        let Extraction { document, metrics } = extraction;
        Ok(self
            .analyze_with_deadline(&document.text, &document.meta, metrics.as_ref(), analyze_deadline)
            .await)
    }

    async fn analyze_with_deadline(
        &self,
        text: &str,
        meta: &DocumentMeta,
        metrics: Option<&ReadingMetrics>,
        deadline: Duration,
    ) -> AnalysisReport {
        // The word-count hint seeds both the prompt and the fallback math.
        let mut meta = meta.clone();
        if meta.word_count_hint.is_none() {
            let (words, _) = stats::count_words_and_chars(text);
            meta.word_count_hint = Some(words);
        }

        if self.config.use_heuristic_only {
            info!("Heuristic-only mode enabled, skipping LM");
            return self.schema_gate(heuristic::analyze(text, &meta, metrics, &self.config));
        }

        let report = match tokio::time::timeout(deadline, self.lm_report(text, &meta, metrics)).await
        {
            Ok(Ok(report)) => self.reconcile_reading_time(report, &meta, metrics),
            Ok(Err(e)) => {
                warn!("LM analysis failed, falling back to heuristics: {e}");
                heuristic::analyze(text, &meta, metrics, &self.config)
            }
            Err(_) => {
                warn!(
                    "LM analysis exceeded {:?}, falling back to heuristics",
                    deadline
                );
                heuristic::analyze(text, &meta, metrics, &self.config)
            }
        };

        self.schema_gate(report)
    }

    /// One pass through Router → repair ladder → normalizer.
    async fn lm_report(
        &self,
        text: &str,
        meta: &DocumentMeta,
        metrics: Option<&ReadingMetrics>,
    ) -> Result<AnalysisReport, AnalysisError> {
        let prompt = prompts::build_analysis_prompt(text, meta, self.config.prompt_text_limit);
        let completion = self
            .router
            .generate(
                Some(prompts::ANALYSIS_SYSTEM_PROMPT),
                &prompt,
                self.config.max_retries,
            )
            .await?;

        let data = repair::recover_json_object(&completion.content).ok_or_else(|| {
            AnalysisError::ResponseUnparseable {
                preview: preview(&completion.content),
            }
        })?;

        debug!("Analysis content obtained from '{}'", completion.provider);
        Ok(normalize::normalize_analysis(&data, meta, metrics, text))
    }

    /// Recompute `reading_time_min` from the deterministic metrics and the
    /// LM-reported complexity level, overriding whatever the LM estimated.
    fn reconcile_reading_time(
        &self,
        mut report: AnalysisReport,
        meta: &DocumentMeta,
        metrics: Option<&ReadingMetrics>,
    ) -> AnalysisReport {
        let Some(m) = metrics else {
            return report;
        };

        let words = meta
            .word_count_hint
            .filter(|&w| w > 0)
            .unwrap_or(m.word_count);

        let eff = stats::effective_wpm(
            stats::base_wpm(Some(&report.doc_language)),
            Some(report.complexity.level),
        );
        let text_min = stats::round2(words as f64 / eff.max(1) as f64);
        let nontext_min = stats::round2(m.nontext_total_seconds() as f64 / 60.0);

        report.volume.reading_time_min = stats::round1(text_min + nontext_min);
        if words > 0 {
            report.volume.word_count = words;
        }
        report.volume.method.word_count = m.word_count_method().into();
        report
    }

    /// Validate against the output schema. The typed report is valid by
    /// construction, so a violation is logged as a defect and the report
    /// is still returned — callers are promised a result, not an apology.
    fn schema_gate(&self, report: AnalysisReport) -> AnalysisReport {
        match serde_json::to_value(&report) {
            Ok(value) => {
                if let Err(errors) = schema::validate_analysis(&value) {
                    warn!("Normalized report violates the schema: {:?}", errors);
                }
            }
            Err(e) => warn!("Report serialisation failed during validation: {e}"),
        }
        report
    }

    /// Classify the document into one of `existing` categories or define
    /// a new one.
    ///
    /// Never fails and never blocks callers on LM availability: any
    /// failure returns the neutral `created_new` decision with basis
    /// `unknown`.
    pub async fn classify_or_create_category(
        &self,
        text: &str,
        meta: &DocumentMeta,
        existing: &[CategoryDescriptor],
    ) -> CategoryDecision {
        let deadline = Duration::from_secs(self.config.analysis_timeout_secs);

        let outcome = tokio::time::timeout(deadline, async {
            let prompt = prompts::build_category_prompt(
                text,
                meta,
                existing,
                self.config.prompt_text_limit,
            );
            let completion = self
                .router
                .generate(
                    Some(prompts::CATEGORY_SYSTEM_PROMPT),
                    &prompt,
                    self.config.max_retries,
                )
                .await?;

            let data = repair::recover_json_object(&completion.content).ok_or_else(|| {
                AnalysisError::ResponseUnparseable {
                    preview: preview(&completion.content),
                }
            })?;

            normalize::normalize_category_decision(&data).ok_or_else(|| {
                AnalysisError::ResponseUnparseable {
                    preview: preview(&completion.content),
                }
            })
        })
        .await;

        match outcome {
            Ok(Ok(decision)) => {
                if let Ok(value) = serde_json::to_value(&decision) {
                    if let Err(errors) = schema::validate_category_decision(&value) {
                        warn!("Category decision violates the schema: {:?}", errors);
                    }
                }
                decision
            }
            Ok(Err(e)) => {
                warn!("Category decision failed, returning neutral: {e}");
                CategoryDecision::neutral()
            }
            Err(_) => {
                warn!("Category decision exceeded {:?}, returning neutral", deadline);
                CategoryDecision::neutral()
            }
        }
    }

    /// Force-create a category definition for a single document.
    ///
    /// Reuses the classify flow with no existing categories; a
    /// `matched_existing` verdict (possible when the LM second-guesses the
    /// empty list) is coerced into `created_new`.
    pub async fn define_category(&self, text: &str, meta: &DocumentMeta) -> CategoryDecision {
        let mut decision = self.classify_or_create_category(text, meta, &[]).await;
        if decision.decision == CategoryVerdict::MatchedExisting {
            decision.decision = CategoryVerdict::CreatedNew;
            decision.existing_label = None;
            if decision.new_category_def.is_none() {
                decision.new_category_def = Some(NewCategoryDef {
                    label: decision.category.label.clone(),
                    description: "automatically defined category".into(),
                    keywords: decision.category.keywords.clone(),
                    examples: None,
                });
            }
        }
        decision
    }
}

fn preview(content: &str) -> String {
    content.chars().take(200).collect()
}

// ── Facade functions ─────────────────────────────────────────────────────

/// Extract a document from a local path or URL.
pub async fn extract(input: &str, config: &AnalysisConfig) -> Result<Extraction, AnalysisError> {
    extraction::extract(input, config).await
}

/// Extract from PDF bytes already in memory (database blobs, uploads).
pub async fn extract_from_bytes(
    bytes: Vec<u8>,
    source_name: Option<String>,
    config: &AnalysisConfig,
) -> Result<Extraction, AnalysisError> {
    extraction::extract_from_bytes(bytes, source_name, config).await
}

/// One-shot convenience: build an [`Analyzer`] from the environment and
/// run extract + analyze on the input.
pub async fn analyze_document(
    input: &str,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, AnalysisError> {
    Analyzer::new(config.clone())?.analyze_input(input).await
}
