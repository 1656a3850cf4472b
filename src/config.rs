//! Configuration for the document analysis pipeline.
//!
//! All behaviour is controlled through [`AnalysisConfig`], built via its
//! [`AnalysisConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks, serialise them for logging, and
//! diff two runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest. [`AnalysisConfig::from_env`] layers the
//! environment-driven tunables on top of those defaults.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};

/// Which pages the reading-time estimator scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadTimeMode {
    /// Scan every page and classify it. (default)
    #[default]
    Accurate,
    /// Sample only the first page and extrapolate. Bounded latency on
    /// very large documents, no nontext time accounting.
    Fast,
}

/// How much text the extractor returns to callers (and hence to the LM).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextPolicy {
    /// First page only — bounds LM token cost. (default)
    #[default]
    First,
    /// Full document text. Intended for debugging.
    Full,
}

/// Configuration for a document analysis run.
///
/// Built via [`AnalysisConfig::builder()`] or [`AnalysisConfig::from_env()`].
///
/// # Example
/// ```rust
/// use pdfsight::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .max_retries(5)
///     .toc_preview(false)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Reading-time estimation mode. Default: [`ReadTimeMode::Accurate`].
    pub readtime_mode: ReadTimeMode,

    /// Page-count ceiling above which accurate mode silently degrades to
    /// fast mode. Default: 200.
    ///
    /// Scanning a 2 000-page scan archive page-by-page can take seconds of
    /// CPU. Above the ceiling the sampled estimate is close enough and the
    /// latency stays bounded.
    pub max_pages_accurate: usize,

    /// Seconds of reading time attributed per inline image, as a
    /// (low, high) pair. The low bound applies to images on text/mixed
    /// pages. Default: (3, 10).
    pub per_image_seconds: (u32, u32),

    /// Text extraction policy. Default: [`TextPolicy::First`].
    pub text_policy: TextPolicy,

    /// Whether the extractor derives a table-of-contents preview.
    /// Default: true.
    pub toc_preview: bool,

    /// Number of leading pages scanned for TOC-like lines. Default: 3.
    pub toc_max_pages: usize,

    /// Character cap on the TOC preview. Default: 1200.
    pub toc_max_chars: usize,

    /// Retry attempts per provider on a transient failure. Default: 3.
    ///
    /// Retries are per-provider; exhausting them moves the router to the
    /// next provider rather than aborting the call.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff, doubling).
    /// Default: 2000.
    pub retry_backoff_ms: u64,

    /// Per-LM-call timeout in seconds. Exceeding it counts as a transient
    /// failure for retry/failover purposes. Default: 30.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 20.
    pub download_timeout_secs: u64,

    /// Overall timeout for one analysis (extract + LM + normalize) in
    /// seconds. Convenience entry points split it 30% extract / 70%
    /// analyze. Default: 60.
    pub analysis_timeout_secs: u64,

    /// Skip the LM entirely and answer from the heuristic analyzer.
    /// Default: false.
    pub use_heuristic_only: bool,

    /// Derive category guesses from filename keywords in the heuristic
    /// fallback. Default: false — the neutral file-stem label is used.
    pub filename_category_hints: bool,

    /// Cap on prompt text characters sent to the LM. Default: 20 000.
    pub prompt_text_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            readtime_mode: ReadTimeMode::Accurate,
            max_pages_accurate: 200,
            per_image_seconds: (3, 10),
            text_policy: TextPolicy::First,
            toc_preview: true,
            toc_max_pages: 3,
            toc_max_chars: 1200,
            max_retries: 3,
            retry_backoff_ms: 2000,
            api_timeout_secs: 30,
            download_timeout_secs: 20,
            analysis_timeout_secs: 60,
            use_heuristic_only: false,
            filename_category_hints: false,
            prompt_text_limit: 20_000,
        }
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overlaid with the `PDFSIGHT_*` environment tunables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `PDFSIGHT_READTIME_MODE` (`accurate`/`fast`) | `readtime_mode` |
    /// | `PDFSIGHT_MAX_PAGES` | `max_pages_accurate` |
    /// | `PDFSIGHT_PER_IMAGE_SECONDS` (`"3,10"`) | `per_image_seconds` |
    /// | `PDFSIGHT_TEXT_PAGES` (`first`/`full`) | `text_policy` |
    /// | `PDFSIGHT_TOC_PREVIEW` (`true`/`false`) | `toc_preview` |
    /// | `PDFSIGHT_TOC_MAX_PAGES` | `toc_max_pages` |
    /// | `PDFSIGHT_TOC_MAX_CHARS` | `toc_max_chars` |
    /// | `PDFSIGHT_MAX_RETRIES` | `max_retries` |
    /// | `PDFSIGHT_API_TIMEOUT` | `api_timeout_secs` |
    /// | `PDFSIGHT_HEURISTIC_ONLY` (`true`/`false`) | `use_heuristic_only` |
    ///
    /// Unparseable values fall back to the default rather than erroring —
    /// a misconfigured threshold must not take the pipeline down.
    pub fn from_env() -> Self {
        let mut c = Self::default();

        if let Ok(v) = std::env::var("PDFSIGHT_READTIME_MODE") {
            match v.trim().to_lowercase().as_str() {
                "fast" => c.readtime_mode = ReadTimeMode::Fast,
                "accurate" => c.readtime_mode = ReadTimeMode::Accurate,
                other => {
                    tracing::warn!("Unknown PDFSIGHT_READTIME_MODE '{}', keeping default", other)
                }
            }
        }
        if let Some(v) = env_parse::<usize>("PDFSIGHT_MAX_PAGES") {
            c.max_pages_accurate = v;
        }
        if let Ok(v) = std::env::var("PDFSIGHT_PER_IMAGE_SECONDS") {
            c.per_image_seconds = parse_per_image_seconds(&v).unwrap_or(c.per_image_seconds);
        }
        if let Ok(v) = std::env::var("PDFSIGHT_TEXT_PAGES") {
            if v.trim().eq_ignore_ascii_case("full") {
                c.text_policy = TextPolicy::Full;
            }
        }
        if let Some(v) = env_parse::<bool>("PDFSIGHT_TOC_PREVIEW") {
            c.toc_preview = v;
        }
        if let Some(v) = env_parse::<usize>("PDFSIGHT_TOC_MAX_PAGES") {
            c.toc_max_pages = v;
        }
        if let Some(v) = env_parse::<usize>("PDFSIGHT_TOC_MAX_CHARS") {
            c.toc_max_chars = v;
        }
        if let Some(v) = env_parse::<u32>("PDFSIGHT_MAX_RETRIES") {
            c.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("PDFSIGHT_API_TIMEOUT") {
            c.api_timeout_secs = v;
        }
        if let Some(v) = env_parse::<bool>("PDFSIGHT_HEURISTIC_ONLY") {
            c.use_heuristic_only = v;
        }

        c
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse a `"low,high"` pair, clamping negatives away.
fn parse_per_image_seconds(raw: &str) -> Option<(u32, u32)> {
    let mut it = raw.split(',').map(|p| p.trim().parse::<i64>());
    match (it.next(), it.next(), it.next()) {
        (Some(Ok(lo)), Some(Ok(hi)), None) => Some((lo.max(0) as u32, hi.max(0) as u32)),
        _ => None,
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn readtime_mode(mut self, mode: ReadTimeMode) -> Self {
        self.config.readtime_mode = mode;
        self
    }

    pub fn max_pages_accurate(mut self, n: usize) -> Self {
        self.config.max_pages_accurate = n.max(1);
        self
    }

    pub fn per_image_seconds(mut self, lo: u32, hi: u32) -> Self {
        self.config.per_image_seconds = (lo, hi);
        self
    }

    pub fn text_policy(mut self, policy: TextPolicy) -> Self {
        self.config.text_policy = policy;
        self
    }

    pub fn toc_preview(mut self, enabled: bool) -> Self {
        self.config.toc_preview = enabled;
        self
    }

    pub fn toc_max_pages(mut self, n: usize) -> Self {
        self.config.toc_max_pages = n;
        self
    }

    pub fn toc_max_chars(mut self, n: usize) -> Self {
        self.config.toc_max_chars = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn analysis_timeout_secs(mut self, secs: u64) -> Self {
        self.config.analysis_timeout_secs = secs;
        self
    }

    pub fn use_heuristic_only(mut self, v: bool) -> Self {
        self.config.use_heuristic_only = v;
        self
    }

    pub fn filename_category_hints(mut self, v: bool) -> Self {
        self.config.filename_category_hints = v;
        self
    }

    pub fn prompt_text_limit(mut self, n: usize) -> Self {
        self.config.prompt_text_limit = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, AnalysisError> {
        let c = &self.config;
        if c.max_pages_accurate == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_pages_accurate must be ≥ 1".into(),
            ));
        }
        if c.per_image_seconds.0 > c.per_image_seconds.1 {
            return Err(AnalysisError::InvalidConfig(format!(
                "per_image_seconds low bound {} exceeds high bound {}",
                c.per_image_seconds.0, c.per_image_seconds.1
            )));
        }
        if c.api_timeout_secs == 0 || c.analysis_timeout_secs == 0 {
            return Err(AnalysisError::InvalidConfig(
                "timeouts must be nonzero".into(),
            ));
        }
        Ok(self.config)
    }
}
