//! CLI binary for pdfsight.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig` and prints JSON results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdfsight::{AnalysisConfig, Analyzer, CategoryDescriptor, ReadTimeMode, TextPolicy};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a local document (pretty JSON to stdout)
  pdfsight analyze document.pdf

  # Analyze from a URL
  pdfsight analyze https://arxiv.org/pdf/1706.03762

  # Extraction only — no LM required
  pdfsight extract document.pdf

  # Reading-time metrics only, fast mode
  pdfsight extract --readtime-mode fast document.pdf

  # Classify against existing categories from a JSON file
  pdfsight category --existing categories.json document.pdf

  # Offline run (heuristic analysis only)
  pdfsight analyze --heuristic-only document.pdf

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY            Gemini API key (first provider tried)
  PERPLEXITY_API_KEY        Perplexity API key
  GIGACHAT_AUTH_KEY         GigaChat authorization key (OAuth flow)
  GIGACHAT_SCOPE            GigaChat scope (default: GIGACHAT_API_PERS)
  GIGACHAT_MODEL            GigaChat model (default: GigaChat-2)
  PDFSIGHT_READTIME_MODE    accurate | fast
  PDFSIGHT_MAX_PAGES        Page ceiling before forced fast mode
  PDFSIGHT_PER_IMAGE_SECONDS  Per-image seconds pair, e.g. "3,10"
  PDFSIGHT_TEXT_PAGES       first | full
  PDFSIGHT_HEURISTIC_ONLY   Skip the LM entirely

With no provider key configured, analysis still succeeds via the
deterministic heuristic path."#;

/// Analyze PDF documents with LLMs and deterministic content metrics.
#[derive(Parser, Debug)]
#[command(
    name = "pdfsight",
    version,
    about = "Analyze PDF documents — volume, reading time, complexity, topics, category",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFSIGHT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "PDFSIGHT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full analysis: extract, LM (with fallback), validated report.
    Analyze {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Skip LM providers and answer from the heuristic analyzer.
        #[arg(long, env = "PDFSIGHT_HEURISTIC_ONLY")]
        heuristic_only: bool,

        /// Reading-time mode.
        #[arg(long, value_enum, default_value = "accurate", env = "PDFSIGHT_READTIME_MODE")]
        readtime_mode: ReadTimeArg,

        /// Overall analysis timeout in seconds.
        #[arg(long, default_value_t = 60, env = "PDFSIGHT_TIMEOUT")]
        timeout: u64,

        /// Retries per provider on transient failures.
        #[arg(long, default_value_t = 3, env = "PDFSIGHT_MAX_RETRIES")]
        max_retries: u32,
    },

    /// Extraction and reading-time metrics only (no LM, no API key).
    Extract {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Reading-time mode.
        #[arg(long, value_enum, default_value = "accurate", env = "PDFSIGHT_READTIME_MODE")]
        readtime_mode: ReadTimeArg,

        /// Extract the full document text instead of the first page.
        #[arg(long)]
        full_text: bool,
    },

    /// Classify into existing categories or define a new one.
    Category {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// JSON file with existing categories:
        /// [{"label": "...", "description": "...", "keywords": [...]}]
        #[arg(long)]
        existing: Option<PathBuf>,

        /// Overall timeout in seconds.
        #[arg(long, default_value_t = 60, env = "PDFSIGHT_TIMEOUT")]
        timeout: u64,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ReadTimeArg {
    Accurate,
    Fast,
}

impl From<ReadTimeArg> for ReadTimeMode {
    fn from(v: ReadTimeArg) -> Self {
        match v {
            ReadTimeArg::Accurate => ReadTimeMode::Accurate,
            ReadTimeArg::Fast => ReadTimeMode::Fast,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Analyze {
            input,
            heuristic_only,
            readtime_mode,
            timeout,
            max_retries,
        } => {
            let config = {
                let mut c = AnalysisConfig::from_env();
                c.readtime_mode = readtime_mode.into();
                c.use_heuristic_only = heuristic_only || c.use_heuristic_only;
                c.analysis_timeout_secs = timeout;
                c.max_retries = max_retries;
                c
            };
            let analyzer = Analyzer::new(config)?;
            let report = analyzer
                .analyze_input(&input)
                .await
                .with_context(|| format!("analysis failed for '{input}'"))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Extract {
            input,
            readtime_mode,
            full_text,
        } => {
            let config = {
                let mut c = AnalysisConfig::from_env();
                c.readtime_mode = readtime_mode.into();
                if full_text {
                    c.text_policy = TextPolicy::Full;
                }
                c
            };
            let extraction = pdfsight::extract(&input, &config)
                .await
                .with_context(|| format!("extraction failed for '{input}'"))?;
            println!("{}", serde_json::to_string_pretty(&extraction)?);
        }

        Command::Category {
            input,
            existing,
            timeout,
        } => {
            let existing_categories: Vec<CategoryDescriptor> = match existing {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("cannot read '{}'", path.display()))?;
                    serde_json::from_str(&raw)
                        .with_context(|| format!("invalid category JSON in '{}'", path.display()))?
                }
                None => Vec::new(),
            };

            let config = {
                let mut c = AnalysisConfig::from_env();
                c.analysis_timeout_secs = timeout;
                c
            };
            let analyzer = Analyzer::new(config)?;
            let extraction = analyzer
                .extract(&input)
                .await
                .with_context(|| format!("extraction failed for '{input}'"))?;
            let decision = analyzer
                .classify_or_create_category(
                    &extraction.document.text,
                    &extraction.document.meta,
                    &existing_categories,
                )
                .await;
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
    }

    Ok(())
}
