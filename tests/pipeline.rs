//! Integration tests for the analysis pipeline.
//!
//! PDFs are generated in-memory with lopdf, so the tests exercise real
//! extraction and reading-time scanning without fixture files. The LM
//! side is driven through scripted [`ChatClient`] fakes injected into the
//! router — no network, no API keys.

use async_trait::async_trait;
use pdfsight::pipeline::readtime;
use pdfsight::{
    AnalysisConfig, Analyzer, CategoryVerdict, ChatClient, ChatRequest, LlmRouter, ProviderError,
    ReadTimeMode,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── PDF fixture builder ──────────────────────────────────────────────────

/// Build a simple multi-page PDF, one text line block per page.
fn make_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 11.into()]),
            Operation::new("Td", vec![40.into(), 750.into()]),
        ];
        // One Tj per line keeps the content stream simple and parseable.
        for line in text.lines() {
            operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
            operations.push(Operation::new("Td", vec![0.into(), (-14).into()]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content stream encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf serialises");
    bytes
}

fn english_page(sentences: usize) -> String {
    "The committee reviewed the annual findings and prepared a detailed summary for the board. "
        .repeat(sentences)
}

// ── Scripted chat clients ────────────────────────────────────────────────

struct StaticClient {
    reply: String,
    calls: AtomicU32,
}

impl StaticClient {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ChatClient for StaticClient {
    async fn complete(&self, _request: &ChatRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

struct DownClient;

#[async_trait]
impl ChatClient for DownClient {
    async fn complete(&self, _request: &ChatRequest) -> Result<String, ProviderError> {
        Err(ProviderError::Transient {
            provider: "down".into(),
            detail: "connection refused".into(),
        })
    }
}

fn analyzer_with_client(client: Arc<dyn ChatClient>) -> Analyzer {
    let config = AnalysisConfig::builder()
        .max_retries(2)
        .retry_backoff_ms(1)
        .build()
        .unwrap();
    let router = LlmRouter::new(vec![("fake".into(), client)], Duration::from_millis(1));
    Analyzer::with_router(config, router)
}

fn analyzer_all_down() -> Analyzer {
    let config = AnalysisConfig::builder()
        .max_retries(2)
        .retry_backoff_ms(1)
        .build()
        .unwrap();
    let router = LlmRouter::new(
        vec![
            ("down-a".into(), Arc::new(DownClient) as Arc<dyn ChatClient>),
            ("down-b".into(), Arc::new(DownClient) as Arc<dyn ChatClient>),
        ],
        Duration::from_millis(1),
    );
    Analyzer::with_router(config, router)
}

// ── Extraction ───────────────────────────────────────────────────────────

#[tokio::test]
async fn extraction_reads_first_page_and_counts() {
    let pdf = make_pdf(&[&english_page(30), &english_page(30), &english_page(30)]);
    let config = AnalysisConfig::default();

    let extraction = pdfsight::extract_from_bytes(pdf, Some("report.pdf".into()), &config)
        .await
        .expect("extraction succeeds");

    let meta = &extraction.document.meta;
    assert_eq!(meta.page_count, Some(3));
    assert_eq!(meta.source_name.as_deref(), Some("report.pdf"));
    assert!(meta.byte_size.unwrap() > 0);
    assert!(meta.word_count_hint.unwrap() > 0);
    assert!(extraction.document.text.contains("committee"));

    let metrics = extraction.metrics.expect("content metrics available");
    assert_eq!(metrics.mode, ReadTimeMode::Accurate);
    assert!(metrics.word_count > 0);
    assert!(metrics.total_minutes > 0.0);
}

#[tokio::test]
async fn extraction_from_a_local_path() {
    let pdf = make_pdf(&[&english_page(20)]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("minutes.pdf");
    std::fs::write(&path, &pdf).unwrap();

    let config = AnalysisConfig::default();
    let extraction = pdfsight::extract(path.to_str().unwrap(), &config)
        .await
        .expect("extraction succeeds");

    assert_eq!(
        extraction.document.meta.source_name.as_deref(),
        Some("minutes.pdf")
    );
    assert_eq!(extraction.document.meta.page_count, Some(1));
}

#[tokio::test]
async fn estimator_is_idempotent() {
    let pdf = make_pdf(&[&english_page(25), &english_page(40)]);
    let config = AnalysisConfig::default();

    let a = readtime::estimate_blocking(&pdf, Some("en"), None, &config).unwrap();
    let b = readtime::estimate_blocking(&pdf, Some("en"), None, &config).unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn fast_mode_ceiling_forces_sampling() {
    let pdf = make_pdf(&[&english_page(30), &english_page(30), &english_page(30)]);
    let config = AnalysisConfig::builder()
        .max_pages_accurate(2)
        .build()
        .unwrap();

    let metrics = readtime::estimate_blocking(&pdf, Some("en"), None, &config).unwrap();
    assert_eq!(metrics.mode, ReadTimeMode::Fast);
    assert_eq!(metrics.nontext_minutes, 0.0);
}

// ── Full analysis path ───────────────────────────────────────────────────

#[tokio::test]
async fn lm_answer_is_normalized_and_reconciled() {
    let pdf = make_pdf(&[&english_page(40), &english_page(40)]);
    let config = AnalysisConfig::default();
    let extraction = pdfsight::extract_from_bytes(pdf, Some("paper.pdf".into()), &config)
        .await
        .unwrap();

    // Fenced output with a Russian volume key and a 1–5 score.
    let reply = r#"Here is my analysis:
```json
{
  "doc_language": "en",
  "объём": {"word_count": 99999, "reading_time_min": 500.0},
  "complexity": {"score": 4, "level": "high"},
  "topics": [{"label": "Governance", "score": 0.9, "keywords": ["board"], "rationale": "reports"}],
  "category": {"name": "Corporate Reports", "confidence": 0.85},
  "limitations": {"short_or_noisy_input": false, "comments": ""}
}
```"#;
    let client = StaticClient::new(reply);
    let analyzer = analyzer_with_client(client.clone());

    let report = analyzer
        .analyze(
            &extraction.document.text,
            &extraction.document.meta,
            extraction.metrics.as_ref(),
        )
        .await
        .unwrap();

    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.complexity.score, 80);
    assert_eq!(report.category.label, "Corporate Reports");
    assert_eq!(report.category.score, 0.85);
    assert_eq!(report.topics.len(), 1);

    // The LM's invented reading time and word count are overridden by the
    // deterministic metrics.
    let metrics = extraction.metrics.unwrap();
    assert_eq!(report.volume.word_count, metrics.word_count);
    assert!(report.volume.reading_time_min < 500.0);
    assert_eq!(report.volume.method.word_count, "content_based_full_scan");

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(pdfsight::schema::validate_analysis(&value), Ok(()));
}

#[tokio::test]
async fn unreachable_providers_fall_back_to_heuristics() {
    let pdf = make_pdf(&[&english_page(35)]);
    let config = AnalysisConfig::default();
    let extraction = pdfsight::extract_from_bytes(pdf, Some("offline.pdf".into()), &config)
        .await
        .unwrap();

    let analyzer = analyzer_all_down();
    let report = analyzer
        .analyze(
            &extraction.document.text,
            &extraction.document.meta,
            extraction.metrics.as_ref(),
        )
        .await
        .unwrap();

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(pdfsight::schema::validate_analysis(&value), Ok(()));
    assert_eq!(report.category.basis, "filename");
    assert_eq!(report.category.label, "offline");
    assert!(report.volume.reading_time_min > 0.0);
}

#[tokio::test]
async fn unparseable_lm_output_falls_back() {
    let client = StaticClient::new("I could not produce JSON today, sorry!");
    let analyzer = analyzer_with_client(client);

    let meta = pdfsight::DocumentMeta {
        word_count_hint: Some(800),
        language_hint: Some("en".into()),
        ..Default::default()
    };
    let report = analyzer.analyze("some document text", &meta, None).await.unwrap();

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(pdfsight::schema::validate_analysis(&value), Ok(()));
    assert_eq!(report.volume.word_count, 800);
    assert_eq!(report.volume.method.word_count, "precomputed");
}

// ── Category decision ────────────────────────────────────────────────────

#[tokio::test]
async fn category_decision_happy_path() {
    let reply = r#"{
        "decision": "matched_existing",
        "category": {"label": "Science", "score": 0.9, "basis": "llm", "keywords": ["research"]},
        "existing_label": "Science"
    }"#;
    let analyzer = analyzer_with_client(StaticClient::new(reply));

    let existing = vec![pdfsight::CategoryDescriptor {
        label: "Science".into(),
        description: Some("research papers".into()),
        keywords: vec!["research".into()],
    }];
    let decision = analyzer
        .classify_or_create_category("text", &Default::default(), &existing)
        .await;

    assert_eq!(decision.decision, CategoryVerdict::MatchedExisting);
    assert_eq!(decision.existing_label.as_deref(), Some("Science"));
}

#[tokio::test]
async fn category_decision_neutral_when_unreachable() {
    let analyzer = analyzer_all_down();
    let decision = analyzer
        .classify_or_create_category("text", &Default::default(), &[])
        .await;

    assert_eq!(decision.decision, CategoryVerdict::CreatedNew);
    assert_eq!(decision.category.basis, "unknown");
    assert!(decision.existing_label.is_none());

    let value = serde_json::to_value(&decision).unwrap();
    assert_eq!(pdfsight::schema::validate_category_decision(&value), Ok(()));
}

#[tokio::test]
async fn define_category_coerces_matched_verdict() {
    // The LM claims a match even though no categories exist.
    let reply = r#"{
        "decision": "matched_existing",
        "category": {"label": "Essays", "score": 0.7, "basis": "llm", "keywords": []}
    }"#;
    let analyzer = analyzer_with_client(StaticClient::new(reply));

    let decision = analyzer.define_category("text", &Default::default()).await;
    assert_eq!(decision.decision, CategoryVerdict::CreatedNew);
    assert!(decision.existing_label.is_none());
    let def = decision.new_category_def.expect("definition synthesised");
    assert_eq!(def.label, "Essays");
}
