//! Normalization: map loosely-structured LM output onto the canonical
//! report types.
//!
//! The LM's JSON is decoded into a generic `serde_json::Value` first and
//! then coerced field by field — never deserialized directly into the
//! strict structs. Models answer with Russian keys, 0–1 or 1–5 score
//! scales, single objects where arrays belong, numbers where strings
//! belong, and missing blocks entirely. Each field therefore has an alias
//! list, a coercion rule, and a schema-compliant default; the result is
//! total: any JSON object in produces a valid [`AnalysisReport`] out.

use crate::pipeline::stats;
use crate::report::{
    AnalysisReport, Category, CategoryDecision, CategoryVerdict, Complexity, ComplexityLevel,
    DocumentMeta, Limitations, NewCategoryDef, ReadingMetrics, Topic, Volume, VolumeMethod,
};
use serde_json::{Map, Value};

/// Words below this threshold mark the input as short/noisy.
const SHORT_INPUT_WORDS: u64 = 150;

/// Russian top-level keys some models answer with.
const TOP_LEVEL_ALIASES: &[(&str, &str)] = &[
    ("объём", "volume"),
    ("объем", "volume"),
    ("сложность", "complexity"),
    ("тематика", "topics"),
    ("категория", "category"),
    ("ограничения", "limitations"),
];

/// Build a canonical analysis report from whatever JSON object the LM
/// produced.
pub fn normalize_analysis(
    data: &Value,
    meta: &DocumentMeta,
    metrics: Option<&ReadingMetrics>,
    text: &str,
) -> AnalysisReport {
    let map = canonical_top_level(data);

    let doc_language = map
        .get("doc_language")
        .and_then(coerce_string)
        .or_else(|| meta.language_hint.clone())
        .or_else(|| stats::detect_language(text))
        .unwrap_or_else(|| "en".into());

    let volume = normalize_volume(&map, meta, metrics, text, &doc_language);
    let complexity = normalize_complexity(&map);
    let topics = normalize_topics(&map);
    let category = normalize_category(map.get("category"));
    let limitations = normalize_limitations(&map, text);

    AnalysisReport {
        doc_language,
        volume,
        complexity,
        topics,
        category,
        limitations,
    }
}

/// Build a [`CategoryDecision`] from LM output. Returns `None` when even
/// the lenient contract (a recognisable decision plus a category block)
/// is not met; the caller substitutes the neutral decision.
pub fn normalize_category_decision(data: &Value) -> Option<CategoryDecision> {
    let map = data.as_object()?;

    let decision = match map.get("decision").and_then(Value::as_str)?.trim() {
        "matched_existing" => CategoryVerdict::MatchedExisting,
        "created_new" => CategoryVerdict::CreatedNew,
        _ => return None,
    };

    let category_value = map.get("category")?;
    if !category_value.is_object() {
        return None;
    }
    let category = normalize_category(Some(category_value));

    let existing_label = map.get("existing_label").and_then(coerce_string);

    let new_category_def = map
        .get("new_category_def")
        .and_then(Value::as_object)
        .map(|def| NewCategoryDef {
            label: def
                .get("label")
                .and_then(coerce_string)
                .unwrap_or_else(|| category.label.clone()),
            description: def
                .get("description")
                .and_then(coerce_string)
                .unwrap_or_default(),
            keywords: def.get("keywords").map(coerce_string_list).unwrap_or_default(),
            examples: def
                .get("examples")
                .filter(|v| v.is_array())
                .map(coerce_string_list),
        });

    Some(CategoryDecision {
        decision,
        category,
        existing_label,
        new_category_def,
    })
}

// ── Top level ────────────────────────────────────────────────────────────

fn canonical_top_level(data: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    if let Some(map) = data.as_object() {
        for (key, value) in map {
            let canonical = TOP_LEVEL_ALIASES
                .iter()
                .find(|(alias, _)| *alias == key.as_str())
                .map(|(_, name)| *name)
                .unwrap_or(key.as_str());
            out.insert(canonical.to_string(), value.clone());
        }
    }
    out
}

fn get_alias<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| map.get(*k)).filter(|v| !v.is_null())
}

// ── Volume ───────────────────────────────────────────────────────────────

fn normalize_volume(
    map: &Map<String, Value>,
    meta: &DocumentMeta,
    metrics: Option<&ReadingMetrics>,
    text: &str,
    doc_language: &str,
) -> Volume {
    let empty = Map::new();
    let raw = map
        .get("volume")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let word_count = get_alias(raw, &["word_count", "количество_слов", "words"])
        .and_then(coerce_u64)
        .or(meta.word_count_hint)
        .unwrap_or(0);

    let char_count = get_alias(raw, &["char_count", "количество_символов", "chars"])
        .and_then(coerce_u64)
        .filter(|&c| c > 0)
        .unwrap_or_else(|| stats::char_count_no_spaces(text));

    let page_count = get_alias(raw, &["page_count", "количество_страниц", "pages"])
        .and_then(coerce_u64)
        .or(meta.page_count);

    let byte_size = get_alias(raw, &["byte_size", "размер_в_байтах", "size"])
        .and_then(coerce_u64)
        .or(meta.byte_size);

    let reading_time_min = get_alias(
        raw,
        &[
            "reading_time_min",
            "read_time_minutes",
            "reading_time_minutes",
            "время_чтения_минут",
            "time_to_read_minutes",
        ],
    )
    .and_then(coerce_f64)
    .filter(|&v| v > 0.0)
    .unwrap_or_else(|| stats::estimate_reading_time_min(Some(doc_language), word_count));

    let default_wc_method = metrics
        .map(ReadingMetrics::word_count_method)
        .unwrap_or("precomputed");
    let method_raw = raw.get("method").and_then(Value::as_object);
    let method = VolumeMethod {
        word_count: method_raw
            .and_then(|m| m.get("word_count"))
            .and_then(coerce_string)
            .unwrap_or_else(|| default_wc_method.into()),
        char_count: method_raw
            .and_then(|m| m.get("char_count"))
            .and_then(coerce_string)
            .unwrap_or_else(|| "estimated_no_spaces".into()),
    };

    Volume {
        word_count,
        char_count,
        page_count,
        byte_size,
        reading_time_min: reading_time_min.max(0.0),
        method,
    }
}

// ── Complexity ───────────────────────────────────────────────────────────

fn normalize_complexity(map: &Map<String, Value>) -> Complexity {
    // A bare string is taken as the level; a bare number is discarded
    // (scale unknown without the surrounding object).
    let raw = match map.get("complexity") {
        Some(Value::Object(o)) => o.clone(),
        Some(Value::String(s)) => {
            let mut o = Map::new();
            o.insert("level".into(), Value::String(s.clone()));
            o
        }
        _ => Map::new(),
    };

    let score = get_alias(&raw, &["score", "оценка", "оценка_1_5"])
        .and_then(rescale_score)
        .unwrap_or(40);

    let level = get_alias(&raw, &["level", "label", "уровень"])
        .and_then(Value::as_str)
        .and_then(ComplexityLevel::parse)
        .unwrap_or_default();

    let estimated_grade = get_alias(&raw, &["estimated_grade", "grade", "класс"])
        .and_then(coerce_string)
        .unwrap_or_else(|| "school".into());

    let drivers = get_alias(&raw, &["drivers", "ключевые_слова", "keywords"])
        .map(coerce_string_list)
        .unwrap_or_default();

    let notes = get_alias(&raw, &["notes", "description", "basis", "основание", "описание"])
        .and_then(coerce_string)
        .unwrap_or_default();

    Complexity {
        score,
        level,
        estimated_grade,
        drivers,
        notes,
    }
}

/// Rescale a complexity score onto 0–100.
///
/// Floats in [0, 1] are fractions (0.8 → 80); integers in 0–5 are the
/// five-step scale (4 → 80); anything else clamps into the range.
fn rescale_score(value: &Value) -> Option<u32> {
    if let Some(f) = value.as_f64() {
        if value.is_f64() && (0.0..=1.0).contains(&f) {
            return Some((f * 100.0).round() as u32);
        }
        if let Some(i) = value.as_u64() {
            if i <= 5 {
                return Some((i * 20) as u32);
            }
        }
        return Some(f.round().clamp(0.0, 100.0) as u32);
    }
    None
}

// ── Topics ───────────────────────────────────────────────────────────────

fn normalize_topics(map: &Map<String, Value>) -> Vec<Topic> {
    let mut topics = Vec::new();

    match map.get("topics") {
        // A single object is accepted and wrapped.
        Some(Value::Object(raw)) => {
            if let Some(topic) = topic_from_object(raw, &["label", "major"], &["keywords", "minor"]) {
                topics.push(topic);
            }
        }
        Some(Value::Array(list)) => {
            for entry in list {
                if let Some(raw) = entry.as_object() {
                    if let Some(topic) = topic_from_object(raw, &["label"], &["keywords"]) {
                        topics.push(topic);
                    }
                }
            }
        }
        _ => {}
    }

    topics.truncate(6);
    topics
}

fn topic_from_object(
    raw: &Map<String, Value>,
    label_keys: &[&str],
    keyword_keys: &[&str],
) -> Option<Topic> {
    let label = get_alias(raw, label_keys).and_then(coerce_string)?;
    if label.is_empty() {
        return None;
    }
    Some(Topic {
        label,
        score: raw.get("score").and_then(coerce_f64).unwrap_or(0.5),
        keywords: get_alias(raw, keyword_keys)
            .map(coerce_string_list)
            .unwrap_or_default(),
        rationale: get_alias(raw, &["rationale", "basis"])
            .and_then(coerce_string)
            .unwrap_or_default(),
    })
}

// ── Category ─────────────────────────────────────────────────────────────

fn normalize_category(raw: Option<&Value>) -> Category {
    let empty = Map::new();
    let raw = raw.and_then(Value::as_object).unwrap_or(&empty);

    let label = get_alias(raw, &["label", "name", "title", "название"])
        .and_then(coerce_string)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "uncategorized".into());

    let score = get_alias(raw, &["score", "confidence", "уверенность"])
        .and_then(coerce_f64)
        .unwrap_or(0.0);

    let basis = get_alias(raw, &["basis", "description", "основание", "описание"])
        .and_then(coerce_string)
        .unwrap_or_else(|| {
            if label == "uncategorized" {
                "none".into()
            } else {
                "llm".into()
            }
        });

    let keywords = get_alias(raw, &["keywords", "ключевые_слова"])
        .map(coerce_string_list)
        .unwrap_or_default();

    Category {
        label,
        score,
        basis,
        keywords,
    }
}

// ── Limitations ──────────────────────────────────────────────────────────

fn normalize_limitations(map: &Map<String, Value>, text: &str) -> Limitations {
    let empty = Map::new();
    let raw = map
        .get("limitations")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let (words, _) = stats::count_words_and_chars(text);

    Limitations {
        short_or_noisy_input: raw
            .get("short_or_noisy_input")
            .and_then(Value::as_bool)
            .unwrap_or(words < SHORT_INPUT_WORDS),
        comments: get_alias(raw, &["comments", "description"])
            .and_then(coerce_string)
            .unwrap_or_default(),
    }
}

// ── Coercions ────────────────────────────────────────────────────────────

/// Strings stay strings; numbers stringify; string lists join with ", ".
fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(coerce_string).collect();
            Some(parts.join(", "))
        }
        _ => None,
    }
}

/// Lists of scalars become string lists; a bare scalar becomes a
/// one-element list.
fn coerce_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        _ => None,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}
