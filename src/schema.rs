//! JSON-Schema documents for the two wire contracts, plus compiled
//! validators.
//!
//! The schemas are the process-boundary contract: every
//! [`crate::report::AnalysisReport`] and
//! [`crate::report::CategoryDecision`] is validated against them before
//! being handed to callers. The typed structs make violations unlikely by
//! construction, but the explicit check is what external consumers rely
//! on, so it runs unconditionally.

use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

/// Schema for [`crate::report::AnalysisReport`].
pub static ANALYSIS_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "doc_language": {"type": "string"},
            "volume": {
                "type": "object",
                "properties": {
                    "word_count": {"type": "integer", "minimum": 0},
                    "char_count": {"type": "integer", "minimum": 0},
                    "page_count": {"type": ["integer", "null"], "minimum": 0},
                    "byte_size": {"type": ["integer", "null"], "minimum": 0},
                    "reading_time_min": {"type": "number", "minimum": 0},
                    "method": {
                        "type": "object",
                        "properties": {
                            "word_count": {"type": "string"},
                            "char_count": {"type": "string"}
                        },
                        "required": ["word_count", "char_count"]
                    }
                },
                "required": [
                    "word_count", "char_count", "page_count",
                    "byte_size", "reading_time_min", "method"
                ]
            },
            "complexity": {
                "type": "object",
                "properties": {
                    "score": {"type": "integer", "minimum": 0, "maximum": 100},
                    "level": {
                        "type": "string",
                        "enum": ["very_low", "low", "medium", "high", "very_high"]
                    },
                    "estimated_grade": {"type": "string"},
                    "drivers": {"type": "array", "items": {"type": "string"}},
                    "notes": {"type": "string"}
                },
                "required": ["score", "level", "estimated_grade", "drivers", "notes"]
            },
            "topics": {
                "type": "array",
                "maxItems": 6,
                "items": {
                    "type": "object",
                    "properties": {
                        "label": {"type": "string"},
                        "score": {"type": "number"},
                        "keywords": {"type": "array", "items": {"type": "string"}},
                        "rationale": {"type": "string"}
                    },
                    "required": ["label", "score", "keywords", "rationale"]
                }
            },
            "category": {
                "type": "object",
                "properties": {
                    "label": {"type": "string"},
                    "score": {"type": "number"},
                    "basis": {"type": "string"},
                    "keywords": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["label", "score", "basis", "keywords"]
            },
            "limitations": {
                "type": "object",
                "properties": {
                    "short_or_noisy_input": {"type": "boolean"},
                    "comments": {"type": "string"}
                },
                "required": ["short_or_noisy_input", "comments"]
            }
        },
        "required": [
            "doc_language", "volume", "complexity",
            "topics", "category", "limitations"
        ]
    })
});

/// Schema for [`crate::report::CategoryDecision`].
pub static CATEGORY_DECISION_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "decision": {
                "type": "string",
                "enum": ["matched_existing", "created_new"]
            },
            "category": {
                "type": "object",
                "properties": {
                    "label": {"type": "string"},
                    "score": {"type": "number"},
                    "basis": {"type": "string"},
                    "keywords": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["label", "score", "basis", "keywords"]
            },
            "existing_label": {"type": ["string", "null"]},
            "new_category_def": {
                "type": ["object", "null"],
                "properties": {
                    "label": {"type": "string"},
                    "description": {"type": "string"},
                    "keywords": {"type": "array", "items": {"type": "string"}},
                    "examples": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["label", "description", "keywords"]
            }
        },
        "required": ["decision", "category"]
    })
});

static ANALYSIS_VALIDATOR: Lazy<JSONSchema> =
    Lazy::new(|| JSONSchema::compile(&ANALYSIS_SCHEMA).expect("analysis schema compiles"));

static CATEGORY_VALIDATOR: Lazy<JSONSchema> = Lazy::new(|| {
    JSONSchema::compile(&CATEGORY_DECISION_SCHEMA).expect("category decision schema compiles")
});

/// Validate a JSON value against the analysis schema.
///
/// Returns the full list of violation messages so callers can log every
/// problem at once instead of fixing them one re-run at a time.
pub fn validate_analysis(value: &Value) -> Result<(), Vec<String>> {
    run_validator(&ANALYSIS_VALIDATOR, value)
}

/// Validate a JSON value against the category decision schema.
pub fn validate_category_decision(value: &Value) -> Result<(), Vec<String>> {
    run_validator(&CATEGORY_VALIDATOR, value)
}

fn run_validator(validator: &JSONSchema, value: &Value) -> Result<(), Vec<String>> {
    let result = validator.validate(value);
    match result {
        Ok(()) => Ok(()),
        Err(errors) => Err(errors.map(|e| e.to_string()).collect()),
    }
}
