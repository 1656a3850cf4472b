//! JSON repair: recover a JSON object from loosely formatted LM output.
//!
//! ## Why is repair necessary?
//!
//! Even well-prompted models wrap JSON in markdown fences, prepend prose,
//! leave a trailing comma before a closing brace, or stop generating with
//! a brace unclosed. Rather than failing the analysis on each quirk, a
//! ladder of four deterministic recovery steps runs in order, stopping at
//! the first success:
//!
//! 1. Direct parse of the whole text.
//! 2. The contents of a fenced ```json block.
//! 3. The first balanced `{…}` span found by brace counting.
//! 4. Comment/trailing-comma stripping plus closing of unbalanced
//!    braces and brackets, then a reparse.
//!
//! Exhausting the ladder means the response is unusable; the caller
//! treats that as an LM failure and falls back to the heuristic analyzer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Recover a JSON **object** from raw LM text. Values that parse to
/// non-objects (a bare string, a number) are rejected — the normalizer
/// needs key/value structure to work with.
pub fn recover_json_object(content: &str) -> Option<Value> {
    let steps: [&dyn Fn(&str) -> Option<Value>; 4] = [
        &|c| serde_json::from_str(c).ok(),
        &|c| fenced_block(c).and_then(|s| serde_json::from_str(&s).ok()),
        &|c| balanced_span(c).and_then(|s| serde_json::from_str(s).ok()),
        &|c| serde_json::from_str(&aggressive_clean(c)).ok(),
    ];

    for (i, step) in steps.iter().enumerate() {
        if let Some(value) = step(content) {
            if value.is_object() {
                if i > 0 {
                    debug!("JSON recovered at repair step {}", i + 1);
                }
                return Some(value);
            }
        }
    }
    None
}

// ── Step 2: fenced block ─────────────────────────────────────────────────

static RE_FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

fn fenced_block(content: &str) -> Option<String> {
    RE_FENCED_JSON
        .captures(content)
        .map(|caps| caps[1].to_string())
}

// ── Step 3: balanced span ────────────────────────────────────────────────

/// Find the first `{…}` span whose braces balance, counting nesting.
/// String literals are honoured so a `}` inside a value does not close
/// the object early.
fn balanced_span(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let bytes = content.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Step 4: aggressive cleaning ──────────────────────────────────────────

static RE_LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)//[^\n]*$").unwrap());
static RE_BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static RE_TRAILING_COMMA_BRACE: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\}").unwrap());
static RE_TRAILING_COMMA_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\]").unwrap());

/// Strip comments and trailing commas, then append whatever closing
/// braces/brackets are missing. The last rung of the ladder.
fn aggressive_clean(content: &str) -> String {
    let start = content.find('{').unwrap_or(0);
    let cleaned = RE_LINE_COMMENT.replace_all(&content[start..], "");
    let cleaned = RE_BLOCK_COMMENT.replace_all(&cleaned, "");
    let cleaned = RE_TRAILING_COMMA_BRACE.replace_all(&cleaned, "}");
    let mut cleaned = RE_TRAILING_COMMA_BRACKET
        .replace_all(&cleaned, "]")
        .into_owned();

    let open_braces = cleaned.matches('{').count();
    let close_braces = cleaned.matches('}').count();
    let open_brackets = cleaned.matches('[').count();
    let close_brackets = cleaned.matches(']').count();

    for _ in close_brackets..open_brackets {
        cleaned.push(']');
    }
    for _ in close_braces..open_braces {
        cleaned.push('}');
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_parse() {
        let v = recover_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn fenced_block_with_language_tag() {
        let input = "Here is the result:\n```json\n{\"a\": 1, \"b\": [2]}\n```\nDone.";
        let v = recover_json_object(input).unwrap();
        assert_eq!(v, json!({"a": 1, "b": [2]}));
    }

    #[test]
    fn fenced_block_without_language_tag() {
        let input = "```\n{\"ok\": true}\n```";
        assert_eq!(recover_json_object(input).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn balanced_span_inside_prose() {
        let input = "The analysis follows. {\"volume\": {\"word_count\": 10}} Hope this helps!";
        let v = recover_json_object(input).unwrap();
        assert_eq!(v["volume"]["word_count"], 10);
    }

    #[test]
    fn balanced_span_ignores_braces_in_strings() {
        let input = r#"note {"label": "set {a, b}", "n": 1} trailing"#;
        let v = recover_json_object(input).unwrap();
        assert_eq!(v["label"], "set {a, b}");
    }

    #[test]
    fn trailing_comma_is_repaired() {
        let input = "{\"a\": 1, \"b\": 2,}";
        assert_eq!(recover_json_object(input).unwrap(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn comments_are_stripped() {
        let input = "{\n  \"a\": 1, // answer\n  /* block */ \"b\": 2\n}";
        assert_eq!(recover_json_object(input).unwrap(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn unclosed_braces_are_closed() {
        let input = "{\"a\": {\"b\": [1, 2";
        let v = recover_json_object(input).unwrap();
        assert_eq!(v["a"]["b"], json!([1, 2]));
    }

    #[test]
    fn non_object_values_rejected() {
        assert!(recover_json_object("42").is_none());
        assert!(recover_json_object("\"just a string\"").is_none());
        assert!(recover_json_object("[1, 2, 3]").is_none());
    }

    #[test]
    fn garbage_is_unrecoverable() {
        assert!(recover_json_object("no json anywhere").is_none());
        assert!(recover_json_object("").is_none());
    }
}
