//! Response Normalizer
//!
//! Turns untrusted model text into a fully populated [`AnalyzeResult`].
//! The only failure is "no JSON object could be located"; every field-level
//! anomaly is repaired by defaulting or clamping.

use crate::core::state::CoachPolicy;
use crate::error::CoachError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Used when the model gave neither a suggested prompt nor a summary.
pub const GENERIC_SUGGESTED_PROMPT: &str =
    "Help me refine my question so I can get a better answer than last time.";

/// Prefix for the suggested prompt synthesised from a summary.
pub const SUMMARY_PROMPT_PREFIX: &str = "Help me with the following: ";

/// Canonical analysis returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResult {
    pub summary: String,
    pub root_causes: Vec<String>,
    pub suggested_prompt: String,
    pub alternatives: Vec<String>,
    pub confidence: f64,
}

impl AnalyzeResult {
    /// Fixed result for the degraded terminal policy, when both attempts
    /// produced unparseable output.
    pub fn degraded() -> Self {
        Self {
            summary: "Model output was not valid JSON.".to_string(),
            root_causes: vec![
                "The coach model did not follow the strict JSON-only instructions.".to_string(),
            ],
            suggested_prompt: "Please help me debug why my last LLM answer was bad.".to_string(),
            alternatives: Vec::new(),
            confidence: 0.3,
        }
    }
}

pub struct ResponseNormalizer<'a> {
    policy: &'a CoachPolicy,
}

impl<'a> ResponseNormalizer<'a> {
    pub fn new(policy: &'a CoachPolicy) -> Self {
        Self { policy }
    }

    pub fn normalize(&self, raw: &str) -> Result<AnalyzeResult, CoachError> {
        let object = extract_json_object(raw).ok_or_else(|| CoachError::extraction(raw))?;
        Ok(self.normalize_object(&object))
    }

    fn normalize_object(&self, object: &Map<String, Value>) -> AnalyzeResult {
        let summary = coerce_text(object.get("summary"));
        let suggested_prompt = coerce_text(object.get("suggested_prompt"));

        let suggested_prompt = if !suggested_prompt.is_empty() {
            suggested_prompt
        } else if !summary.is_empty() {
            debug!("suggested_prompt missing, deriving it from summary");
            format!("{}{}", SUMMARY_PROMPT_PREFIX, summary)
        } else {
            debug!("suggested_prompt and summary missing, using generic prompt");
            GENERIC_SUGGESTED_PROMPT.to_string()
        };

        let summary = if summary.is_empty() {
            self.policy.summary_fallback.clone()
        } else {
            summary
        };

        let alternatives = if self.policy.force_empty_alternatives {
            Vec::new()
        } else {
            coerce_text_list(object.get("alternatives"))
        };

        let confidence = coerce_confidence(object.get("confidence"))
            .unwrap_or_else(|| {
                debug!(raw = ?object.get("confidence"), "confidence not numeric, using policy default");
                self.policy.default_confidence
            })
            .clamp(0.0, 1.0);

        AnalyzeResult {
            summary,
            root_causes: coerce_text_list(object.get("root_causes")),
            suggested_prompt,
            alternatives,
            confidence,
        }
    }
}

/// Locate a JSON object in free-form model text.
///
/// Order: strip a leading code fence (and a `json` tag), parse directly, then
/// fall back to the span between the first `{` and the last `}`.
pub fn extract_json_object(raw: &str) -> Option<Map<String, Value>> {
    let text = strip_code_fence(raw);

    if let Some(object) = parse_object(text) {
        return Some(object);
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => parse_object(&text[start..=end]),
        _ => None,
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let text = raw.trim();
    if !text.starts_with("```") {
        return text;
    }
    let inner = text.trim_matches('`').trim_start();
    match inner.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => inner[4..].trim(),
        _ => inner.trim(),
    }
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

fn coerce_text(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(v) if is_blank(v) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

fn coerce_text_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| coerce_text(Some(item)))
            .filter(|text| !text.is_empty())
            .collect(),
        Some(scalar) => {
            let text = coerce_text(Some(scalar));
            if text.is_empty() {
                Vec::new()
            } else {
                vec![text]
            }
        }
        None => Vec::new(),
    }
}

fn coerce_confidence(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    if parsed.is_nan() {
        None
    } else {
        Some(parsed)
    }
}
