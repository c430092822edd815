//! Model output decoding.
//!
//! Primary path is one strict schema. The heuristic fallback is a separate
//! stage that tolerates code fences, wrapper objects and loosely-named score
//! fields; it is never mixed into the strict path.

use super::{Evaluation, SideEval};
use serde_json::Value;

/// Strict decode of the canonical evaluation schema.
pub fn decode_strict(text: &str) -> Result<Evaluation, serde_json::Error> {
    serde_json::from_str::<Evaluation>(text.trim())
}

/// Heuristic fallback decoder.
///
/// Accepts markdown code fences, an object nested under common wrapper keys,
/// legacy flat score fields (`score`, `ai_score`, `total_score`), and missing
/// grades (derived from the score). Returns `None` when no score can be
/// located; callers map that to `ParseFailed`.
pub fn decode_lenient(text: &str) -> Option<Evaluation> {
    let stripped = strip_code_fence(text);
    let json = extract_json_object(stripped)?;
    let value: Value = serde_json::from_str(json).ok()?;
    evaluation_from_value(&value)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Slice from the first `{` to the last `}` so surrounding prose is ignored.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn evaluation_from_value(value: &Value) -> Option<Evaluation> {
    // Unwrap one level of common wrapper keys.
    let value = ["evaluation", "result", "data"]
        .iter()
        .find_map(|key| value.get(key))
        .unwrap_or(value);

    let qualified = value.get("qualified").and_then(Value::as_bool);

    let long = value.get("long").and_then(side_from_value);
    let short = value.get("short").and_then(side_from_value);
    match (long, short) {
        (Some(long), Some(short)) => {
            return Some(Evaluation {
                long,
                short,
                qualified,
            })
        }
        (Some(side), None) | (None, Some(side)) => {
            // One-sided output: mirror it so both directions exist. The edge
            // competition gate then sees zero edge and cannot qualify.
            return Some(Evaluation {
                long: side.clone(),
                short: side,
                qualified,
            });
        }
        (None, None) => {}
    }

    // Legacy flat shape: first matching score-ish field at the top level.
    let side = side_from_value(value)?;
    Some(Evaluation {
        long: side.clone(),
        short: side,
        qualified,
    })
}

fn side_from_value(value: &Value) -> Option<SideEval> {
    let score = first_score_field(value)?;
    if !score.is_finite() {
        return None;
    }
    let grade = value
        .get("grade")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| grade_for_score(score).to_string());
    let summary = value
        .get("summary")
        .or_else(|| value.get("reason"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(SideEval {
        score,
        grade,
        summary,
    })
}

fn first_score_field(value: &Value) -> Option<f64> {
    const SCORE_KEYS: [&str; 5] = ["score", "ai_score", "aiScore", "total_score", "totalScore"];
    SCORE_KEYS
        .iter()
        .find_map(|key| value.get(key))
        .and_then(score_as_f64)
}

fn score_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn grade_for_score(score: f64) -> &'static str {
    if score >= 8.0 {
        "A"
    } else if score >= 6.5 {
        "B"
    } else if score >= 5.0 {
        "C"
    } else if score >= 3.5 {
        "D"
    } else {
        "F"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_decodes_canonical_schema() {
        let text = r#"{
            "long": {"score": 7.5, "grade": "B", "summary": "clean breakout"},
            "short": {"score": 2.0, "grade": "F", "summary": "against trend"},
            "qualified": true
        }"#;
        let eval = decode_strict(text).unwrap();
        assert_eq!(eval.long.score, 7.5);
        assert_eq!(eval.short.grade, "F");
        assert_eq!(eval.qualified, Some(true));
    }

    #[test]
    fn strict_rejects_garbage() {
        assert!(decode_strict("the stock looks great, 10/10").is_err());
        assert!(decode_lenient("the stock looks great, 10/10").is_none());
    }

    #[test]
    fn lenient_strips_code_fences_and_prose() {
        let text = "Here is my analysis:\n```json\n{\"long\": {\"score\": 8.2}, \"short\": {\"score\": 3.1}}\n```";
        let eval = decode_lenient(text).unwrap();
        assert_eq!(eval.long.score, 8.2);
        assert_eq!(eval.long.grade, "A"); // derived
        assert_eq!(eval.short.score, 3.1);
    }

    #[test]
    fn lenient_handles_legacy_flat_fields() {
        for key in ["score", "ai_score", "totalScore"] {
            let text = format!("{{\"{key}\": \"6.9\", \"grade\": \"B\", \"reason\": \"ok\"}}");
            let eval = decode_lenient(&text).unwrap();
            assert_eq!(eval.long.score, 6.9, "key {key}");
            // Flat output mirrors into both sides.
            assert_eq!(eval.long, eval.short);
            assert_eq!(eval.long.summary, "ok");
        }
    }

    #[test]
    fn lenient_unwraps_wrapper_objects() {
        let text = r#"{"result": {"long": {"score": 5.5}, "short": {"score": 7.0, "grade": "B"}}}"#;
        let eval = decode_lenient(text).unwrap();
        assert_eq!(eval.short.score, 7.0);
    }

    #[test]
    fn lenient_rejects_non_finite_scores() {
        let text = r#"{"score": "NaN"}"#;
        assert!(decode_lenient(text).is_none());
    }
}
