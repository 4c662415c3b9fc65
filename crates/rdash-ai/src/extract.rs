//! Structured result extraction from free-form model output.
//!
//! Models wrap JSON in markdown fences, lead with prose, or trail off with
//! commentary. Extraction runs an ordered chain of strategies, each of which
//! proposes a candidate slice of the text. The first candidate that parses
//! as JSON wins; a strategy whose candidate does not parse hands over to the
//! next one.

use rdash_models::{AnalysisResult, Segment};
use serde_json::{Map, Value};
use tracing::debug;

/// Result of the strategy chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Parsed(Value),
    Failed,
}

/// Result of normalizing a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// JSON object with a `segments` array
    Parsed(AnalysisResult),
    /// Parseable JSON without usable `segments`, coerced to an empty result
    Coerced(AnalysisResult),
    /// No strategy produced parseable JSON
    Failed,
}

impl ParseOutcome {
    pub fn into_result(self) -> Option<AnalysisResult> {
        match self {
            ParseOutcome::Parsed(result) | ParseOutcome::Coerced(result) => Some(result),
            ParseOutcome::Failed => None,
        }
    }
}

type ExtractStrategy = fn(&str) -> Option<&str>;

const STRATEGIES: [(&str, ExtractStrategy); 3] = [
    ("fenced_block", fenced_block),
    ("brace_span", brace_span),
    ("verbatim", verbatim),
];

const FENCE: &str = "```";

/// First `{` after a code fence marker through the last `}` in the text.
fn fenced_block(text: &str) -> Option<&str> {
    let fence = text.find(FENCE)?;
    let after_fence = fence + FENCE.len();
    let start = after_fence + text[after_fence..].find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// First `{` through the last `}` anywhere in the text.
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn verbatim(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Locate and parse the JSON value embedded in `text`.
pub fn extract_json(text: &str) -> Extracted {
    for (name, strategy) in STRATEGIES {
        let Some(candidate) = strategy(text) else {
            continue;
        };

        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => {
                debug!(strategy = name, "Extracted JSON from model response");
                return Extracted::Parsed(value);
            }
            Err(e) => {
                debug!(strategy = name, "Candidate did not parse: {}", e);
            }
        }
    }

    Extracted::Failed
}

/// Extract and normalize an [`AnalysisResult`] from raw model output.
pub fn parse_response(text: &str) -> ParseOutcome {
    match extract_json(text) {
        Extracted::Parsed(value) => normalize(value),
        Extracted::Failed => ParseOutcome::Failed,
    }
}

/// Convert a parsed JSON value into an [`AnalysisResult`].
///
/// Non-object values and objects without a `segments` array are coerced to
/// an empty result. Entries that are not objects or lack numeric bounds are
/// dropped.
pub fn normalize(value: Value) -> ParseOutcome {
    let Value::Object(map) = value else {
        return ParseOutcome::Coerced(AnalysisResult::empty());
    };

    let Some(Value::Array(entries)) = map.get("segments") else {
        return ParseOutcome::Coerced(AnalysisResult::empty());
    };

    let total = entries.len();
    let segments: Vec<Segment> = entries.iter().filter_map(segment_from_value).collect();

    if segments.len() < total {
        debug!(
            kept = segments.len(),
            dropped = total - segments.len(),
            "Dropped malformed segments"
        );
    }

    ParseOutcome::Parsed(AnalysisResult::new(segments))
}

fn segment_from_value(value: &Value) -> Option<Segment> {
    let obj = value.as_object()?;
    let start = seconds(obj, "start_time")?;
    let end = seconds(obj, "end_time")?;

    let description = match obj.get("description") {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    };

    Some(Segment::new(start, end, description))
}

/// Number or numeric string, finite only.
fn seconds(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    let n = match obj.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn one_segment(start: f64, end: f64, description: &str) -> AnalysisResult {
        AnalysisResult::new(vec![Segment::new(start, end, description)])
    }

    #[test]
    fn test_fenced_response() {
        let text = "Here you go:\n```json\n{\"segments\":[{\"start_time\":0,\"end_time\":5,\"description\":\"pick\"}]}\n```";
        assert_eq!(
            parse_response(text),
            ParseOutcome::Parsed(one_segment(0.0, 5.0, "pick"))
        );
    }

    #[test]
    fn test_prose_wrapped_response() {
        let text = r#"Sure! {"segments": [{"start_time": 1.5, "end_time": 3, "description": "navigate"}]} Hope this helps."#;
        assert_eq!(
            parse_response(text),
            ParseOutcome::Parsed(one_segment(1.5, 3.0, "navigate"))
        );
    }

    #[test]
    fn test_fence_without_braces_falls_through() {
        // The fence marker is present but the JSON before it is what parses
        let text = r#"{"segments": []} and then ``` trailing fence"#;
        assert_eq!(
            parse_response(text),
            ParseOutcome::Parsed(AnalysisResult::empty())
        );
    }

    #[test]
    fn test_broken_fenced_candidate_falls_through_to_verbatim() {
        assert_eq!(fenced_block("``` {not json}"), Some("{not json}"));
        assert_eq!(extract_json("``` {not json}"), Extracted::Failed);
        assert_eq!(extract_json("  [1, 2]  "), Extracted::Parsed(json!([1, 2])));
    }

    #[test]
    fn test_missing_segments_key_is_coerced() {
        assert_eq!(
            parse_response(r#"{"activities": [1, 2]}"#),
            ParseOutcome::Coerced(AnalysisResult::empty())
        );
        assert_eq!(
            parse_response(r#"{"segments": "none"}"#),
            ParseOutcome::Coerced(AnalysisResult::empty())
        );
        assert_eq!(
            parse_response("42"),
            ParseOutcome::Coerced(AnalysisResult::empty())
        );
    }

    #[test]
    fn test_non_json_fails() {
        assert_eq!(parse_response("I could not analyze this video."), ParseOutcome::Failed);
        assert_eq!(parse_response(""), ParseOutcome::Failed);
        assert_eq!(parse_response("} backwards {"), ParseOutcome::Failed);
    }

    #[test]
    fn test_lenient_segment_fields() {
        let value = json!({
            "segments": [
                {"start_time": "2.5", "end_time": "4", "description": "inspect"},
                {"start_time": 9, "end_time": 6, "description": "reversed"},
                {"start_time": 1, "end_time": 2},
                {"start_time": "soon", "end_time": 3, "description": "bad"},
                {"end_time": 3, "description": "no start"},
                "not an object"
            ]
        });

        let ParseOutcome::Parsed(result) = normalize(value) else {
            panic!("expected parsed outcome");
        };
        assert_eq!(
            result.segments,
            vec![
                Segment::new(2.5, 4.0, "inspect"),
                Segment::new(6.0, 9.0, "reversed"),
                Segment::new(1.0, 2.0, ""),
            ]
        );
        assert!(result.segments.iter().all(|s| s.start_time <= s.end_time));
    }

    #[test]
    fn test_into_result() {
        assert!(ParseOutcome::Failed.into_result().is_none());
        assert_eq!(
            ParseOutcome::Coerced(AnalysisResult::empty()).into_result(),
            Some(AnalysisResult::empty())
        );
    }

    fn quarter_seconds() -> impl Strategy<Value = f64> {
        (0u32..40_000).prop_map(|n| n as f64 / 4.0)
    }

    fn arb_result() -> impl Strategy<Value = AnalysisResult> {
        prop::collection::vec(
            (quarter_seconds(), quarter_seconds(), "[a-zA-Z0-9 ,.'!?-]{0,40}"),
            0..8,
        )
        .prop_map(|segs| {
            AnalysisResult::new(
                segs.into_iter()
                    .map(|(a, b, d)| Segment::new(a.min(b), a.max(b), d))
                    .collect(),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_embedded_result_is_recovered(
            result in arb_result(),
            prefix in "[a-zA-Z0-9 :.,\n]{0,60}",
            suffix in "[a-zA-Z0-9 :.,\n]{0,60}",
            fenced in any::<bool>(),
        ) {
            let json = serde_json::to_string(&result).unwrap();
            let text = if fenced {
                format!("{prefix}\n```json\n{json}\n```\n{suffix}")
            } else {
                format!("{prefix}{json}{suffix}")
            };

            prop_assert_eq!(parse_response(&text), ParseOutcome::Parsed(result));
        }

        #[test]
        fn prop_extraction_never_panics(text in "\\PC{0,200}") {
            let _ = parse_response(&text);
        }
    }
}
