//! Turns an LLM completion back into clips.

use crate::errors::ParseError;
use crate::model::{CaptionedClip, ClipData, MaskedVideo, Reconstructed};
use regex::Regex;
use std::sync::OnceLock;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n?(.*?)\s*```$").expect("valid regex"))
}

fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match fence_re().captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => trimmed,
    }
}

/// Parse a completion into exactly `expected_len` clips.
///
/// Accepts a bare JSON array, the same wrapped in a Markdown code fence, or an
/// object whose only array-valued field holds the clips (JSON mode forces the
/// model to answer with an object).
pub fn parse_llm_response(
    text: &str,
    expected_len: usize,
) -> Result<Vec<CaptionedClip>, ParseError> {
    let body = strip_fence(text);
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let array = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(map) => {
            let mut arrays: Vec<serde_json::Value> =
                map.into_iter().map(|(_, v)| v).filter(|v| v.is_array()).collect();
            if arrays.len() != 1 {
                return Err(ParseError::Shape(format!(
                    "object must hold exactly one clip array, found {}",
                    arrays.len()
                )));
            }
            arrays.remove(0)
        }
        other => {
            return Err(ParseError::Shape(format!(
                "expected a JSON array of clips, got {}",
                json_kind(&other)
            )))
        }
    };

    let clips: Vec<CaptionedClip> =
        serde_json::from_value(array).map_err(|e| ParseError::Shape(e.to_string()))?;
    if clips.len() != expected_len {
        return Err(ParseError::LengthMismatch {
            expected: expected_len,
            actual: clips.len(),
        });
    }
    Ok(clips)
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Take the filled clips at the masked positions. Timestamps come from the
/// input, never from the model.
pub fn fill_from_response(
    masked: &MaskedVideo,
    parsed: Vec<CaptionedClip>,
) -> Result<Reconstructed, ParseError> {
    if parsed.len() != masked.video.clips.len() {
        return Err(ParseError::LengthMismatch {
            expected: masked.video.clips.len(),
            actual: parsed.len(),
        });
    }

    let mut out = Reconstructed::new(masked.video_id());
    for &idx in &masked.masked_indices {
        let data = match &parsed[idx].data {
            ClipData::Caption(p) if !p.description.trim().is_empty() => ClipData::Caption(p.clone()),
            _ => return Err(ParseError::Unfilled { index: idx }),
        };
        out.reconstructed_clips.insert(
            idx,
            CaptionedClip {
                timestamp: masked.video.clips[idx].timestamp,
                data,
            },
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masking::apply_mask;
    use crate::model::{CaptionedVideo, DATA_MISSING};

    fn masked() -> MaskedVideo {
        apply_mask(
            &CaptionedVideo {
                video_id: "v".into(),
                clips: vec![
                    CaptionedClip::new(1.0, "a"),
                    CaptionedClip::new(2.0, "b"),
                    CaptionedClip::new(3.0, "c"),
                ],
            },
            vec![1],
        )
    }

    const FILLED: &str = r#"[
        {"timestamp": 1.0, "data": {"description": "a"}},
        {"timestamp": 99.0, "data": {"description": "guess"}},
        {"timestamp": 3.0, "data": {"description": "c"}}
    ]"#;

    #[test]
    fn parses_plain_and_fenced_arrays() {
        assert_eq!(parse_llm_response(FILLED, 3).unwrap().len(), 3);
        let fenced = format!("```json\n{FILLED}\n```");
        assert_eq!(parse_llm_response(&fenced, 3).unwrap().len(), 3);
        let bare_fence = format!("  ```\n{FILLED}```  ");
        assert_eq!(parse_llm_response(&bare_fence, 3).unwrap().len(), 3);
    }

    #[test]
    fn parses_single_array_object() {
        let wrapped = format!(r#"{{"reconstructed_caption": {FILLED}}}"#);
        assert_eq!(parse_llm_response(&wrapped, 3).unwrap().len(), 3);

        let ambiguous = format!(r#"{{"a": {FILLED}, "b": []}}"#);
        assert!(matches!(
            parse_llm_response(&ambiguous, 3),
            Err(ParseError::Shape(_))
        ));
    }

    #[test]
    fn rejects_bad_json_and_shapes() {
        assert!(matches!(
            parse_llm_response("Sure! Here you go: [", 3),
            Err(ParseError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_llm_response("42", 3),
            Err(ParseError::Shape(_))
        ));
        assert!(matches!(
            parse_llm_response(r#"[{"timestamp": 1.0}]"#, 1),
            Err(ParseError::Shape(_))
        ));
        assert_eq!(
            parse_llm_response(FILLED, 4).unwrap_err(),
            ParseError::LengthMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn fill_keeps_input_timestamps() {
        let m = masked();
        let parsed = parse_llm_response(FILLED, 3).unwrap();
        let r = fill_from_response(&m, parsed).unwrap();
        assert_eq!(r.reconstructed_clips.len(), 1);
        assert_eq!(r.reconstructed_clips[&1], CaptionedClip::new(2.0, "guess"));
    }

    #[test]
    fn fill_rejects_unfilled_masks() {
        let m = masked();
        let still_missing = FILLED.replace(r#"{"description": "guess"}"#, &format!("\"{DATA_MISSING}\""));
        let parsed = parse_llm_response(&still_missing, 3).unwrap();
        assert_eq!(
            fill_from_response(&m, parsed).unwrap_err(),
            ParseError::Unfilled { index: 1 }
        );
    }
}
