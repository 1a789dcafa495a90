//! SSE event rewriting.
//!
//! Upstream chat-completion streams are not always well-formed for strict
//! SSE consumers. Three independent per-event fixes are applied:
//!
//! 1. `data:{...}` missing the space after the field name gets one.
//! 2. `tool_calls` deltas missing the mandatory `index` get `index: 0`.
//! 3. Payloads reporting a hardcoded `gpt-4o-mini*` model are rewritten to
//!    the configured replacement.
//!
//! Everything the fixes do not touch survives unchanged, field order
//! included.

use serde_json::Value;
use std::borrow::Cow;

/// Model-name prefix some upstreams hardcode for their fast model.
pub const FAST_MODEL_PREFIX: &str = "gpt-4o-mini";

const DATA_PREFIX: &str = "data: ";

/// Fix a single SSE line, returning the corrected bytes.
///
/// Total and side-effect-free: malformed UTF-8 is decoded lossily and
/// malformed JSON passes through unchanged rather than erroring. The
/// function is idempotent: applying it twice yields the same bytes as
/// applying it once.
pub fn fix_sse_line(line_bytes: &[u8], replacement_model: Option<&str>) -> Vec<u8> {
    let line = String::from_utf8_lossy(line_bytes);

    // Fix 1: insert the space after "data:" if missing.
    let line: Cow<'_, str> = if line.starts_with("data:") && !line.starts_with(DATA_PREFIX) {
        Cow::Owned(format!("data: {}", &line[5..]))
    } else {
        line
    };

    // Non-JSON payloads ([DONE], comments, other fields) pass through.
    if !line.starts_with("data: {") {
        return line.into_owned().into_bytes();
    }

    let Ok(mut payload) = serde_json::from_str::<Value>(&line[DATA_PREFIX.len()..]) else {
        return line.into_owned().into_bytes();
    };

    let mut changed = patch_tool_call_indices(&mut payload);
    if let Some(model) = replacement_model {
        changed |= patch_model(&mut payload, model);
    }

    if changed {
        // serde_json's Display is the compact form.
        format!("data: {}", payload).into_bytes()
    } else {
        line.into_owned().into_bytes()
    }
}

/// Rewrite a hardcoded fast-model name in a JSON request body.
///
/// Returns `None` when nothing needs rewriting (malformed JSON included),
/// in which case the body must be forwarded untouched.
pub fn rewrite_request_model(body: &[u8], replacement: &str) -> Option<Vec<u8>> {
    let mut payload: Value = serde_json::from_slice(body).ok()?;
    if !patch_model(&mut payload, replacement) {
        return None;
    }
    serde_json::to_vec(&payload).ok()
}

/// Fix 2: insert `index: 0` into tool-call deltas that lack one.
fn patch_tool_call_indices(payload: &mut Value) -> bool {
    let mut changed = false;
    let Some(choices) = payload.get_mut("choices").and_then(Value::as_array_mut) else {
        return false;
    };
    for choice in choices {
        let Some(tool_calls) = choice
            .get_mut("delta")
            .and_then(|delta| delta.get_mut("tool_calls"))
            .and_then(Value::as_array_mut)
        else {
            continue;
        };
        for call in tool_calls {
            if let Some(call) = call.as_object_mut() {
                if !call.contains_key("index") {
                    call.insert("index".to_string(), Value::from(0));
                    changed = true;
                }
            }
        }
    }
    changed
}

/// Fix 3: replace a `gpt-4o-mini*` model name with the configured one.
fn patch_model(payload: &mut Value, replacement: &str) -> bool {
    let hardcoded = payload
        .get("model")
        .and_then(Value::as_str)
        .is_some_and(|model| model.starts_with(FAST_MODEL_PREFIX));
    if hardcoded {
        payload["model"] = Value::String(replacement.to_string());
    }
    hardcoded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(line: &str) -> String {
        String::from_utf8(fix_sse_line(line.as_bytes(), None)).unwrap()
    }

    fn fix_with_model(line: &str, model: &str) -> String {
        String::from_utf8(fix_sse_line(line.as_bytes(), Some(model))).unwrap()
    }

    #[test]
    fn non_data_lines_pass_through() {
        for line in ["", ": keep-alive", "event: message", "retry: 3000", "id: 7"] {
            assert_eq!(fix(line), line);
        }
    }

    #[test]
    fn missing_space_is_inserted() {
        assert_eq!(fix(r#"data:{"choices":[]}"#), r#"data: {"choices":[]}"#);
    }

    #[test]
    fn existing_space_is_untouched() {
        let line = r#"data: {"choices":[]}"#;
        assert_eq!(fix(line), line);
    }

    #[test]
    fn done_sentinel_is_not_parsed() {
        assert_eq!(fix("data: [DONE]"), "data: [DONE]");
        assert_eq!(fix("data:[DONE]"), "data: [DONE]");
    }

    #[test]
    fn malformed_json_passes_through() {
        let line = r#"data: {"choices": oops"#;
        assert_eq!(fix(line), line);
    }

    #[test]
    fn missing_tool_call_index_defaults_to_zero() {
        let fixed = fix(r#"data: {"choices":[{"delta":{"tool_calls":[{},{"index":5}]}}]}"#);
        let payload: Value = serde_json::from_str(&fixed[DATA_PREFIX.len()..]).unwrap();
        let calls = &payload["choices"][0]["delta"]["tool_calls"];
        assert_eq!(calls[0]["index"], 0);
        assert_eq!(calls[1]["index"], 5);
    }

    #[test]
    fn untouched_fields_keep_their_order() {
        let fixed =
            fix(r#"data:{"id":"c-1","choices":[{"delta":{"tool_calls":[{"type":"function"}]}}],"created":9}"#);
        assert_eq!(
            fixed,
            r#"data: {"id":"c-1","choices":[{"delta":{"tool_calls":[{"type":"function","index":0}]}}],"created":9}"#
        );
    }

    #[test]
    fn hardcoded_model_is_rewritten() {
        assert_eq!(
            fix_with_model(r#"data: {"model":"gpt-4o-mini-2024","choices":[]}"#, "custom-model"),
            r#"data: {"model":"custom-model","choices":[]}"#
        );
    }

    #[test]
    fn other_models_are_left_alone() {
        let line = r#"data: {"model":"other-model","choices":[]}"#;
        assert_eq!(fix_with_model(line, "custom-model"), line);
    }

    #[test]
    fn model_is_untouched_without_a_replacement() {
        let line = r#"data: {"model":"gpt-4o-mini","choices":[]}"#;
        assert_eq!(fix(line), line);
    }

    #[test]
    fn fix_is_idempotent() {
        let inputs = [
            "",
            "event: message",
            "data: [DONE]",
            "data:[DONE]",
            r#"data:{"choices":[]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{}]}}]}"#,
            r#"data: {"model":"gpt-4o-mini","choices":[]}"#,
            r#"data: {"choices": oops"#,
        ];
        for input in inputs {
            let once = fix_sse_line(input.as_bytes(), Some("custom-model"));
            let twice = fix_sse_line(&once, Some("custom-model"));
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn request_model_is_rewritten() {
        let body = rewrite_request_model(br#"{"model":"gpt-4o-mini","stream":true}"#, "custom-model")
            .unwrap();
        assert_eq!(body, br#"{"model":"custom-model","stream":true}"#);
    }

    #[test]
    fn request_rewrite_skips_other_models_and_malformed_bodies() {
        assert!(rewrite_request_model(br#"{"model":"other","stream":true}"#, "m").is_none());
        assert!(rewrite_request_model(br#"{"stream":true}"#, "m").is_none());
        assert!(rewrite_request_model(b"not json", "m").is_none());
    }
}
