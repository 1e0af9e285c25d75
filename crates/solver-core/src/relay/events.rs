//! Shape-tolerant extraction from decoded upstream payloads.
//!
//! Upstream emits different JSON shapes across invocations, so each field is
//! probed by a small ordered list of extractors; the first one that yields a
//! value wins. A payload may be a single object or an array of objects —
//! singular payloads are treated as arrays of one.

use serde_json::Value;

/// View a payload as its item list.
pub fn payload_items(payload: &Value) -> Vec<&Value> {
    match payload {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Display text of one payload: every item probed, results concatenated.
pub fn extract_text(payload: &Value) -> String {
    payload_items(payload)
        .into_iter()
        .filter_map(item_text)
        .collect::<Vec<_>>()
        .concat()
}

fn item_text(item: &Value) -> Option<String> {
    const EXTRACTORS: [fn(&Value) -> Option<String>; 3] =
        [text_from_candidates, text_from_choices, text_from_top_level];
    EXTRACTORS.iter().find_map(|extract| extract(item))
}

/// `candidates[].content.parts[].text`, joined.
fn text_from_candidates(item: &Value) -> Option<String> {
    let candidates = item.get("candidates")?.as_array()?;
    let text: String = candidates
        .iter()
        .filter_map(|candidate| candidate.get("content")?.get("parts")?.as_array())
        .flatten()
        .filter_map(|part| part.get("text")?.as_str())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// `choices[].delta.content` or `choices[].text`.
fn text_from_choices(item: &Value) -> Option<String> {
    let choices = item.get("choices")?.as_array()?;
    let text: String = choices
        .iter()
        .filter_map(|choice| {
            choice
                .get("delta")
                .and_then(|delta| delta.get("content"))
                .or_else(|| choice.get("text"))?
                .as_str()
        })
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Top-level `text` / `outputText`.
fn text_from_top_level(item: &Value) -> Option<String> {
    item.get("text")
        .or_else(|| item.get("outputText"))?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Usage metadata of one payload item (`usageMetadata` or `usage`).
pub fn extract_usage(item: &Value) -> Option<&Value> {
    item.get("usageMetadata").or_else(|| item.get("usage")).filter(|v| !v.is_null())
}

/// Safety/block reason of one payload item, when the model refused or
/// stopped abnormally: `promptFeedback.blockReason`, or any candidate
/// `finishReason` other than a normal `STOP`.
pub fn extract_block_reason(item: &Value) -> Option<String> {
    if let Some(reason) =
        item.get("promptFeedback").and_then(|f| f.get("blockReason")).and_then(|r| r.as_str())
    {
        return Some(reason.to_string());
    }
    item.get("candidates")?
        .as_array()?
        .iter()
        .filter_map(|candidate| candidate.get("finishReason")?.as_str())
        .find(|reason| *reason != "STOP")
        .map(str::to_string)
}
