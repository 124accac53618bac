use serde_json::{Deserializer, Value};

use crate::fabricate_call_id;
use crate::wire::{WireFunctionCall, WireToolCall};

/// Recovers tool calls that a model wrote as inline JSON inside its text.
///
/// Every `{` is a candidate start. A candidate that decodes as one complete
/// JSON object with a string `name` and an `arguments` value becomes a call
/// and is cut from the text; other decoded objects stay verbatim; anything
/// that does not decode leaves the brace as ordinary text. Returns the calls
/// in order of appearance and the trimmed remainder.
pub fn extract_tool_calls(text: &str) -> (Vec<WireToolCall>, String) {
    let mut calls = Vec::new();
    let mut remainder = String::with_capacity(text.len());
    let mut cursor = 0;

    while cursor < text.len() {
        let Some(offset) = text[cursor..].find('{') else {
            remainder.push_str(&text[cursor..]);
            break;
        };
        let start = cursor + offset;
        remainder.push_str(&text[cursor..start]);

        let mut values = Deserializer::from_str(&text[start..]).into_iter::<Value>();
        let decoded = match values.next() {
            Some(Ok(Value::Object(object))) => Some(object),
            _ => None,
        };
        let Some(object) = decoded else {
            remainder.push('{');
            cursor = start + 1;
            continue;
        };
        let end = start + values.byte_offset();

        match recovered_call(&object) {
            Some(call) => calls.push(call),
            None => remainder.push_str(&text[start..end]),
        }
        cursor = end;
    }

    (calls, remainder.trim().to_string())
}

fn recovered_call(object: &serde_json::Map<String, Value>) -> Option<WireToolCall> {
    let name = object.get("name")?.as_str()?;
    let arguments = match object.get("arguments")? {
        Value::String(raw) => raw.clone(),
        Value::Null => "{}".to_string(),
        other => serde_json::to_string(other).ok()?,
    };
    let id = object
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(fabricate_call_id);

    Some(WireToolCall {
        id,
        kind: "function".to_string(),
        function: WireFunctionCall { name: name.to_string(), arguments },
    })
}
