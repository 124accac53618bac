use otter_contracts::{FinishReason, GenericResponse, Part, UsageMetadata};
use otter_core::CoreError;
use serde_json::{Map, Value};
use tracing::error;

use crate::extract::extract_tool_calls;
use crate::fabricate_call_id;
use crate::wire::{ChatCompletionsResponse, ResponseMessage, WireToolCall, WireUsage};

const REASONING_KEYS: [&str; 4] = ["text", "content", "reasoning", "reasoning_content"];

/// Decodes one complete (non-streaming) chat-completions body.
pub fn decode_response(body: &[u8]) -> Result<GenericResponse, CoreError> {
    let payload = serde_json::from_slice::<ChatCompletionsResponse>(body).map_err(|err| {
        error!(event = "provider.response.decode_failed", error = %err);
        CoreError::Decode(format!("chat completion response: {err}"))
    })?;
    convert_response(payload)
}

pub fn convert_response(payload: ChatCompletionsResponse) -> Result<GenericResponse, CoreError> {
    let choice = payload
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::Decode("no choices in response".to_string()))?;
    let message =
        choice.message.ok_or_else(|| CoreError::Decode("no message in response".to_string()))?;

    let reasoning = extract_reasoning(&message);
    let mut text = extract_message_content(&message.content).unwrap_or_default();
    let mut tool_calls = message.tool_calls.unwrap_or_default();
    if tool_calls.is_empty() && !text.is_empty() {
        let (recovered, remainder) = extract_tool_calls(&text);
        if !recovered.is_empty() {
            tool_calls = recovered;
            text = remainder;
        }
    }

    Ok(GenericResponse {
        parts: assemble_parts(reasoning, &text, &tool_calls)?,
        finish_reason: Some(FinishReason::from_wire(choice.finish_reason.as_deref().unwrap_or(""))),
        usage_metadata: usage_metadata(payload.usage.as_ref()),
        partial: false,
    })
}

/// Builds final parts in the order reasoning, text, function calls.
pub(crate) fn assemble_parts(
    reasoning: Vec<String>,
    text: &str,
    tool_calls: &[WireToolCall],
) -> Result<Vec<Part>, CoreError> {
    let mut parts = reasoning.into_iter().map(Part::reasoning).collect::<Vec<_>>();
    if !text.is_empty() {
        parts.push(Part::text(text));
    }
    for call in tool_calls {
        let args = parse_arguments(&call.function.name, &call.function.arguments)?;
        let id = if call.id.is_empty() { fabricate_call_id() } else { call.id.clone() };
        parts.push(Part::function_call(Some(id), call.function.name.clone(), args));
    }
    Ok(parts)
}

/// Parses a tool-call argument string. Blank or `null` input is an empty map.
pub(crate) fn parse_arguments(name: &str, raw: &str) -> Result<Map<String, Value>, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Map::new());
    }
    serde_json::from_str::<Map<String, Value>>(raw).map_err(|err| {
        error!(event = "provider.response.arguments_invalid", tool = name, error = %err);
        CoreError::Decode(format!("function `{name}` arguments: {err}"))
    })
}

pub(crate) fn usage_metadata(usage: Option<&WireUsage>) -> Option<UsageMetadata> {
    let usage = usage?;
    Some(UsageMetadata {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        cached_tokens: usage.prompt_tokens_details.as_ref().and_then(|d| d.cached_tokens),
    })
}

fn extract_message_content(content: &Value) -> Option<String> {
    match content {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Array(parts) => {
            let text = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>();
            if text.is_empty() { None } else { Some(text) }
        }
        _ => None,
    }
}

fn extract_reasoning(message: &ResponseMessage) -> Vec<String> {
    let mut texts = Vec::new();
    collect_reasoning_texts(&message.reasoning_content, &mut texts);
    if !texts.is_empty() {
        return texts;
    }
    if let Some(reasoning) = message.reasoning.as_deref().filter(|v| !v.trim().is_empty()) {
        return vec![reasoning.to_string()];
    }
    message
        .reasoning_details
        .as_deref()
        .and_then(extract_reasoning_from_details)
        .into_iter()
        .collect()
}

fn collect_reasoning_texts(content: &Value, texts: &mut Vec<String>) {
    match content {
        Value::String(text) if !text.is_empty() => texts.push(text.clone()),
        Value::Array(items) => {
            for item in items {
                collect_reasoning_texts(item, texts);
            }
        }
        Value::Object(object) => {
            for key in REASONING_KEYS {
                if let Some(text) = object.get(key).and_then(Value::as_str)
                    && !text.is_empty()
                {
                    texts.push(text.to_string());
                }
            }
        }
        _ => {}
    }
}

fn extract_reasoning_from_details(details: &[Value]) -> Option<String> {
    let text = details
        .iter()
        .filter_map(|detail| {
            let kind = detail.get("type").and_then(Value::as_str)?;
            match kind {
                "reasoning.summary" => detail.get("summary").and_then(Value::as_str),
                "reasoning.text" => detail.get("text").and_then(Value::as_str),
                _ => None,
            }
        })
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() { None } else { Some(text) }
}
