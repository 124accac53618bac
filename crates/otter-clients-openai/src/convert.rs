use base64::{Engine as _, engine::general_purpose::STANDARD};
use otter_contracts::{FunctionCall, Part, Role, Schema, ToolDeclaration, Turn};
use otter_core::CoreError;
use serde_json::{Map, Value};
use tracing::debug;

use crate::fabricate_call_id;
use crate::wire::{
    WireContent, WireContentPart, WireFile, WireFunction, WireFunctionCall, WireMessage, WireRole,
    WireTool, WireToolCall, WireUrl,
};

const TEXT_SEPARATOR: &str = "\n";

/// Converts one turn into zero or more wire messages.
///
/// A turn carrying any function response becomes tool-role messages only.
/// Otherwise the turn collapses into a single message whose shape is picked
/// by priority: tool calls, then mixed multimodal content, then plain text.
pub fn convert_turn(turn: &Turn) -> Result<Vec<WireMessage>, CoreError> {
    if turn.parts.is_empty() {
        return Ok(Vec::new());
    }

    let tool_messages = turn
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::FunctionResponse(response) => Some(response),
            _ => None,
        })
        .map(|response| {
            let content = serde_json::to_string(&response.response).map_err(|err| {
                CoreError::Encode(format!("function response `{}`: {err}", response.name))
            })?;
            Ok(WireMessage {
                role: WireRole::Tool,
                content: Some(WireContent::Text(content)),
                tool_calls: Vec::new(),
                tool_call_id: Some(non_blank_id(response.id.as_deref())),
            })
        })
        .collect::<Result<Vec<_>, CoreError>>()?;
    if !tool_messages.is_empty() {
        return Ok(tool_messages);
    }

    let role = match turn.role {
        Role::User => WireRole::User,
        Role::Model => WireRole::Assistant,
    };

    let mut texts: Vec<String> = Vec::new();
    let mut media: Vec<WireContentPart> = Vec::new();
    let mut tool_calls: Vec<WireToolCall> = Vec::new();

    for part in &turn.parts {
        match part {
            Part::Text { text } if !text.is_empty() => texts.push(text.clone()),
            Part::Text { .. } => {}
            Part::Reasoning { .. } => {
                debug!(event = "provider.request.part.dropped", kind = "reasoning");
            }
            Part::InlineBinary { mime_type, data } if !data.is_empty() => {
                convert_inline_binary(mime_type, data, &mut texts, &mut media);
            }
            Part::InlineBinary { .. } => {}
            Part::FileRef { uri } if !uri.is_empty() => media.push(WireContentPart::File {
                file: WireFile { file_data: None, file_id: Some(uri.clone()) },
            }),
            Part::FileRef { .. } => {}
            Part::FunctionCall(call) => tool_calls.push(convert_function_call(call)?),
            Part::FunctionResponse(_) => {}
        }
    }

    let message = if !tool_calls.is_empty() {
        let content = if texts.is_empty() {
            None
        } else {
            Some(WireContent::Text(texts.join(TEXT_SEPARATOR)))
        };
        WireMessage { role, content, tool_calls, tool_call_id: None }
    } else if !media.is_empty() {
        let mut parts = texts
            .into_iter()
            .map(|text| WireContentPart::Text { text })
            .collect::<Vec<_>>();
        parts.extend(media);
        WireMessage {
            role,
            content: Some(WireContent::Parts(parts)),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    } else if !texts.is_empty() {
        WireMessage::text(role, texts.join(TEXT_SEPARATOR))
    } else {
        return Ok(Vec::new());
    };

    Ok(vec![message])
}

fn convert_inline_binary(
    mime_type: &str,
    data: &[u8],
    texts: &mut Vec<String>,
    media: &mut Vec<WireContentPart>,
) {
    if mime_type.starts_with("text/") {
        texts.push(String::from_utf8_lossy(data).into_owned());
        return;
    }

    let data_uri = format!("data:{mime_type};base64,{}", STANDARD.encode(data));
    let url = WireUrl { url: data_uri.clone() };
    let part = if mime_type.starts_with("image/") {
        WireContentPart::ImageUrl { image_url: url }
    } else if mime_type.starts_with("audio/") {
        WireContentPart::AudioUrl { audio_url: url }
    } else if mime_type.starts_with("video/") {
        WireContentPart::VideoUrl { video_url: url }
    } else if mime_type == "application/pdf" || mime_type == "application/json" {
        WireContentPart::File { file: WireFile { file_data: Some(data_uri), file_id: None } }
    } else {
        debug!(event = "provider.request.part.dropped", kind = "inline_binary", mime_type);
        return;
    };
    media.push(part);
}

fn convert_function_call(call: &FunctionCall) -> Result<WireToolCall, CoreError> {
    let arguments = serde_json::to_string(&call.args)
        .map_err(|err| CoreError::Encode(format!("function call `{}` arguments: {err}", call.name)))?;
    Ok(WireToolCall {
        id: non_blank_id(call.id.as_deref()),
        kind: "function".to_string(),
        function: WireFunctionCall { name: call.name.clone(), arguments },
    })
}

fn non_blank_id(id: Option<&str>) -> String {
    id.filter(|value| !value.trim().is_empty()).map(str::to_string).unwrap_or_else(fabricate_call_id)
}

/// Converts a tool declaration into the wire `{type: "function", ...}` shape.
///
/// Never fails: unusable parameter schemas degrade to an empty object.
pub fn convert_tool(tool: &ToolDeclaration) -> WireTool {
    WireTool {
        kind: "function".to_string(),
        function: WireFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: convert_parameters(tool),
        },
    }
}

fn convert_parameters(tool: &ToolDeclaration) -> Map<String, Value> {
    if let Some(Value::Object(params)) = &tool.parameters_json_schema {
        return params.clone();
    }
    if let Some(schema) = &tool.parameters {
        return convert_root_schema(schema);
    }
    if tool.parameters_json_schema.is_some() {
        debug!(event = "provider.request.tool.schema_ignored", tool = %tool.name);
    }
    Map::new()
}

fn convert_root_schema(schema: &Schema) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("type".to_string(), Value::String("object".to_string()));
    if !schema.properties.is_empty() {
        params.insert("properties".to_string(), convert_properties(schema));
    }
    if !schema.required.is_empty() {
        params.insert("required".to_string(), string_array(&schema.required));
    }
    params
}

fn convert_schema(schema: &Schema) -> Value {
    let mut result = Map::new();
    if let Some(kind) = schema.kind.as_str() {
        result.insert("type".to_string(), Value::String(kind.to_string()));
    }
    if let Some(description) = schema.description.as_deref().filter(|v| !v.is_empty()) {
        result.insert("description".to_string(), Value::String(description.to_string()));
    }
    if let Some(items) = &schema.items {
        result.insert("items".to_string(), convert_schema(items));
    }
    if !schema.properties.is_empty() {
        result.insert("properties".to_string(), convert_properties(schema));
    }
    if !schema.enum_values.is_empty() {
        result.insert("enum".to_string(), string_array(&schema.enum_values));
    }
    if !schema.required.is_empty() {
        result.insert("required".to_string(), string_array(&schema.required));
    }
    Value::Object(result)
}

fn convert_properties(schema: &Schema) -> Value {
    Value::Object(
        schema
            .properties
            .iter()
            .map(|(name, property)| (name.clone(), convert_schema(property)))
            .collect(),
    )
}

fn string_array(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

#[cfg(test)]
mod tests {
    use otter_contracts::SchemaType;
    use serde_json::json;

    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn text_only_turn_joins_parts() {
        let turn = Turn::new(Role::Model, vec![Part::text("first"), Part::text("second")]);
        let messages = convert_turn(&turn).expect("convert");
        assert_eq!(messages, vec![WireMessage::text(WireRole::Assistant, "first\nsecond")]);
    }

    #[test]
    fn converting_same_turn_twice_is_stable() {
        let turn = Turn::new(
            Role::Model,
            vec![
                Part::text("checking"),
                Part::function_call(Some("call_1".to_string()), "list_events", Map::new()),
            ],
        );
        assert_eq!(convert_turn(&turn).expect("first"), convert_turn(&turn).expect("second"));
    }

    #[test]
    fn empty_turn_yields_no_messages() {
        assert!(convert_turn(&Turn::new(Role::User, Vec::new())).expect("convert").is_empty());
        let blank = Turn::new(Role::User, vec![Part::text("")]);
        assert!(convert_turn(&blank).expect("convert").is_empty());
    }

    #[test]
    fn function_responses_win_over_other_parts() {
        let turn = Turn::new(
            Role::User,
            vec![
                Part::text("ignored"),
                Part::function_response(
                    Some("call_a".to_string()),
                    "create_event",
                    args(json!({"ok": true})),
                ),
                Part::function_response(None, "list_events", args(json!({"events": []}))),
            ],
        );
        let messages = convert_turn(&turn).expect("convert");
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.role == WireRole::Tool && m.tool_calls.is_empty()));
        assert_eq!(messages[0].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(messages[0].content, Some(WireContent::Text(r#"{"ok":true}"#.to_string())));
        let fabricated = messages[1].tool_call_id.as_deref().expect("fabricated id");
        assert!(fabricated.starts_with("call_"));
        assert!(fabricated.len() > "call_".len());
    }

    #[test]
    fn function_calls_take_priority_and_keep_text() {
        let turn = Turn::new(
            Role::Model,
            vec![
                Part::text("Let me check."),
                Part::inline_binary("image/png", vec![1, 2, 3]),
                Part::function_call(
                    Some("call_9".to_string()),
                    "create_event",
                    args(json!({"summary": "Standup"})),
                ),
            ],
        );
        let messages = convert_turn(&turn).expect("convert");
        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert_eq!(message.role, WireRole::Assistant);
        assert_eq!(message.content, Some(WireContent::Text("Let me check.".to_string())));
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].id, "call_9");
        assert_eq!(message.tool_calls[0].kind, "function");
        assert_eq!(message.tool_calls[0].function.arguments, r#"{"summary":"Standup"}"#);
    }

    #[test]
    fn tool_call_without_text_omits_content() {
        let turn = Turn::new(Role::Model, vec![Part::function_call(None, "now", Map::new())]);
        let messages = convert_turn(&turn).expect("convert");
        assert!(messages[0].content.is_none());
        assert_eq!(messages[0].tool_calls[0].function.arguments, "{}");
        assert!(messages[0].tool_calls[0].id.starts_with("call_"));
    }

    #[test]
    fn multimodal_parts_follow_text_entries() {
        let turn = Turn::new(
            Role::User,
            vec![
                Part::text("What is this?"),
                Part::inline_binary("image/png", b"png".to_vec()),
                Part::inline_binary("audio/wav", b"wav".to_vec()),
                Part::inline_binary("video/mp4", b"mp4".to_vec()),
                Part::inline_binary("application/pdf", b"pdf".to_vec()),
                Part::inline_binary("text/plain", b"notes".to_vec()),
                Part::inline_binary("application/zip", b"zip".to_vec()),
                Part::file_ref("file-123"),
            ],
        );
        let messages = convert_turn(&turn).expect("convert");
        let value = serde_json::to_value(&messages[0]).expect("serialize");
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "What is this?"},
                    {"type": "text", "text": "notes"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,cG5n"}},
                    {"type": "audio_url", "audio_url": {"url": "data:audio/wav;base64,d2F2"}},
                    {"type": "video_url", "video_url": {"url": "data:video/mp4;base64,bXA0"}},
                    {"type": "file", "file": {"file_data": "data:application/pdf;base64,cGRm"}},
                    {"type": "file", "file": {"file_id": "file-123"}}
                ]
            })
        );
    }

    #[test]
    fn text_mime_inline_data_folds_into_plain_text() {
        let turn = Turn::new(
            Role::User,
            vec![Part::text("Summarise:"), Part::inline_binary("text/markdown", b"# Agenda".to_vec())],
        );
        let messages = convert_turn(&turn).expect("convert");
        assert_eq!(messages, vec![WireMessage::text(WireRole::User, "Summarise:\n# Agenda")]);
    }

    #[test]
    fn tool_prefers_generic_json_schema() {
        let tool = ToolDeclaration {
            name: "create_event".to_string(),
            description: "Create a calendar event".to_string(),
            parameters_json_schema: Some(json!({
                "type": "object",
                "properties": {"summary": {"type": "string"}},
                "required": ["summary"]
            })),
            parameters: Some(Schema::of(SchemaType::Object)),
        };
        let value = serde_json::to_value(convert_tool(&tool)).expect("serialize");
        assert_eq!(
            value,
            json!({
                "type": "function",
                "function": {
                    "name": "create_event",
                    "description": "Create a calendar event",
                    "parameters": {
                        "type": "object",
                        "properties": {"summary": {"type": "string"}},
                        "required": ["summary"]
                    }
                }
            })
        );
    }

    #[test]
    fn tool_walks_typed_schema() {
        let schema = Schema::of(SchemaType::Object)
            .with_property(
                "summary",
                Schema::of(SchemaType::String).with_description("Event title"),
            )
            .with_property(
                "attendees",
                Schema {
                    items: Some(Box::new(Schema::of(SchemaType::String))),
                    ..Schema::of(SchemaType::Array)
                },
            )
            .with_property(
                "status",
                Schema {
                    enum_values: vec!["confirmed".to_string(), "tentative".to_string()],
                    ..Schema::of(SchemaType::String)
                },
            )
            .with_required("summary");
        let tool = ToolDeclaration {
            name: "create_event".to_string(),
            description: String::new(),
            parameters_json_schema: None,
            parameters: Some(schema),
        };
        let value = serde_json::to_value(convert_tool(&tool)).expect("serialize");
        assert_eq!(
            value["function"]["parameters"],
            json!({
                "type": "object",
                "properties": {
                    "attendees": {"type": "array", "items": {"type": "string"}},
                    "status": {"type": "string", "enum": ["confirmed", "tentative"]},
                    "summary": {"type": "string", "description": "Event title"}
                },
                "required": ["summary"]
            })
        );
        assert!(value["function"].get("description").is_none());
    }

    #[test]
    fn unusable_schema_defaults_to_empty_object() {
        let tool = ToolDeclaration {
            name: "now".to_string(),
            description: "Current time".to_string(),
            parameters_json_schema: Some(json!("not a schema")),
            parameters: None,
        };
        assert!(convert_tool(&tool).function.parameters.is_empty());

        let bare = ToolDeclaration { name: "now".to_string(), ..ToolDeclaration::default() };
        assert!(convert_tool(&bare).function.parameters.is_empty());
    }
}
