use std::borrow::Cow;

use otter_contracts::{GenericRequest, Role, Turn};
use otter_core::CoreError;
use tracing::debug;

use crate::convert::{convert_tool, convert_turn};
use crate::wire::{
    ChatCompletionsRequest, WireMessage, WireResponseFormat, WireRole, WireStreamOptions,
};

const EMPTY_CONVERSATION_NUDGE: &str = "Handle the requests as specified in the System Instruction.";
const TRAILING_USER_NUDGE: &str = "Continue processing previous requests as instructed. Exit or provide a summary if no more outputs are needed.";
const JSON_MIME_TYPE: &str = "application/json";

/// Builds the chat-completions body for one invocation.
///
/// The caller's request is left untouched; the trailing nudge turn is only
/// added to the converted copy.
pub fn build_request(
    model: &str,
    request: &GenericRequest,
    stream: bool,
    include_stream_usage: bool,
) -> Result<ChatCompletionsRequest, CoreError> {
    let mut messages = Vec::with_capacity(request.turns.len() + 2);
    if let Some(instruction) = request.system_instruction.as_deref()
        && !instruction.trim().is_empty()
    {
        messages.push(WireMessage::text(WireRole::System, instruction));
    }

    for turn in with_nudge(&request.turns).iter() {
        messages.extend(convert_turn(turn)?);
    }

    let tools = request.tools.iter().map(convert_tool).collect::<Vec<_>>();
    let config = &request.generation_config;
    let response_format = config
        .response_mime_type
        .as_deref()
        .filter(|mime| *mime == JSON_MIME_TYPE)
        .map(|_| WireResponseFormat { kind: "json_object".to_string() });

    debug!(
        event = "provider.request.built",
        model = model,
        messages = messages.len(),
        tools = tools.len(),
        stream = stream
    );

    Ok(ChatCompletionsRequest {
        model: model.to_string(),
        messages,
        tools,
        temperature: config.temperature,
        max_tokens: config.max_output_tokens.filter(|tokens| *tokens > 0),
        top_p: config.top_p,
        stop: config.stop_sequences.clone(),
        stream,
        stream_options: (stream && include_stream_usage)
            .then_some(WireStreamOptions { include_usage: true }),
        response_format,
    })
}

fn with_nudge(turns: &[Turn]) -> Cow<'_, [Turn]> {
    let nudge = match turns.last() {
        None => EMPTY_CONVERSATION_NUDGE,
        Some(last) if last.role == Role::User => TRAILING_USER_NUDGE,
        Some(_) => return Cow::Borrowed(turns),
    };
    let mut owned = turns.to_vec();
    owned.push(Turn::user_text(nudge));
    Cow::Owned(owned)
}

#[cfg(test)]
mod tests {
    use otter_contracts::{GenerationConfig, Part, ToolDeclaration};
    use serde_json::{Value, json};

    use super::*;
    use crate::wire::WireContent;

    fn text_of(message: &WireMessage) -> Option<&str> {
        match &message.content {
            Some(WireContent::Text(text)) => Some(text),
            _ => None,
        }
    }

    #[test]
    fn empty_conversation_gets_instruction_nudge() {
        let request = GenericRequest::default().with_system_instruction("You manage a calendar.");
        let body = build_request("deepseek-chat", &request, false, true).expect("request");
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, WireRole::System);
        assert_eq!(text_of(&body.messages[0]), Some("You manage a calendar."));
        assert_eq!(body.messages[1].role, WireRole::User);
        assert_eq!(text_of(&body.messages[1]), Some(EMPTY_CONVERSATION_NUDGE));
    }

    #[test]
    fn trailing_user_turn_gets_continue_nudge() {
        let request = GenericRequest::new(vec![Turn::user_text("What is on today?")]);
        let body = build_request("deepseek-chat", &request, false, true).expect("request");
        let texts = body.messages.iter().filter_map(text_of).collect::<Vec<_>>();
        assert_eq!(texts, vec!["What is on today?", TRAILING_USER_NUDGE]);
        assert_eq!(request.turns.len(), 1);
    }

    #[test]
    fn trailing_model_turn_is_left_alone() {
        let request = GenericRequest::new(vec![
            Turn::user_text("hi"),
            Turn::model_text("hello"),
        ]);
        let body = build_request("deepseek-chat", &request, false, true).expect("request");
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[1].role, WireRole::Assistant);
    }

    #[test]
    fn blank_system_instruction_is_skipped() {
        let request = GenericRequest::new(vec![Turn::model_text("ok")]).with_system_instruction("  ");
        let body = build_request("deepseek-chat", &request, false, true).expect("request");
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, WireRole::Assistant);
    }

    #[test]
    fn generation_settings_and_json_format_are_copied() {
        let mut request = GenericRequest::new(vec![Turn::model_text("ok")]);
        request.generation_config = GenerationConfig {
            temperature: Some(0.5),
            max_output_tokens: Some(256),
            top_p: Some(0.9),
            stop_sequences: vec!["END".to_string()],
            response_mime_type: Some("application/json".to_string()),
        };
        let body = build_request("deepseek-chat", &request, false, true).expect("request");
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["temperature"], json!(0.5));
        assert_eq!(value["max_tokens"], json!(256));
        assert_eq!(value["top_p"].as_f64().map(|v| (v * 10.0).round()), Some(9.0));
        assert_eq!(value["stop"], json!(["END"]));
        assert_eq!(value["response_format"], json!({"type": "json_object"}));
        assert!(value.get("stream").is_none());
        assert!(value.get("stream_options").is_none());
    }

    #[test]
    fn non_json_mime_and_zero_max_tokens_are_omitted() {
        let mut request = GenericRequest::new(vec![Turn::model_text("ok")]);
        request.generation_config.response_mime_type = Some("text/plain".to_string());
        request.generation_config.max_output_tokens = Some(0);
        let value = serde_json::to_value(
            build_request("deepseek-chat", &request, false, true).expect("request"),
        )
        .expect("serialize");
        assert!(value.get("response_format").is_none());
        assert!(value.get("max_tokens").is_none());
    }

    #[test]
    fn streaming_sets_flag_and_usage_option() {
        let request = GenericRequest::new(vec![Turn::model_text("ok")]);
        let value = serde_json::to_value(
            build_request("deepseek-chat", &request, true, true).expect("request"),
        )
        .expect("serialize");
        assert_eq!(value["stream"], json!(true));
        assert_eq!(value["stream_options"], json!({"include_usage": true}));

        let value = serde_json::to_value(
            build_request("deepseek-chat", &request, true, false).expect("request"),
        )
        .expect("serialize");
        assert_eq!(value["stream"], json!(true));
        assert!(value.get("stream_options").is_none());
    }

    #[test]
    fn tools_are_attached_in_order() {
        let request = GenericRequest::new(vec![Turn::model_text("ok")]).with_tools(vec![
            ToolDeclaration {
                name: "list_events".to_string(),
                description: "List events".to_string(),
                parameters_json_schema: Some(json!({"type": "object", "properties": {}})),
                parameters: None,
            },
            ToolDeclaration { name: "now".to_string(), ..ToolDeclaration::default() },
        ]);
        let body = build_request("deepseek-chat", &request, false, true).expect("request");
        let names = body.tools.iter().map(|tool| tool.function.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["list_events", "now"]);
        assert_eq!(body.tools[1].function.parameters, serde_json::Map::<String, Value>::new());
    }

    #[test]
    fn function_response_turn_keeps_tool_messages_before_nudge() {
        let mut response = serde_json::Map::new();
        response.insert("events".to_string(), json!([]));
        let request = GenericRequest::new(vec![
            Turn::user_text("list"),
            Turn::new(
                Role::Model,
                vec![Part::function_call(Some("call_1".to_string()), "list_events", serde_json::Map::new())],
            ),
            Turn::new(
                Role::User,
                vec![Part::function_response(Some("call_1".to_string()), "list_events", response)],
            ),
        ]);
        let body = build_request("deepseek-chat", &request, false, true).expect("request");
        let roles = body.messages.iter().map(|m| m.role).collect::<Vec<_>>();
        assert_eq!(
            roles,
            vec![WireRole::User, WireRole::Assistant, WireRole::Tool, WireRole::User]
        );
        assert_eq!(body.messages[2].tool_call_id.as_deref(), Some("call_1"));
    }
}
