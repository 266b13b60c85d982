//! Anthropic-style adapter.
//!
//! Content is either a string or an ordered list of typed blocks, so most of
//! the work here is flattening blocks into unified messages and rebuilding
//! them on the way out. A single wire message can expand into several unified
//! messages: each `tool_result` becomes its own tool message.
//!
//! This protocol has no embeddings endpoint; the embedding operations keep
//! the trait's `UnsupportedOperation` defaults.

use super::anthropic_types::{
    AnyErrorResponse, ContentBlock, ErrorResponse, Message, MessageContent, MessagesRequest,
    MessagesResponse, Metadata, ResponseContentBlock, Role as WireRole, SystemContent, Tool,
    ToolChoice as WireToolChoice, ToolResultContent, Usage,
};
use super::openai::{normalize_arguments, select_params};
use super::{
    from_backend_json, from_client_json, to_json_bytes, Adapter, BackendRequest, BackendResponse,
    Operation, ProtocolType,
};
use crate::error::Result;
use crate::unified::{
    Role, ToolChoice, UnifiedChatRequest, UnifiedChatResponse, UnifiedFunction, UnifiedMessage,
    UnifiedTool, UnifiedToolCall, UnifiedUsage,
};

use axum::http::HeaderValue;
use bytes::Bytes;
use serde_json::Value;

/// Used when the unified request carries no `max_tokens`; the API requires one.
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Request fields an Anthropic-style backend accepts from the parameters bag.
const PASSTHROUGH_PARAMS: &[&str] = &["top_k", "thinking", "service_tier"];

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl Adapter for AnthropicAdapter {
    fn protocol(&self) -> ProtocolType {
        ProtocolType::Anthropic
    }

    fn supports(&self, operation: Operation) -> bool {
        matches!(operation, Operation::Chat)
    }

    fn decode_client_chat(&self, body: &[u8]) -> Result<UnifiedChatRequest> {
        let req: MessagesRequest = from_client_json(body)?;

        let mut messages = Vec::new();
        if let Some(ref system) = req.system {
            let text = system.as_text();
            if !text.is_empty() {
                messages.push(UnifiedMessage::text(Role::System, text));
            }
        }
        for msg in req.messages {
            messages.extend(message_to_unified(msg));
        }

        let tools = req
            .tools
            .unwrap_or_default()
            .into_iter()
            .map(|t| UnifiedTool {
                function: UnifiedFunction {
                    name: t.name,
                    description: t.description,
                    parameters: t.input_schema,
                },
            })
            .collect();

        let mut parameters = req.extra;
        if let Some(user_id) = req.metadata.and_then(|m| m.user_id) {
            parameters.insert("user".to_string(), Value::String(user_id));
        }

        Ok(UnifiedChatRequest {
            model: req.model,
            messages,
            stream: req.stream.unwrap_or(false),
            tools,
            tool_choice: req.tool_choice.map(tool_choice_to_unified),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            stop: req.stop_sequences.unwrap_or_default(),
            parameters,
        })
    }

    fn encode_backend_chat(&self, req: &UnifiedChatRequest, url: &str) -> Result<BackendRequest> {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut messages: Vec<Message> = Vec::new();

        for msg in &req.messages {
            if msg.role == Role::System {
                system_parts.push(&msg.content);
            } else if msg.tool_call_id.is_some() {
                push_tool_result(&mut messages, msg);
            } else {
                messages.push(message_to_wire(msg));
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(SystemContent::Text(system_parts.join("\n")))
        };

        let tools = if req.tools.is_empty() {
            None
        } else {
            Some(
                req.tools
                    .iter()
                    .map(|t| Tool {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        input_schema: t.function.parameters.clone(),
                    })
                    .collect(),
            )
        };

        let metadata = req
            .parameters
            .get("user")
            .and_then(Value::as_str)
            .map(|user| Metadata {
                user_id: Some(user.to_string()),
                extra: serde_json::Map::new(),
            });

        let wire = MessagesRequest {
            model: req.model.clone(),
            max_tokens: Some(req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
            messages,
            system,
            stream: req.stream.then_some(true),
            temperature: req.temperature,
            top_p: req.top_p,
            stop_sequences: (!req.stop.is_empty()).then(|| req.stop.clone()),
            tools,
            tool_choice: req.tool_choice.as_ref().map(tool_choice_to_wire),
            metadata,
            extra: select_params(&req.parameters, PASSTHROUGH_PARAMS),
        };

        let mut out = BackendRequest::json(url, to_json_bytes(&wire)?);
        out.headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(out)
    }

    fn decode_backend_chat(&self, resp: &BackendResponse) -> Result<UnifiedChatResponse> {
        let wire: MessagesResponse = from_backend_json(&resp.body)?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in wire.content {
            match block {
                ResponseContentBlock::Text { text } => content.push_str(&text),
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(UnifiedToolCall::function(id, name, input.to_string()));
                }
                ResponseContentBlock::Other => {}
            }
        }

        Ok(UnifiedChatResponse {
            id: wire.id,
            model: wire.model,
            role: wire.role,
            content,
            tool_calls,
            stop_reason: wire.stop_reason,
            usage: UnifiedUsage {
                input_tokens: wire.usage.input_tokens,
                output_tokens: wire.usage.output_tokens,
            },
        })
    }

    fn encode_client_chat(&self, resp: &UnifiedChatResponse) -> Result<Bytes> {
        let mut content = Vec::new();
        if !resp.content.is_empty() {
            content.push(ResponseContentBlock::Text {
                text: resp.content.clone(),
            });
        }
        for tc in &resp.tool_calls {
            content.push(ResponseContentBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.function.name.clone(),
                input: arguments_to_input(&tc.function.arguments),
            });
        }
        // Clients expect at least one block.
        if content.is_empty() {
            content.push(ResponseContentBlock::Text {
                text: String::new(),
            });
        }

        let role = if resp.role.is_empty() {
            "assistant".to_string()
        } else {
            resp.role.clone()
        };

        let wire = MessagesResponse {
            id: resp.id.clone(),
            response_type: "message".to_string(),
            role,
            content,
            model: resp.model.clone(),
            stop_reason: resp.stop_reason.clone(),
            stop_sequence: None,
            usage: Usage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
                cache_creation_input_tokens: None,
                cache_read_input_tokens: None,
            },
        };

        to_json_bytes(&wire)
    }

    fn translate_error(&self, resp: &BackendResponse) -> Bytes {
        match serde_json::from_slice::<AnyErrorResponse>(&resp.body) {
            Ok(err) => {
                let error_type = err.error.error_type.as_deref().unwrap_or("api_error");
                self.error_body(error_type, &err.error.message)
            }
            Err(_) => generic_error(),
        }
    }

    fn error_body(&self, error_type: &str, message: &str) -> Bytes {
        to_json_bytes(&ErrorResponse::new(error_type, message)).unwrap_or_else(|_| generic_error())
    }
}

fn generic_error() -> Bytes {
    to_json_bytes(&ErrorResponse::broker_error()).unwrap_or_default()
}

fn message_to_unified(msg: Message) -> Vec<UnifiedMessage> {
    let role = match msg.role {
        WireRole::User => Role::User,
        WireRole::Assistant => Role::Assistant,
    };

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let mut out = Vec::new();

    for block in msg.content.into_blocks() {
        match block {
            ContentBlock::Text { text: t } => text.push_str(&t),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(UnifiedToolCall::function(id, name, input.to_string()));
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                out.push(UnifiedMessage::tool_result(
                    tool_use_id,
                    tool_result_to_text(content, is_error),
                ));
            }
            ContentBlock::Other => {}
        }
    }

    if !text.is_empty() || !tool_calls.is_empty() || out.is_empty() {
        out.push(UnifiedMessage {
            role,
            content: text,
            tool_calls,
            tool_call_id: None,
            name: None,
        });
    }

    out
}

/// String payloads are carried as-is; block arrays as their JSON text.
fn tool_result_to_text(content: Option<ToolResultContent>, is_error: Option<bool>) -> String {
    let prefix = if is_error == Some(true) { "ERROR: " } else { "" };

    let body = match content {
        Some(ToolResultContent::Text(t)) => t,
        Some(ToolResultContent::Blocks(blocks)) => {
            serde_json::to_string(&blocks).unwrap_or_default()
        }
        None => String::new(),
    };

    format!("{prefix}{body}")
}

fn message_to_wire(msg: &UnifiedMessage) -> Message {
    let role = match msg.role {
        Role::Assistant => WireRole::Assistant,
        _ => WireRole::User,
    };

    if msg.tool_calls.is_empty() {
        return Message {
            role,
            content: MessageContent::Text(msg.content.clone()),
        };
    }

    let mut blocks = Vec::with_capacity(msg.tool_calls.len() + 1);
    if !msg.content.is_empty() {
        blocks.push(ContentBlock::Text {
            text: msg.content.clone(),
        });
    }
    for tc in &msg.tool_calls {
        blocks.push(ContentBlock::ToolUse {
            id: tc.id.clone(),
            name: tc.function.name.clone(),
            input: arguments_to_input(&tc.function.arguments),
        });
    }

    Message {
        role,
        content: MessageContent::Blocks(blocks),
    }
}

/// Tool results travel in a `user` message. Consecutive results share one
/// message, as the API expects all results for a turn together.
fn push_tool_result(messages: &mut Vec<Message>, msg: &UnifiedMessage) {
    let block = ContentBlock::ToolResult {
        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
        content: text_to_tool_result(&msg.content),
        is_error: None,
    };

    if let Some(Message {
        role: WireRole::User,
        content: MessageContent::Blocks(blocks),
    }) = messages.last_mut()
    {
        if matches!(blocks.last(), Some(ContentBlock::ToolResult { .. })) {
            blocks.push(block);
            return;
        }
    }

    messages.push(Message {
        role: WireRole::User,
        content: MessageContent::Blocks(vec![block]),
    });
}

/// Only an array of typed blocks is sent as blocks; any other text, JSON or
/// not, stays a string.
fn text_to_tool_result(content: &str) -> Option<ToolResultContent> {
    if content.is_empty() {
        return None;
    }
    match serde_json::from_str::<Vec<Value>>(content) {
        Ok(blocks) if !blocks.is_empty() && blocks.iter().all(is_content_block) => {
            Some(ToolResultContent::Blocks(blocks))
        }
        _ => Some(ToolResultContent::Text(content.to_string())),
    }
}

fn is_content_block(value: &Value) -> bool {
    value.get("type").is_some_and(Value::is_string)
}

fn arguments_to_input(arguments: &str) -> Value {
    let normalized = normalize_arguments(arguments);
    serde_json::from_str(&normalized).unwrap_or(Value::String(normalized))
}

fn tool_choice_to_unified(choice: WireToolChoice) -> ToolChoice {
    match choice {
        WireToolChoice::Auto => ToolChoice::Auto,
        WireToolChoice::Any => ToolChoice::Required,
        WireToolChoice::None => ToolChoice::None,
        WireToolChoice::Tool { name } => ToolChoice::Tool(name),
    }
}

fn tool_choice_to_wire(choice: &ToolChoice) -> WireToolChoice {
    match choice {
        ToolChoice::Auto => WireToolChoice::Auto,
        ToolChoice::Required => WireToolChoice::Any,
        ToolChoice::None => WireToolChoice::None,
        ToolChoice::Tool(name) => WireToolChoice::Tool { name: name.clone() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::OpenAiAdapter;
    use crate::error::BrokerError;
    use crate::unified::UnifiedEmbeddingRequest;
    use axum::http::{HeaderMap, StatusCode};
    use serde_json::json;

    fn backend(status: StatusCode, body: Value) -> BackendResponse {
        BackendResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from(serde_json::to_vec(&body).unwrap()),
        }
    }

    fn decode(body: Value) -> UnifiedChatRequest {
        AnthropicAdapter
            .decode_client_chat(&serde_json::to_vec(&body).unwrap())
            .unwrap()
    }

    fn body_json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_tool_call_round_trip() {
        let mut call = UnifiedMessage::text(Role::Assistant, "");
        call.tool_calls
            .push(UnifiedToolCall::function("toolu_1", "N", r#"{"a":1}"#));
        let req = UnifiedChatRequest {
            model: "claude-3-haiku".to_string(),
            messages: vec![UnifiedMessage::text(Role::User, "go"), call],
            ..UnifiedChatRequest::default()
        };

        let encoded = AnthropicAdapter
            .encode_backend_chat(&req, "http://backend/v1/chat/completions")
            .unwrap();
        let decoded = AnthropicAdapter.decode_client_chat(&encoded.body).unwrap();

        let tc = &decoded.messages[1].tool_calls[0];
        assert_eq!(tc.function.name, "N");
        let args: Value = serde_json::from_str(&tc.function.arguments).unwrap();
        assert_eq!(args, json!({"a": 1}));
    }

    #[test]
    fn test_text_response_to_openai_client() {
        let resp = backend(
            StatusCode::OK,
            json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "model": "claude-3-haiku",
                "content": [{"type": "text", "text": "Hi"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 5, "output_tokens": 1}
            }),
        );

        let unified = AnthropicAdapter.decode_backend_chat(&resp).unwrap();
        assert_eq!(unified.content, "Hi");

        let body = body_json(&OpenAiAdapter.encode_client_chat(&unified).unwrap());
        assert_eq!(body["choices"][0]["message"]["content"], "Hi");
    }

    #[test]
    fn test_decode_backend_concatenates_text_and_lifts_tool_use() {
        let resp = backend(
            StatusCode::OK,
            json!({
                "id": "msg_2",
                "role": "assistant",
                "model": "claude",
                "content": [
                    {"type": "thinking", "thinking": "...", "signature": "s"},
                    {"type": "text", "text": "Let me "},
                    {"type": "text", "text": "check."},
                    {"type": "tool_use", "id": "toolu_9", "name": "weather", "input": {"city": "Oslo"}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 1, "output_tokens": 1}
            }),
        );

        let unified = AnthropicAdapter.decode_backend_chat(&resp).unwrap();
        assert_eq!(unified.content, "Let me check.");
        assert_eq!(unified.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(unified.tool_calls.len(), 1);
        assert_eq!(unified.tool_calls[0].function.arguments, r#"{"city":"Oslo"}"#);
    }

    #[test]
    fn test_decode_system_and_blocks() {
        let req = decode(json!({
            "model": "claude",
            "max_tokens": 100,
            "system": "You are terse",
            "messages": [
                {"role": "user", "content": [
                    {"type": "text", "text": "Hello "},
                    {"type": "text", "text": "there"}
                ]}
            ]
        }));

        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[0].content, "You are terse");
        assert_eq!(req.messages[1].content, "Hello there");
        assert_eq!(req.max_tokens, Some(100));
    }

    #[test]
    fn test_tool_results_split_into_tool_messages() {
        let req = decode(json!({
            "model": "claude",
            "max_tokens": 100,
            "messages": [
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "72F"},
                    {"type": "tool_result", "tool_use_id": "toolu_2", "content": [{"type": "text", "text": "rain"}]},
                    {"type": "text", "text": "Summarize"}
                ]}
            ]
        }));

        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[0].role, Role::Tool);
        assert_eq!(req.messages[0].tool_call_id.as_deref(), Some("toolu_1"));
        assert_eq!(req.messages[0].content, "72F");
        assert_eq!(req.messages[1].content, r#"[{"type":"text","text":"rain"}]"#);
        assert_eq!(req.messages[2].role, Role::User);
        assert_eq!(req.messages[2].content, "Summarize");
    }

    #[test]
    fn test_encode_backend_shapes() {
        let mut call = UnifiedMessage::text(Role::Assistant, "Checking");
        call.tool_calls
            .push(UnifiedToolCall::function("call_1", "weather", r#"{"city":"Oslo"}"#));
        let req = UnifiedChatRequest {
            model: "claude-3-haiku".to_string(),
            messages: vec![
                UnifiedMessage::text(Role::System, "Be brief"),
                UnifiedMessage::text(Role::User, "Weather?"),
                call,
                UnifiedMessage::tool_result("call_1", "sunny"),
                UnifiedMessage::tool_result("call_2", r#"[{"type":"text","text":"dry"}]"#),
            ],
            tools: vec![UnifiedTool {
                function: UnifiedFunction {
                    name: "weather".to_string(),
                    description: Some("Current weather".to_string()),
                    parameters: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
                },
            }],
            tool_choice: Some(ToolChoice::Required),
            ..UnifiedChatRequest::default()
        };

        let out = AnthropicAdapter.encode_backend_chat(&req, "u").unwrap();
        assert_eq!(out.headers["anthropic-version"], ANTHROPIC_VERSION);

        let body = body_json(&out.body);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["system"], "Be brief");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["tool_choice"], json!({"type": "any"}));

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["type"], "text");
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[1]["content"][1]["input"]["city"], "Oslo");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "call_1");
        assert_eq!(messages[2]["content"][0]["content"], "sunny");
        assert_eq!(messages[2]["content"][1]["content"][0]["text"], "dry");
    }

    #[test]
    fn test_plain_json_array_tool_result_stays_text() {
        let body = json!({
            "model": "gpt-4",
            "messages": [
                {"role": "user", "content": "count"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "count", "arguments": "{}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "[1, 2, 3]"},
                {"role": "tool", "tool_call_id": "call_2", "content": "[{\"kind\":\"x\"}]"}
            ]
        });
        let req = OpenAiAdapter
            .decode_client_chat(&serde_json::to_vec(&body).unwrap())
            .unwrap();

        let out = AnthropicAdapter.encode_backend_chat(&req, "u").unwrap();
        let sent = body_json(&out.body);
        let results = &sent["messages"][2]["content"];
        assert_eq!(results[0]["type"], "tool_result");
        assert_eq!(results[0]["content"], "[1, 2, 3]");
        assert_eq!(results[1]["content"], r#"[{"kind":"x"}]"#);
    }

    #[test]
    fn test_encode_client_chat_never_empty() {
        let body = body_json(
            &AnthropicAdapter
                .encode_client_chat(&UnifiedChatResponse::default())
                .unwrap(),
        );
        assert_eq!(body["type"], "message");
        assert_eq!(body["role"], "assistant");
        assert_eq!(body["content"], json!([{"type": "text", "text": ""}]));
    }

    #[test]
    fn test_embeddings_unsupported() {
        let adapter = AnthropicAdapter;
        assert!(!adapter.supports(Operation::Embeddings));

        let is_unsupported = |err: BrokerError| {
            matches!(
                err,
                BrokerError::UnsupportedOperation {
                    protocol: ProtocolType::Anthropic,
                    operation: Operation::Embeddings,
                }
            )
        };

        assert!(is_unsupported(
            adapter.decode_client_embeddings(b"{}").unwrap_err()
        ));
        assert!(is_unsupported(
            adapter
                .encode_backend_embeddings(&UnifiedEmbeddingRequest::default(), "u")
                .unwrap_err()
        ));
        assert!(is_unsupported(
            adapter
                .decode_backend_embeddings(&backend(StatusCode::OK, json!({})))
                .unwrap_err()
        ));
        assert!(is_unsupported(
            adapter
                .encode_client_embeddings(&Default::default())
                .unwrap_err()
        ));
    }

    #[test]
    fn test_translate_openai_error_to_anthropic_shape() {
        let resp = backend(
            StatusCode::TOO_MANY_REQUESTS,
            json!({"error": {"message": "slow down", "type": "rate_limit_error"}}),
        );
        let body = body_json(&AnthropicAdapter.translate_error(&resp));
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "rate_limit_error");
        assert_eq!(body["error"]["message"], "slow down");
    }

    #[test]
    fn test_translate_unparseable_error() {
        let resp = BackendResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"oops"),
        };
        let body = body_json(&AnthropicAdapter.translate_error(&resp));
        assert_eq!(body["error"]["type"], "broker_error");
    }
}
