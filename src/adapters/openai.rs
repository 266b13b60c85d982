//! OpenAI-style adapter.
//!
//! Messages map almost one to one onto the unified model. The interesting
//! parts are the polymorphic `tool_choice`, multi-part content, and keeping
//! outbound tool-call arguments valid JSON text.

use super::openai_types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatContent, ChatErrorResponse, ChatFunction,
    ChatMessage, ChatNamedToolChoice, ChatTool, ChatToolCall, ChatToolCallFunction, ChatToolChoice,
    ChatToolChoiceFunction, ChatUsage, Choice, ChoiceMessage, EmbeddingData, EmbeddingInput,
    EmbeddingRequest, EmbeddingResponse, EmbeddingUsage, StopSequences,
};
use super::{
    from_backend_json, from_client_json, to_json_bytes, Adapter, BackendRequest, BackendResponse,
    Operation, ProtocolType,
};
use crate::error::{BrokerError, Result};
use crate::unified::{
    Role, ToolChoice, UnifiedChatRequest, UnifiedChatResponse, UnifiedEmbeddingRequest,
    UnifiedEmbeddingResponse, UnifiedFunction, UnifiedFunctionCall, UnifiedMessage, UnifiedTool,
    UnifiedToolCall, UnifiedUsage,
};

use bytes::Bytes;
use serde_json::{Map, Value};

/// Request fields an OpenAI-style backend accepts from the parameters bag.
const PASSTHROUGH_PARAMS: &[&str] = &[
    "frequency_penalty",
    "presence_penalty",
    "seed",
    "user",
    "n",
    "logit_bias",
    "logprobs",
    "top_logprobs",
    "response_format",
    "parallel_tool_calls",
    "service_tier",
    "reasoning_effort",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl Adapter for OpenAiAdapter {
    fn protocol(&self) -> ProtocolType {
        ProtocolType::OpenAi
    }

    fn supports(&self, operation: Operation) -> bool {
        matches!(operation, Operation::Chat | Operation::Embeddings)
    }

    fn decode_client_chat(&self, body: &[u8]) -> Result<UnifiedChatRequest> {
        let req: ChatCompletionRequest = from_client_json(body)?;

        let messages = req
            .messages
            .into_iter()
            .map(message_to_unified)
            .collect::<Result<Vec<_>>>()?;

        let tools = req
            .tools
            .unwrap_or_default()
            .into_iter()
            .map(|t| UnifiedTool {
                function: UnifiedFunction {
                    name: t.function.name,
                    description: t.function.description,
                    parameters: t.function.parameters.unwrap_or_else(empty_schema),
                },
            })
            .collect();

        let tool_choice = req.tool_choice.map(tool_choice_to_unified).transpose()?;

        Ok(UnifiedChatRequest {
            model: req.model,
            messages,
            stream: req.stream.unwrap_or(false),
            tools,
            tool_choice,
            max_tokens: req.max_completion_tokens.or(req.max_tokens),
            temperature: req.temperature,
            top_p: req.top_p,
            stop: req.stop.map(StopSequences::into_vec).unwrap_or_default(),
            parameters: req.extra,
        })
    }

    fn encode_backend_chat(&self, req: &UnifiedChatRequest, url: &str) -> Result<BackendRequest> {
        let messages = req.messages.iter().map(message_to_wire).collect();

        let tools = if req.tools.is_empty() {
            None
        } else {
            Some(
                req.tools
                    .iter()
                    .map(|t| ChatTool {
                        tool_type: "function".to_string(),
                        function: ChatFunction {
                            name: t.function.name.clone(),
                            description: t.function.description.clone(),
                            parameters: Some(t.function.parameters.clone()),
                        },
                    })
                    .collect(),
            )
        };

        let stop = if req.stop.is_empty() {
            None
        } else {
            Some(StopSequences::Many(req.stop.clone()))
        };

        let wire = ChatCompletionRequest {
            model: req.model.clone(),
            messages,
            stream: Some(req.stream),
            max_tokens: req.max_tokens,
            max_completion_tokens: None,
            temperature: req.temperature,
            top_p: req.top_p,
            stop,
            tools,
            tool_choice: req.tool_choice.as_ref().map(tool_choice_to_wire),
            extra: select_params(&req.parameters, PASSTHROUGH_PARAMS),
        };

        Ok(BackendRequest::json(url, to_json_bytes(&wire)?))
    }

    fn decode_backend_chat(&self, resp: &BackendResponse) -> Result<UnifiedChatResponse> {
        let wire: ChatCompletionResponse = from_backend_json(&resp.body)?;

        let usage = wire.usage.map_or_else(UnifiedUsage::default, |u| UnifiedUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        let mut unified = UnifiedChatResponse {
            id: wire.id,
            model: wire.model,
            usage,
            ..UnifiedChatResponse::default()
        };

        // Only the first choice is modeled.
        if let Some(choice) = wire.choices.into_iter().next() {
            unified.role = choice.message.role;
            unified.content = choice.message.content.unwrap_or_default();
            unified.stop_reason = choice.finish_reason;
            unified.tool_calls = choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(tool_call_to_unified)
                .collect();
        }

        Ok(unified)
    }

    fn encode_client_chat(&self, resp: &UnifiedChatResponse) -> Result<Bytes> {
        let role = if resp.role.is_empty() {
            "assistant".to_string()
        } else {
            resp.role.clone()
        };

        let wire = ChatCompletionResponse {
            id: resp.id.clone(),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: resp.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage {
                    role,
                    content: content_or_null(&resp.content, !resp.tool_calls.is_empty()),
                    tool_calls: tool_calls_to_wire(&resp.tool_calls),
                },
                finish_reason: resp.stop_reason.clone(),
            }],
            usage: Some(ChatUsage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            }),
        };

        to_json_bytes(&wire)
    }

    fn decode_client_embeddings(&self, body: &[u8]) -> Result<UnifiedEmbeddingRequest> {
        let req: EmbeddingRequest = from_client_json(body)?;
        Ok(UnifiedEmbeddingRequest {
            model: req.model,
            input: req.input.into_vec(),
        })
    }

    fn encode_backend_embeddings(
        &self,
        req: &UnifiedEmbeddingRequest,
        url: &str,
    ) -> Result<BackendRequest> {
        let wire = EmbeddingRequest {
            model: req.model.clone(),
            input: EmbeddingInput::Batch(req.input.clone()),
        };
        Ok(BackendRequest::json(url, to_json_bytes(&wire)?))
    }

    fn decode_backend_embeddings(&self, resp: &BackendResponse) -> Result<UnifiedEmbeddingResponse> {
        let mut wire: EmbeddingResponse = from_backend_json(&resp.body)?;
        // Backends may return items out of order; `index` is authoritative.
        wire.data.sort_by_key(|d| d.index);

        let usage = wire.usage.map_or_else(UnifiedUsage::default, |u| UnifiedUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: 0,
        });

        Ok(UnifiedEmbeddingResponse {
            model: wire.model,
            embeddings: wire.data.into_iter().map(|d| d.embedding).collect(),
            usage,
        })
    }

    fn encode_client_embeddings(&self, resp: &UnifiedEmbeddingResponse) -> Result<Bytes> {
        let data = resp
            .embeddings
            .iter()
            .enumerate()
            .map(|(index, embedding)| EmbeddingData {
                object: "embedding".to_string(),
                index,
                embedding: embedding.clone(),
            })
            .collect();

        let wire = EmbeddingResponse {
            object: "list".to_string(),
            data,
            model: resp.model.clone(),
            usage: Some(EmbeddingUsage {
                prompt_tokens: resp.usage.input_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            }),
        };

        to_json_bytes(&wire)
    }

    fn translate_error(&self, resp: &BackendResponse) -> Bytes {
        // The `error` object is re-emitted as sent, unknown fields included.
        // Anthropic's `{"type":"error","error":{...}}` carries the same inner
        // fields, so one shape covers both backends.
        let error = serde_json::from_slice::<Value>(&resp.body)
            .ok()
            .and_then(|mut body| body.get_mut("error").map(Value::take))
            .filter(|error| error.get("message").is_some_and(Value::is_string));

        match error {
            Some(error) => to_json_bytes(&serde_json::json!({ "error": error }))
                .unwrap_or_else(|_| generic_error()),
            None => generic_error(),
        }
    }

    fn error_body(&self, error_type: &str, message: &str) -> Bytes {
        to_json_bytes(&ChatErrorResponse::new(error_type, message))
            .unwrap_or_else(|_| generic_error())
    }
}

fn generic_error() -> Bytes {
    to_json_bytes(&ChatErrorResponse::broker_error()).unwrap_or_default()
}

fn message_to_unified(msg: ChatMessage) -> Result<UnifiedMessage> {
    let role = Role::parse(&msg.role)
        .ok_or_else(|| BrokerError::decode(format!("unknown message role '{}'", msg.role)))?;

    Ok(UnifiedMessage {
        role,
        content: msg
            .content
            .as_ref()
            .map(ChatContent::flatten_text)
            .unwrap_or_default(),
        tool_calls: msg
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(tool_call_to_unified)
            .collect(),
        tool_call_id: msg.tool_call_id,
        name: msg.name,
    })
}

fn message_to_wire(msg: &UnifiedMessage) -> ChatMessage {
    ChatMessage {
        role: msg.role.as_str().to_string(),
        content: content_or_null(&msg.content, !msg.tool_calls.is_empty()).map(ChatContent::Text),
        tool_calls: tool_calls_to_wire(&msg.tool_calls),
        tool_call_id: msg.tool_call_id.clone(),
        name: msg.name.clone(),
    }
}

/// Assistant turns that only call tools carry `null` content.
fn content_or_null(content: &str, has_tool_calls: bool) -> Option<String> {
    if content.is_empty() && has_tool_calls {
        None
    } else {
        Some(content.to_string())
    }
}

fn tool_call_to_unified(tc: ChatToolCall) -> UnifiedToolCall {
    UnifiedToolCall {
        id: tc.id,
        call_type: tc.call_type,
        function: UnifiedFunctionCall {
            name: tc.function.name,
            arguments: tc.function.arguments,
        },
    }
}

fn tool_calls_to_wire(calls: &[UnifiedToolCall]) -> Option<Vec<ChatToolCall>> {
    if calls.is_empty() {
        return None;
    }
    Some(
        calls
            .iter()
            .map(|tc| ChatToolCall {
                id: tc.id.clone(),
                call_type: tc.call_type.clone(),
                function: ChatToolCallFunction {
                    name: tc.function.name.clone(),
                    arguments: normalize_arguments(&tc.function.arguments),
                },
            })
            .collect(),
    )
}

/// Outbound arguments must be JSON text. Empty becomes `{}`; anything that
/// does not parse is sent as a JSON string literal.
pub fn normalize_arguments(arguments: &str) -> String {
    if arguments.trim().is_empty() {
        return "{}".to_string();
    }
    if serde_json::from_str::<serde::de::IgnoredAny>(arguments).is_ok() {
        return arguments.to_string();
    }
    serde_json::to_string(arguments).unwrap_or_else(|_| "{}".to_string())
}

fn tool_choice_to_unified(choice: ChatToolChoice) -> Result<ToolChoice> {
    match choice {
        ChatToolChoice::Mode(mode) => match mode.as_str() {
            "auto" => Ok(ToolChoice::Auto),
            "none" => Ok(ToolChoice::None),
            "required" => Ok(ToolChoice::Required),
            other => Err(BrokerError::decode(format!("unknown tool_choice '{other}'"))),
        },
        ChatToolChoice::Named(named) => Ok(ToolChoice::Tool(named.function.name)),
    }
}

fn tool_choice_to_wire(choice: &ToolChoice) -> ChatToolChoice {
    match choice {
        ToolChoice::Auto => ChatToolChoice::Mode("auto".to_string()),
        ToolChoice::None => ChatToolChoice::Mode("none".to_string()),
        ToolChoice::Required => ChatToolChoice::Mode("required".to_string()),
        ToolChoice::Tool(name) => ChatToolChoice::Named(ChatNamedToolChoice {
            choice_type: "function".to_string(),
            function: ChatToolChoiceFunction { name: name.clone() },
        }),
    }
}

pub(crate) fn empty_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

pub(crate) fn select_params(params: &Map<String, Value>, allowed: &[&str]) -> Map<String, Value> {
    params
        .iter()
        .filter(|(k, _)| allowed.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
