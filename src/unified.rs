//! Provider-agnostic request and response shapes.
//!
//! Every translation passes through these types: a client adapter decodes its
//! wire format into them and a backend adapter encodes them into its own. They
//! never appear on the wire themselves.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Parse a wire role. OpenAI's `developer` role is treated as `system`.
    #[must_use]
    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "system" | "developer" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedMessage {
    pub role: Role,
    pub content: String,
    pub tool_calls: Vec<UnifiedToolCall>,
    /// Set when this message is the result of an earlier tool call.
    pub tool_call_id: Option<String>,
    pub name: Option<String>,
}

impl UnifiedMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedToolCall {
    pub id: String,
    /// Always `"function"` today.
    pub call_type: String,
    pub function: UnifiedFunctionCall,
}

impl UnifiedToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: UnifiedFunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedFunctionCall {
    pub name: String,
    /// Raw JSON text, never parsed here.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedTool {
    pub function: UnifiedFunction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedFunction {
    pub name: String,
    pub description: Option<String>,
    /// JSON schema, passed through untouched.
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
    /// The model must call some tool (`"required"` / `{"type":"any"}`).
    Required,
    /// The model must call the named tool.
    Tool(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnifiedChatRequest {
    pub model: String,
    pub messages: Vec<UnifiedMessage>,
    pub stream: bool,
    pub tools: Vec<UnifiedTool>,
    pub tool_choice: Option<ToolChoice>,
    pub max_tokens: Option<u64>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop: Vec<String>,
    /// Protocol-specific fields without a common mapping.
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnifiedUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnifiedChatResponse {
    pub id: String,
    pub model: String,
    pub role: String,
    pub content: String,
    pub tool_calls: Vec<UnifiedToolCall>,
    /// Backend vocabulary, not normalized.
    pub stop_reason: Option<String>,
    pub usage: UnifiedUsage,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnifiedEmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnifiedEmbeddingResponse {
    pub model: String,
    /// One vector per input, in input order.
    pub embeddings: Vec<Vec<f32>>,
    pub usage: UnifiedUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("developer"), Some(Role::System));
        assert_eq!(Role::parse("tool"), Some(Role::Tool));
        assert_eq!(Role::parse("robot"), None);
    }

    #[test]
    fn test_role_round_trip() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }
}
