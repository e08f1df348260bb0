use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A structured tool or handoff invocation issued by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One transcript entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User { content: content.into() }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::Assistant { content: Some(content.into()), tool_calls: Vec::new() }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool { tool_call_id: tool_call_id.into(), content: content.into() }
    }
}

/// Callable schema advertised to the model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Copy, Debug)]
pub struct CompletionRequest<'a> {
    pub agent: &'a str,
    pub instructions: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolSpec],
}

/// Either final text (`tool_calls` empty) or a batch of tool/handoff calls.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), tool_calls: Vec::new() }
    }

    pub fn call(call: ToolCall) -> Self {
        Self { content: None, tool_calls: vec![call] }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no API key configured for the completion endpoint")]
    MissingApiKey,
    #[error("completion request failed: {0}")]
    Network(String),
    #[error("completion endpoint returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("could not decode completion response: {0}")]
    Decode(String),
}

/// The completion endpoint. Implementations decide intent, handoffs and tool
/// arguments; nothing else in the crate depends on which one is plugged in.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<ModelResponse, ModelError>;
}
