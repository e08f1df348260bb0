//! Client for any endpoint that speaks the OpenAI chat-completions protocol.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::llm::{
    CompletionModel, CompletionRequest, Message, ModelError, ModelResponse, ToolCall, ToolSpec,
};

pub struct OpenAiCompatibleModel {
    api_key: Option<SecretString>,
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleModel {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ModelError::Network(error.to_string()))?;

        Ok(Self {
            api_key,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self, request: &CompletionRequest<'_>) -> ApiRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ApiMessage {
            role: "system",
            content: Some(request.instructions.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
        messages.extend(request.messages.iter().map(convert_message));

        ApiRequest {
            model: self.model.clone(),
            messages,
            tools: request.tools.iter().map(convert_tool).collect(),
        }
    }
}

#[async_trait]
impl CompletionModel for OpenAiCompatibleModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_key = self
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ModelError::MissingApiKey)?;

        let body = self.build_request(&request);
        debug!(
            event_name = "agent.model.request",
            agent = request.agent,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| ModelError::Network(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status: status.as_u16(), message });
        }

        let payload: ApiResponse =
            response.json().await.map_err(|error| ModelError::Decode(error.to_string()))?;
        parse_response(payload)
    }
}

fn convert_message(message: &Message) -> ApiMessage {
    match message {
        Message::User { content } => ApiMessage {
            role: "user",
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::Assistant { content, tool_calls } => ApiMessage {
            role: "assistant",
            content: content.clone(),
            tool_calls: (!tool_calls.is_empty())
                .then(|| tool_calls.iter().map(convert_tool_call).collect()),
            tool_call_id: None,
        },
        Message::Tool { tool_call_id, content } => ApiMessage {
            role: "tool",
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

fn convert_tool_call(call: &ToolCall) -> ApiToolCall {
    let arguments = match &call.arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    };
    ApiToolCall {
        id: call.id.clone(),
        call_type: "function".to_string(),
        function: ApiFunctionCall { name: call.name.clone(), arguments },
    }
}

fn convert_tool(spec: &ToolSpec) -> ApiTool {
    ApiTool {
        tool_type: "function",
        function: ApiFunctionDef {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters.clone(),
        },
    }
}

fn parse_response(payload: ApiResponse) -> Result<ModelResponse, ModelError> {
    let choice = payload
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Decode("response contained no choices".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(index, call)| ToolCall {
            id: if call.id.is_empty() { format!("call_{index}") } else { call.id },
            name: call.function.name,
            arguments: parse_arguments(&call.function.arguments),
        })
        .collect();

    Ok(ModelResponse { content: choice.message.content, tool_calls })
}

/// Unparseable argument text is passed through as a string so the tool reports
/// it back to the model instead of aborting the run.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    call_type: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunctionDef,
}

#[derive(Debug, Serialize)]
struct ApiFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::OpenAiCompatibleModel;
    use crate::llm::{CompletionModel, CompletionRequest, Message, ModelError, ToolCall, ToolSpec};

    fn model(base_url: &str, api_key: Option<&str>) -> OpenAiCompatibleModel {
        OpenAiCompatibleModel::new(
            base_url,
            "gemini-2.0-flash",
            api_key.map(|key| key.to_string().into()),
            Duration::from_secs(5),
        )
        .expect("client builds")
    }

    fn read_tool() -> ToolSpec {
        ToolSpec {
            name: "read_todos".to_string(),
            description: "List todos".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    #[test]
    fn endpoint_appends_chat_completions_path() {
        let model = model("https://example.test/v1beta/openai/", Some("k"));
        assert_eq!(model.endpoint(), "https://example.test/v1beta/openai/chat/completions");
    }

    #[test]
    fn request_leads_with_system_instructions_and_stringifies_arguments() {
        let model = model("https://example.test", Some("k"));
        let messages = vec![
            Message::user("list my todos"),
            Message::Assistant {
                content: None,
                tool_calls: vec![ToolCall {
                    id: "call_1".to_string(),
                    name: "read_todos".to_string(),
                    arguments: json!({}),
                }],
            },
            Message::tool_result("call_1", "{\"todos\":[]}"),
        ];
        let tools = vec![read_tool()];
        let request = CompletionRequest {
            agent: "ReadAgent",
            instructions: "be helpful",
            messages: &messages,
            tools: &tools,
        };

        let body = serde_json::to_value(model.build_request(&request)).expect("serialize");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be helpful");
        assert_eq!(body["messages"][2]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "read_todos");
    }

    #[tokio::test]
    async fn complete_parses_tool_calls() {
        let server = MockServer::start().await;
        let body = json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "create_todo", "arguments": "{\"title\":\"Buy milk\",\"description\":\"\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat/completions"))
            .and(matchers::header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;

        let model = model(&server.uri(), Some("test-key"));
        let messages = vec![Message::user("add buy milk")];
        let response = model
            .complete(CompletionRequest {
                agent: "CreateAgent",
                instructions: "create todos",
                messages: &messages,
                tools: &[],
            })
            .await
            .expect("completion");

        assert_eq!(response.content, None);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "call_9");
        assert_eq!(response.tool_calls[0].arguments["title"], "Buy milk");
    }

    #[tokio::test]
    async fn complete_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let model = model(&server.uri(), Some("bad-key"));
        let messages = vec![Message::user("hi")];
        let error = model
            .complete(CompletionRequest {
                agent: "TriageAgent",
                instructions: "",
                messages: &messages,
                tools: &[],
            })
            .await
            .expect_err("401 should fail");

        assert!(matches!(
            error,
            ModelError::Api { status: 401, ref message } if message.contains("invalid api key")
        ));
    }

    #[tokio::test]
    async fn complete_without_api_key_fails_before_network() {
        let model = model("http://127.0.0.1:9", None);
        let messages = vec![Message::user("hi")];
        let error = model
            .complete(CompletionRequest {
                agent: "TriageAgent",
                instructions: "",
                messages: &messages,
                tools: &[],
            })
            .await
            .expect_err("missing key");
        assert!(matches!(error, ModelError::MissingApiKey));
    }

    #[test]
    fn malformed_arguments_are_kept_as_text() {
        assert_eq!(super::parse_arguments("{oops"), json!("{oops"));
        assert_eq!(super::parse_arguments(""), json!({}));
    }
}
