//! Anthropic Messages API adapter for OAuth / session-token credentials.
//!
//! Requests are translated from the OpenAI-shaped [`Message`] list into
//! Anthropic content blocks; responses are translated back.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use modelgate_core::types::{
    ContentPart, LlmResponse, Message, MessageContent, ToolCall, ToolDefinition, UsageInfo,
};
use modelgate_core::Result;

use crate::http_provider::{build_client, execute, CHAT_TIMEOUT};
use crate::token::TokenSource;
use crate::traits::{LlmProvider, LlmRequestConfig};

/// Default Anthropic API base.
pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";

const API_VERSION: &str = "2023-06-01";
const OAUTH_BETA: &str = "oauth-2025-04-20";
const DEFAULT_MAX_TOKENS: u32 = 4096;

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

// ─────────────────────────────────────────────
// Conversion
// ─────────────────────────────────────────────

fn user_content(content: &MessageContent) -> Value {
    match content {
        MessageContent::Text(text) => Value::String(text.clone()),
        MessageContent::Parts(parts) => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                    ContentPart::ImageUrl { image_url } => image_block(&image_url.url),
                })
                .collect(),
        ),
    }
}

fn image_block(url: &str) -> Value {
    if let Some((meta, data)) = url.strip_prefix("data:").and_then(|r| r.split_once(',')) {
        let media_type = meta.trim_end_matches(";base64");
        return json!({
            "type": "image",
            "source": { "type": "base64", "media_type": media_type, "data": data }
        });
    }
    json!({ "type": "image", "source": { "type": "url", "url": url } })
}

/// Split out the system prompt and convert the rest to Anthropic messages.
///
/// Consecutive tool results are merged into one user turn.
fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system: Vec<&str> = Vec::new();
    let mut out: Vec<Value> = Vec::new();

    for msg in messages {
        match msg {
            Message::System { content } => system.push(content),
            Message::User { content } => {
                out.push(json!({ "role": "user", "content": user_content(content) }));
            }
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                let mut blocks = Vec::new();
                if let Some(text) = content.as_deref().filter(|t| !t.is_empty()) {
                    blocks.push(json!({ "type": "text", "text": text }));
                }
                for tc in tool_calls.iter().flatten() {
                    let input: Value =
                        serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| json!({}));
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.function.name,
                        "input": input,
                    }));
                }
                if blocks.is_empty() {
                    blocks.push(json!({ "type": "text", "text": "" }));
                }
                out.push(json!({ "role": "assistant", "content": blocks }));
            }
            Message::Tool {
                content,
                tool_call_id,
            } => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": content,
                });
                let merged = out.last_mut().and_then(|last| {
                    let is_tool_turn = last["role"] == "user"
                        && last["content"]
                            .as_array()
                            .is_some_and(|b| b.iter().all(|x| x["type"] == "tool_result"));
                    if is_tool_turn {
                        last["content"].as_array_mut()
                    } else {
                        None
                    }
                });
                match merged {
                    Some(blocks) => blocks.push(block),
                    None => out.push(json!({ "role": "user", "content": [block] })),
                }
            }
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, out)
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.function.name,
                "description": t.function.description,
                "input_schema": t.function.parameters,
            })
        })
        .collect()
}

fn finish_reason(stop_reason: Option<&str>) -> String {
    match stop_reason {
        None | Some("end_turn") | Some("stop_sequence") => "stop".to_string(),
        Some("tool_use") => "tool_calls".to_string(),
        Some("max_tokens") => "length".to_string(),
        Some(other) => other.to_string(),
    }
}

fn to_response(raw: MessagesResponse) -> LlmResponse {
    let mut content = String::new();
    let mut thinking = String::new();
    let mut tool_calls = Vec::new();
    for block in raw.content {
        match block {
            ContentBlock::Text { text } => content.push_str(&text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::new(id, name, input.to_string()));
            }
            ContentBlock::Thinking { thinking: t } => thinking.push_str(&t),
            ContentBlock::Other => {}
        }
    }
    LlmResponse {
        content,
        tool_calls,
        finish_reason: finish_reason(raw.stop_reason.as_deref()),
        usage: raw.usage.map(|u| UsageInfo {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        }),
        reasoning_content: (!thinking.is_empty()).then_some(thinking),
    }
}

// ─────────────────────────────────────────────
// ClaudeProvider
// ─────────────────────────────────────────────

/// Messages API adapter authenticated with a bearer token.
pub struct ClaudeProvider {
    client: reqwest::Client,
    api_base: String,
    tokens: Arc<dyn TokenSource>,
}

impl ClaudeProvider {
    /// Adapter authenticating through `tokens`, routed through `proxy` when set.
    pub fn new(tokens: Arc<dyn TokenSource>, proxy: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(CHAT_TIMEOUT, proxy)?,
            api_base: ANTHROPIC_API_BASE.to_string(),
            tokens,
        })
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        if !api_base.is_empty() {
            self.api_base = api_base.trim_end_matches('/').to_string();
        }
        self
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse> {
        let token = self.tokens.token().await?;
        let (system, converted) = convert_messages(messages);
        let tools = tools.filter(|t| !t.is_empty());

        let body = MessagesRequest {
            model: model.to_string(),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages: converted,
            tools: tools.map(convert_tools),
            tool_choice: tools.map(|_| json!({ "type": "auto" })),
            temperature: config.temperature,
        };
        debug!(provider = "anthropic", model = %model, messages = body.messages.len(), "Calling Messages API");

        let request = self
            .client
            .post(format!("{}/messages", self.api_base))
            .bearer_auth(&token.token)
            .header("anthropic-version", API_VERSION)
            .header("anthropic-beta", OAUTH_BETA)
            .json(&body);

        let text = execute(request, config, "anthropic").await?;
        let raw: MessagesResponse = serde_json::from_str(&text)?;
        Ok(to_response(raw))
    }

    fn display_name(&self) -> &str {
        "Claude"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{AccessToken, StaticToken};
    use modelgate_core::types::ImageUrl;
    use modelgate_core::Error;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base: &str) -> ClaudeProvider {
        let tokens = Arc::new(StaticToken(AccessToken {
            token: "sk-ant-oat-123".into(),
            ..Default::default()
        }));
        ClaudeProvider::new(tokens, "").unwrap().with_api_base(base)
    }

    #[test]
    fn test_convert_messages_system_and_tools() {
        let call = ToolCall::new("toolu_1", "read_file", "{\"path\":\"a.txt\"}");
        let messages = vec![
            Message::system("Be brief."),
            Message::user("read a.txt and b.txt"),
            Message::assistant_tool_calls(vec![call]),
            Message::tool_result("toolu_1", "A"),
            Message::tool_result("toolu_2", "B"),
        ];
        let (system, out) = convert_messages(&messages);

        assert_eq!(system.as_deref(), Some("Be brief."));
        assert_eq!(out.len(), 3);
        assert_eq!(out[1]["content"][0]["type"], "tool_use");
        assert_eq!(out[1]["content"][0]["input"]["path"], "a.txt");
        assert_eq!(out[2]["role"], "user");
        assert_eq!(out[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(out[2]["content"][1]["tool_use_id"], "toolu_2");
    }

    #[test]
    fn test_image_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "what is this".into() },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/png;base64,iVBOR".into(),
                    detail: None,
                },
            },
        ]);
        let value = user_content(&content);
        assert_eq!(value[1]["source"]["type"], "base64");
        assert_eq!(value[1]["source"]["media_type"], "image/png");
        assert_eq!(value[1]["source"]["data"], "iVBOR");
    }

    #[tokio::test]
    async fn test_chat_text_and_tool_use() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("authorization", "Bearer sk-ant-oat-123"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(json!({
                "model": "claude-sonnet-4",
                "max_tokens": 4096,
                "system": "Be brief.",
                "tool_choice": { "type": "auto" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    { "type": "text", "text": "Looking it up." },
                    { "type": "tool_use", "id": "toolu_9", "name": "search", "input": { "q": "rust" } }
                ],
                "stop_reason": "tool_use",
                "usage": { "input_tokens": 12, "output_tokens": 8 }
            })))
            .mount(&server)
            .await;

        let tool = ToolDefinition::new("search", "Search", json!({ "type": "object" }));
        let resp = provider(&server.uri())
            .chat(
                &[Message::system("Be brief."), Message::user("find rust")],
                Some(&[tool]),
                "claude-sonnet-4",
                &LlmRequestConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(resp.content, "Looking it up.");
        assert_eq!(resp.finish_reason, "tool_calls");
        assert_eq!(resp.tool_calls[0].id, "toolu_9");
        assert_eq!(resp.tool_calls[0].arguments["q"], "rust");
        assert_eq!(resp.usage.unwrap().total_tokens, 20);
    }

    #[tokio::test]
    async fn test_chat_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid bearer token"))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .chat(&[Message::user("hi")], None, "claude-sonnet-4", &LlmRequestConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { status: 401, .. }));
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(finish_reason(Some("end_turn")), "stop");
        assert_eq!(finish_reason(Some("max_tokens")), "length");
        assert_eq!(finish_reason(None), "stop");
    }
}
