//! Google Cloud Code (`v1internal:generateContent`) adapter.
//!
//! Requests use the Gemini `contents` format wrapped in the Cloud Code
//! envelope (`project`, `model`, `request`); the stored
//! `google-antigravity` credential supplies both token and project.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use modelgate_core::types::{
    ContentPart, LlmResponse, Message, MessageContent, ToolCall, ToolDefinition,
    UsageInfo,
};
use modelgate_core::{Error, Result};

use crate::http_provider::{build_client, execute, CHAT_TIMEOUT};
use crate::token::TokenSource;
use crate::traits::{LlmProvider, LlmRequestConfig};

pub const CLOUD_CODE_API_BASE: &str = "https://cloudcode-pa.googleapis.com";

const CREDENTIAL_KEY: &str = "google-antigravity";

// ─────────────────────────────────────────────
// Request conversion
// ─────────────────────────────────────────────

fn user_parts(content: &MessageContent) -> Vec<Value> {
    match content {
        MessageContent::Text(text) => vec![json!({ "text": text })],
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(json!({ "text": text })),
                ContentPart::ImageUrl { image_url } => {
                    let (meta, data) = image_url.url.strip_prefix("data:")?.split_once(',')?;
                    Some(json!({
                        "inlineData": {
                            "mimeType": meta.trim_end_matches(";base64"),
                            "data": data
                        }
                    }))
                }
            })
            .collect(),
    }
}

/// Convert to Gemini `contents` plus an optional system instruction.
fn build_contents(messages: &[Message]) -> (Option<Value>, Vec<Value>) {
    let mut system = Vec::new();
    let mut contents: Vec<Value> = Vec::new();
    let mut call_names: HashMap<&str, &str> = HashMap::new();

    for msg in messages {
        match msg {
            Message::System { content } => system.push(json!({ "text": content })),
            Message::User { content } => {
                contents.push(json!({ "role": "user", "parts": user_parts(content) }));
            }
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                let mut parts = Vec::new();
                if let Some(text) = content.as_deref().filter(|t| !t.is_empty()) {
                    parts.push(json!({ "text": text }));
                }
                for tc in tool_calls.iter().flatten() {
                    call_names.insert(tc.id.as_str(), tc.function.name.as_str());
                    let args: Value = serde_json::from_str(&tc.function.arguments)
                        .unwrap_or_else(|_| json!({}));
                    let mut part = json!({
                        "functionCall": { "name": tc.function.name, "args": args, "id": tc.id }
                    });
                    if let Some(sig) = &tc.function.thought_signature {
                        part["thoughtSignature"] = json!(sig);
                    }
                    parts.push(part);
                }
                if !parts.is_empty() {
                    contents.push(json!({ "role": "model", "parts": parts }));
                }
            }
            Message::Tool {
                content,
                tool_call_id,
            } => {
                let name = call_names.get(tool_call_id.as_str()).copied().unwrap_or_default();
                contents.push(json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": name,
                            "id": tool_call_id,
                            "response": { "result": content }
                        }
                    }]
                }));
            }
        }
    }

    let system = (!system.is_empty()).then(|| json!({ "parts": system }));
    (system, contents)
}

fn build_request(
    project: &str,
    model: &str,
    messages: &[Message],
    tools: Option<&[ToolDefinition]>,
    config: &LlmRequestConfig,
) -> Value {
    let (system, contents) = build_contents(messages);
    let mut request = Map::new();
    request.insert("contents".into(), Value::Array(contents));
    if let Some(system) = system {
        request.insert("systemInstruction".into(), system);
    }
    if let Some(tools) = tools.filter(|t| !t.is_empty()) {
        let decls: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.function.name,
                    "description": t.function.description,
                    "parameters": t.function.parameters,
                })
            })
            .collect();
        request.insert("tools".into(), json!([{ "functionDeclarations": decls }]));
    }
    let mut generation = Map::new();
    if let Some(t) = config.temperature {
        generation.insert("temperature".into(), json!(t));
    }
    if let Some(n) = config.max_tokens {
        generation.insert("maxOutputTokens".into(), json!(n));
    }
    if !generation.is_empty() {
        request.insert("generationConfig".into(), Value::Object(generation));
    }

    json!({
        "project": project,
        "model": model,
        "request": request,
        "userAgent": "antigravity",
        "requestType": "agent",
    })
}

// ─────────────────────────────────────────────
// Response conversion
// ─────────────────────────────────────────────

fn parse_response(body: &Value) -> Result<LlmResponse> {
    let inner = body.get("response").unwrap_or(body);
    let candidates = inner
        .get("candidates")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Decode("generateContent response has no candidates".into()))?;
    let Some(candidate) = candidates.first() else {
        return Ok(LlmResponse::text(""));
    };

    let mut content = String::new();
    let mut thoughts = String::new();
    let mut tool_calls = Vec::new();
    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for part in parts {
        if let Some(call) = part.get("functionCall") {
            let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("call_{}", tool_calls.len()));
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            let mut tc = ToolCall::new(id, name, args.to_string());
            tc.function.thought_signature = part
                .get("thoughtSignature")
                .and_then(Value::as_str)
                .map(str::to_string);
            tool_calls.push(tc);
        } else if let Some(text) = part.get("text").and_then(Value::as_str) {
            if part.get("thought").and_then(Value::as_bool) == Some(true) {
                thoughts.push_str(text);
            } else {
                content.push_str(text);
            }
        }
    }

    let finish_reason = match candidate.get("finishReason").and_then(Value::as_str) {
        _ if !tool_calls.is_empty() => "tool_calls".to_string(),
        None | Some("STOP") => "stop".to_string(),
        Some("MAX_TOKENS") => "length".to_string(),
        Some(other) => other.to_lowercase(),
    };
    let usage = inner.get("usageMetadata").map(|u| {
        let n = |k: &str| {
            let count = u.get(k).and_then(Value::as_u64).unwrap_or(0);
            u32::try_from(count).unwrap_or(u32::MAX)
        };
        UsageInfo {
            prompt_tokens: n("promptTokenCount"),
            completion_tokens: n("candidatesTokenCount"),
            total_tokens: n("totalTokenCount"),
        }
    });

    Ok(LlmResponse {
        content,
        tool_calls,
        finish_reason,
        usage,
        reasoning_content: (!thoughts.is_empty()).then_some(thoughts),
    })
}

// ─────────────────────────────────────────────
// AntigravityProvider
// ─────────────────────────────────────────────

pub struct AntigravityProvider {
    client: reqwest::Client,
    api_base: String,
    tokens: Arc<dyn TokenSource>,
}

impl AntigravityProvider {
    /// Adapter authenticating through `tokens`, routed through `proxy` when set.
    pub fn new(tokens: Arc<dyn TokenSource>, proxy: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(CHAT_TIMEOUT, proxy)?,
            api_base: CLOUD_CODE_API_BASE.to_string(),
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
impl LlmProvider for AntigravityProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse> {
        let token = self.tokens.token().await?;
        let project = token
            .project_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                Error::not_logged_in(CREDENTIAL_KEY, "no Cloud Code project on the stored credential")
            })?;

        let body = build_request(project, model, messages, tools, config);
        debug!(provider = "antigravity", model = %model, project, "Calling generateContent");

        let request = self
            .client
            .post(format!("{}/v1internal:generateContent", self.api_base))
            .bearer_auth(&token.token)
            .json(&body);
        let text = execute(request, config, "antigravity").await?;
        let value: Value = serde_json::from_str(&text)?;
        parse_response(&value)
    }

    fn display_name(&self) -> &str {
        "Antigravity"
    }
}
