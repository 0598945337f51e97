//! Generic adapter for OpenAI-compatible `/chat/completions` endpoints.
//!
//! Covers every `Http` family (OpenRouter, Groq, ZhiPu, Gemini, NVIDIA,
//! Ollama, Moonshot, ShengSuanYun, DeepSeek, Cerebras, VolcEngine, vLLM,
//! Qwen) plus OpenAI and Anthropic when used with a plain API key.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use modelgate_core::types::{
    ChatCompletionRequest, ChatCompletionResponse, LlmResponse, Message, ToolDefinition,
};
use modelgate_core::{Error, Result};

use crate::registry::{apply_model_overrides, strip_wire_prefix, uses_max_completion_tokens};
use crate::traits::{LlmProvider, LlmRequestConfig};

/// Timeout for a single chat call.
pub const CHAT_TIMEOUT: Duration = Duration::from_secs(120);

// ─────────────────────────────────────────────
// Shared transport helpers
// ─────────────────────────────────────────────

/// Build a client with `timeout`, routed through `proxy` when one is set.
///
/// An unparseable proxy URL is logged and ignored.
pub(crate) fn build_client(timeout: Duration, proxy: &str) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if !proxy.is_empty() {
        match reqwest::Proxy::all(proxy) {
            Ok(p) => builder = builder.proxy(p),
            Err(e) => warn!(proxy, error = %e, "ignoring invalid proxy URL"),
        }
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn network_error(e: reqwest::Error) -> Error {
    Error::Network(e.to_string())
}

/// Send `request` and return the body of a 2xx response.
///
/// Non-2xx becomes [`Error::Transport`]; the cancellation token in
/// `config` aborts the call with [`Error::Cancelled`].
pub(crate) async fn execute(
    request: reqwest::RequestBuilder,
    config: &LlmRequestConfig,
    provider: &str,
) -> Result<String> {
    config
        .run(async {
            let resp = request.send().await.map_err(|e| {
                error!(provider, error = %e, "HTTP request failed");
                network_error(e)
            })?;
            let status = resp.status();
            let body = resp.text().await.map_err(network_error)?;
            if !status.is_success() {
                error!(provider, status = %status, body = %body, "API error");
                return Err(Error::Transport {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(body)
        })
        .await
}

/// OpenAI-wire request body with the wire quirks applied.
pub(crate) fn build_request_body(
    messages: &[Message],
    tools: Option<&[ToolDefinition]>,
    wire_model: &str,
    config: &LlmRequestConfig,
) -> ChatCompletionRequest {
    let tools = tools.filter(|t| !t.is_empty());
    let (max_tokens, max_completion_tokens) = match config.max_tokens {
        Some(n) if uses_max_completion_tokens(wire_model) => (None, Some(n)),
        Some(n) => (Some(n), None),
        None => (None, None),
    };
    ChatCompletionRequest {
        model: wire_model.to_string(),
        messages: messages.to_vec(),
        tools: tools.map(|t| t.to_vec()),
        tool_choice: tools.map(|_| "auto".to_string()),
        max_tokens,
        max_completion_tokens,
        temperature: config
            .temperature
            .map(|t| apply_model_overrides(wire_model, t)),
    }
}

/// Parse an OpenAI-wire response body.
pub(crate) fn parse_response(body: &str) -> Result<LlmResponse> {
    let resp: ChatCompletionResponse = serde_json::from_str(body)?;
    Ok(resp.into())
}

// ─────────────────────────────────────────────
// HttpProvider
// ─────────────────────────────────────────────

/// Adapter for any OpenAI-compatible HTTP API.
pub struct HttpProvider {
    client: reqwest::Client,
    /// API base URL without trailing slash (e.g. `"https://api.openai.com/v1"`).
    api_base: String,
    /// Bearer key; empty means no `Authorization` header.
    api_key: String,
    display_name: String,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("api_base", &self.api_base)
            .field("provider", &self.display_name)
            .finish()
    }
}

impl HttpProvider {
    /// Create an adapter for `api_base`, authenticating with `api_key`
    /// when it is non-empty and routing through `proxy` when set.
    pub fn new(api_key: &str, api_base: &str, proxy: &str) -> Result<Self> {
        Ok(HttpProvider {
            client: build_client(CHAT_TIMEOUT, proxy)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            display_name: "HTTP".to_string(),
        })
    }

    /// Name used in log lines.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse> {
        if self.api_base.is_empty() {
            return Err(Error::config("API base not configured"));
        }

        let wire_model = strip_wire_prefix(model);
        debug!(
            provider = %self.display_name,
            model = %wire_model,
            messages = messages.len(),
            tools = tools.map_or(0, |t| t.len()),
            "Calling LLM"
        );

        let body = build_request_body(messages, tools, wire_model, config);
        let mut request = self.client.post(self.completions_url()).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let text = execute(request, config, &self.display_name).await?;
        let resp = parse_response(&text).map_err(|e| {
            error!(provider = %self.display_name, error = %e, "Failed to parse LLM response");
            e
        })?;
        debug!(
            provider = %self.display_name,
            content_len = resp.content.len(),
            tool_calls = resp.tool_calls.len(),
            finish_reason = %resp.finish_reason,
            "LLM response received"
        );
        Ok(resp)
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn ok_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-test",
            "choices": [{
                "message": { "content": content },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        })
    }

    async fn sent_body(server: &MockServer) -> serde_json::Value {
        let requests: Vec<Request> = server.received_requests().await.unwrap();
        serde_json::from_slice(&requests[0].body).unwrap()
    }

    #[test]
    fn test_completions_url_trailing_slash() {
        let provider = HttpProvider::new("key", "https://api.openai.com/v1/", "").unwrap();
        assert_eq!(provider.completions_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_invalid_proxy_is_ignored() {
        assert!(HttpProvider::new("key", "https://api.openai.com/v1", "::not a url::").is_ok());
        assert!(HttpProvider::new("key", "https://api.openai.com/v1", "http://127.0.0.1:3128").is_ok());
    }

    #[tokio::test]
    async fn test_chat_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("Hello there")))
            .mount(&server)
            .await;

        let provider = HttpProvider::new("test-key-123", &server.uri(), "").unwrap();
        let messages = vec![Message::system("You are helpful."), Message::user("Hello")];
        let resp = provider
            .chat(&messages, None, "gpt-4o", &LlmRequestConfig::default())
            .await
            .unwrap();

        assert_eq!(resp.content, "Hello there");
        assert!(!resp.has_tool_calls());
        assert_eq!(resp.finish_reason, "stop");
        assert_eq!(resp.usage.as_ref().unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn test_no_authorization_header_without_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("ok")))
            .mount(&server)
            .await;

        let provider = HttpProvider::new("", &server.uri(), "").unwrap();
        provider
            .chat(&[Message::user("hi")], None, "llama3", &LlmRequestConfig::default())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_groq_segment_stripped_rest_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({ "model": "openai/gpt-oss-120b" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpProvider::new("gsk", &server.uri(), "").unwrap();
        let resp = provider
            .chat(
                &[Message::user("hi")],
                None,
                "groq/openai/gpt-oss-120b",
                &LlmRequestConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(resp.content, "ok");
    }

    #[tokio::test]
    async fn test_max_completion_tokens_and_kimi_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("ok")))
            .mount(&server)
            .await;

        let provider = HttpProvider::new("k", &server.uri(), "").unwrap();
        let cfg = LlmRequestConfig::default()
            .with_max_tokens(1024)
            .with_temperature(0.2);

        provider
            .chat(&[Message::user("hi")], None, "glm-4.7", &cfg)
            .await
            .unwrap();
        let body = sent_body(&server).await;
        assert_eq!(body["max_completion_tokens"], 1024);
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["temperature"], 0.2);

        server.reset().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("ok")))
            .mount(&server)
            .await;
        provider
            .chat(&[Message::user("hi")], None, "moonshot/kimi-k2.5", &cfg)
            .await
            .unwrap();
        let body = sent_body(&server).await;
        assert_eq!(body["model"], "kimi-k2.5");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["temperature"], 1.0);
    }

    #[tokio::test]
    async fn test_unset_options_are_omitted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("ok")))
            .mount(&server)
            .await;

        let provider = HttpProvider::new("k", &server.uri(), "").unwrap();
        provider
            .chat(&[Message::user("hi")], Some(&[]), "gpt-4o", &LlmRequestConfig::default())
            .await
            .unwrap();
        let body = sent_body(&server).await;
        for field in ["max_tokens", "max_completion_tokens", "temperature", "tools", "tool_choice"] {
            assert!(body.get(field).is_none(), "{field} should be omitted");
        }
    }

    #[tokio::test]
    async fn test_chat_with_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({ "tool_choice": "auto" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [
                            {
                                "id": "call_abc123",
                                "type": "function",
                                "function": {
                                    "name": "web_search",
                                    "arguments": "{\"query\": \"Rust programming\"}",
                                    "thought_signature": "sig-1"
                                }
                            },
                            {
                                "id": "call_bad",
                                "type": "function",
                                "function": { "name": "broken", "arguments": "{not json" }
                            }
                        ]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let provider = HttpProvider::new("key", &server.uri(), "").unwrap();
        let tool_def = ToolDefinition::new(
            "web_search",
            "Search the web",
            serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        );
        let resp = provider
            .chat(
                &[Message::user("Search for Rust")],
                Some(&[tool_def]),
                "gpt-4o",
                &LlmRequestConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(resp.content, "");
        assert_eq!(resp.finish_reason, "tool_calls");
        assert_eq!(resp.tool_calls.len(), 2);
        let first = &resp.tool_calls[0];
        assert_eq!(first.function.name, "web_search");
        assert_eq!(first.arguments["query"], "Rust programming");
        assert_eq!(first.function.thought_signature.as_deref(), Some("sig-1"));
        assert_eq!(resp.tool_calls[1].arguments["raw"], "{not json");
    }

    #[tokio::test]
    async fn test_empty_choices_is_stop() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&server)
            .await;

        let provider = HttpProvider::new("key", &server.uri(), "").unwrap();
        let resp = provider
            .chat(&[Message::user("hi")], None, "gpt-4o", &LlmRequestConfig::default())
            .await
            .unwrap();
        assert_eq!(resp.content, "");
        assert_eq!(resp.finish_reason, "stop");
        assert!(resp.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_chat_api_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit exceeded"))
            .mount(&server)
            .await;

        let provider = HttpProvider::new("key", &server.uri(), "").unwrap();
        let err = provider
            .chat(&[Message::user("Hello")], None, "gpt-4o", &LlmRequestConfig::default())
            .await
            .unwrap_err();
        match err {
            Error::Transport { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "Rate limit exceeded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let provider = HttpProvider::new("key", &server.uri(), "").unwrap();
        let err = provider
            .chat(&[Message::user("Hello")], None, "gpt-4o", &LlmRequestConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn test_chat_network_error() {
        let provider = HttpProvider::new("key", "http://127.0.0.1:1", "").unwrap();
        let err = provider
            .chat(&[Message::user("Hello")], None, "gpt-4o", &LlmRequestConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ok_body("late"))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let provider = HttpProvider::new("key", &server.uri(), "").unwrap();
        let token = CancellationToken::new();
        let cfg = LlmRequestConfig::default().with_cancel(token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let err = provider
            .chat(&[Message::user("Hello")], None, "gpt-4o", &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_with_reasoning_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{
                    "message": {
                        "content": "The answer is 42.",
                        "reasoning_content": "Let me think step by step..."
                    },
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let provider = HttpProvider::new("key", &server.uri(), "").unwrap();
        let resp = provider
            .chat(&[Message::user("?")], None, "deepseek-reasoner", &LlmRequestConfig::default())
            .await
            .unwrap();
        assert_eq!(resp.reasoning_content.as_deref(), Some("Let me think step by step..."));
    }
}
