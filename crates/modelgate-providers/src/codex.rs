//! OpenAI adapter for ChatGPT-account (OAuth) credentials.
//!
//! Same wire format as [`HttpProvider`](crate::http_provider::HttpProvider),
//! but the bearer token comes from a [`TokenSource`] on every call and the
//! account id travels in `chatgpt-account-id`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use modelgate_core::types::{LlmResponse, Message, ToolDefinition};
use modelgate_core::Result;

use crate::http_provider::{build_client, build_request_body, execute, parse_response, CHAT_TIMEOUT};
use crate::token::TokenSource;
use crate::traits::{LlmProvider, LlmRequestConfig};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

pub struct CodexProvider {
    client: reqwest::Client,
    api_base: String,
    tokens: Arc<dyn TokenSource>,
}

impl CodexProvider {
    /// Adapter authenticating through `tokens`, routed through `proxy` when set.
    pub fn new(tokens: Arc<dyn TokenSource>, proxy: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(CHAT_TIMEOUT, proxy)?,
            api_base: OPENAI_API_BASE.to_string(),
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
impl LlmProvider for CodexProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse> {
        let token = self.tokens.token().await?;
        let body = build_request_body(messages, tools, model, config);
        debug!(provider = "codex", model = %model, messages = messages.len(), "Calling LLM");

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&token.token)
            .json(&body);
        if let Some(account) = token.account_id.as_deref().filter(|a| !a.is_empty()) {
            request = request.header("chatgpt-account-id", account);
        }

        let text = execute(request, config, "codex").await?;
        parse_response(&text)
    }

    fn display_name(&self) -> &str {
        "Codex"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::ManagedToken;
    use modelgate_auth::{AuthCredential, CredentialManager, MemoryCredentialStore};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_sends_bearer_and_account_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer oauth-at"))
            .and(header("chatgpt-account-id", "acct-77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "hi" }, "finish_reason": "stop" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let manager = Arc::new(CredentialManager::new(Arc::new(MemoryCredentialStore::new())));
        let mut cred = AuthCredential::token("openai", "oauth-at");
        cred.auth_method = "oauth".into();
        cred.account_id = Some("acct-77".into());
        manager.set_credential("openai", cred).unwrap();

        let provider = CodexProvider::new(Arc::new(ManagedToken::new(manager, "openai")), "")
            .unwrap()
            .with_api_base(&server.uri());
        let resp = provider
            .chat(&[Message::user("hello")], None, "gpt-5", &LlmRequestConfig::default())
            .await
            .unwrap();
        assert_eq!(resp.content, "hi");
    }

    #[tokio::test]
    async fn test_credential_deleted_after_construction() {
        let manager = Arc::new(CredentialManager::new(Arc::new(MemoryCredentialStore::new())));
        manager
            .set_credential("openai", AuthCredential::token("openai", "at"))
            .unwrap();
        let tokens = Arc::new(ManagedToken::new(manager.clone(), "openai"));
        let provider = CodexProvider::new(tokens, "").unwrap();
        manager.delete_all_credentials().unwrap();

        let err = provider
            .chat(&[Message::user("hello")], None, "gpt-5", &LlmRequestConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_authentication());
    }
}
