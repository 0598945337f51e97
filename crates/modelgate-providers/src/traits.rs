//! The uniform chat contract every backend adapter implements.

use async_trait::async_trait;
use modelgate_core::config::AgentDefaults;
use modelgate_core::types::{LlmResponse, Message, ToolDefinition};
use modelgate_core::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Per-call options.
///
/// Unset fields are left out of the request so the backend's own defaults
/// apply.
#[derive(Clone, Debug, Default)]
pub struct LlmRequestConfig {
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: Option<f64>,
    /// Cancelling this token aborts the in-flight call with [`Error::Cancelled`].
    pub cancel: Option<CancellationToken>,
}

impl LlmRequestConfig {
    /// Limits and sampling from the agent defaults; a zero `max_tokens`
    /// leaves the limit to the backend.
    pub fn from_defaults(defaults: &AgentDefaults) -> Self {
        Self {
            max_tokens: (defaults.max_tokens > 0).then_some(defaults.max_tokens),
            temperature: Some(defaults.temperature),
            cancel: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run `fut`, resolving to [`Error::Cancelled`] if the token fires first.
    pub async fn run<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(Error::Cancelled),
                out = fut => out,
            },
            None => fut.await,
        }
    }
}

/// A chat backend bound to one endpoint and credential.
///
/// Chosen once at resolution time; callers never branch on the concrete type.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send one chat turn.
    ///
    /// * `messages`: conversation history in OpenAI format.
    /// * `tools`   : tool definitions the model may call.
    /// * `model`   : model id as returned by resolution.
    /// * `config`  : limits, sampling and cancellation.
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse>;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_without_token_passes_through() {
        let cfg = LlmRequestConfig::default();
        assert_eq!(cfg.run(async { Ok(7) }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let token = CancellationToken::new();
        let cfg = LlmRequestConfig::default().with_cancel(token.clone());
        token.cancel();
        let out: Result<()> = cfg.run(std::future::pending()).await;
        assert!(matches!(out, Err(Error::Cancelled)));
    }

    #[test]
    fn test_builders() {
        let cfg = LlmRequestConfig::default().with_max_tokens(512).with_temperature(0.2);
        assert_eq!(cfg.max_tokens, Some(512));
        assert_eq!(cfg.temperature, Some(0.2));
        assert!(cfg.cancel.is_none());
    }

    #[test]
    fn test_from_agent_defaults() {
        let cfg = LlmRequestConfig::from_defaults(&AgentDefaults::default());
        assert_eq!(cfg.max_tokens, Some(8192));
        assert_eq!(cfg.temperature, Some(0.7));

        let unlimited = AgentDefaults {
            max_tokens: 0,
            ..AgentDefaults::default()
        };
        assert!(LlmRequestConfig::from_defaults(&unlimited).max_tokens.is_none());
    }
}
