//! Adapter for a local GitHub Copilot gateway sidecar.
//!
//! The sidecar speaks the OpenAI wire format without authentication on its
//! base address, for both the `grpc` (default) and `http` connect modes.
//! Construction probes it so an unreachable gateway fails at resolution
//! time rather than on the first chat.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use modelgate_core::types::{LlmResponse, Message, ToolDefinition};
use modelgate_core::{Error, Result};

use crate::http_provider::{build_client, HttpProvider};
use crate::traits::{LlmProvider, LlmRequestConfig};

pub const DEFAULT_COPILOT_BASE: &str = "localhost:4321";

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// How the sidecar is reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectMode {
    Http,
    Grpc,
    Stdio,
}

impl ConnectMode {
    /// Parse a configured mode; empty means `grpc`.
    pub fn parse(mode: &str) -> Result<Self> {
        match mode.trim().to_lowercase().as_str() {
            "" | "grpc" => Ok(ConnectMode::Grpc),
            "http" => Ok(ConnectMode::Http),
            "stdio" => Ok(ConnectMode::Stdio),
            other => Err(Error::config(format!(
                "unknown github-copilot connect mode '{other}'"
            ))),
        }
    }
}

/// Add `http://` when the configured base carries no scheme.
fn normalize_base(api_base: &str) -> String {
    let base = api_base.trim().trim_end_matches('/');
    let base = if base.is_empty() { DEFAULT_COPILOT_BASE } else { base };
    if base.contains("://") {
        base.to_string()
    } else {
        format!("http://{base}")
    }
}

pub struct CopilotProvider {
    inner: HttpProvider,
}

impl CopilotProvider {
    /// Probe the sidecar at `api_base` and bind to it, routing through
    /// `proxy` when set.
    ///
    /// Any HTTP answer counts as reachable. `stdio` needs a spawned sidecar
    /// and is rejected.
    pub async fn connect(api_base: &str, connect_mode: &str, proxy: &str) -> Result<Self> {
        let mode = ConnectMode::parse(connect_mode)?;
        if mode == ConnectMode::Stdio {
            return Err(Error::config(
                "github-copilot connect mode \"stdio\" is not supported; use \"grpc\" or \"http\"",
            ));
        }

        let base = normalize_base(api_base);
        let probe = build_client(PROBE_TIMEOUT, proxy)?;
        debug!(provider = "github-copilot", base = %base, ?mode, "Probing Copilot gateway");
        probe
            .get(format!("{base}/models"))
            .send()
            .await
            .map_err(|e| {
                Error::config(format!("github-copilot gateway at {base} is unreachable: {e}"))
            })?;
        info!(base = %base, "Connected to Copilot gateway");

        Ok(Self {
            inner: HttpProvider::new("", &base, proxy)?.with_display_name("GitHub Copilot"),
        })
    }

    pub fn api_base(&self) -> &str {
        self.inner.api_base()
    }
}

#[async_trait]
impl LlmProvider for CopilotProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse> {
        self.inner.chat(messages, tools, model, config).await
    }

    fn display_name(&self) -> &str {
        self.inner.display_name()
    }
}
