//! Configuration schema: the read-only input of provider resolution.
//!
//! Hierarchy: `Config` → `AgentsConfig`, `ProvidersConfig` (legacy per-family
//! endpoints), `model_list` (the route table), `AuthConfig`.
//!
//! JSON uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration handed to the resolver by the caller.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agents: AgentsConfig,
    /// Legacy per-family endpoint configuration (fallback surface).
    pub providers: ProvidersConfig,
    /// Ordered route table (preferred surface).
    pub model_list: Vec<ModelConfig>,
    pub auth: AuthConfig,
}

impl Config {
    /// Find a route by logical name first, then by qualified model string.
    pub fn get_model_config(&self, model: &str) -> Option<&ModelConfig> {
        let model = model.trim();
        self.model_list
            .iter()
            .find(|m| m.model_name == model)
            .or_else(|| self.model_list.iter().find(|m| m.model == model))
    }

    /// Whether any legacy provider entry carries a value.
    pub fn has_providers_config(&self) -> bool {
        self.providers
            .entries()
            .iter()
            .any(|(_, p)| !p.is_empty())
    }

    /// Workspace directory with `~` expanded.
    pub fn workspace_path(&self) -> PathBuf {
        crate::utils::expand_home(&self.agents.defaults.workspace)
    }
}

// ─────────────────────────────────────────────
// Agents
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
}

/// Default agent settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentDefaults {
    /// Workspace directory (CLI bridges run here).
    pub workspace: String,
    /// Explicit provider family; empty means "infer from the model name".
    pub provider: String,
    /// Default model identifier.
    pub model: String,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "~/.modelgate/workspace".to_string(),
            provider: String::new(),
            model: "glm-4.7".to_string(),
            max_tokens: 8192,
            temperature: 0.7,
        }
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// One configured provider account.
///
/// Empty strings mean "unset".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    /// Custom API base URL (overrides the family default).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_base: String,
    /// Outbound HTTP(S) proxy URL.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub proxy: String,
    /// `""`, `"token"`, `"oauth"` or a CLI-bridge tag such as `"codex-cli"`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub auth_method: String,
    /// Transport used to reach a local gateway sidecar.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub connect_mode: String,
}

impl ProviderConfig {
    /// Whether this provider has an API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Whether the entry names a way to authenticate or reach the backend.
    pub fn is_usable(&self) -> bool {
        !self.api_key.is_empty() || !self.api_base.is_empty() || !self.auth_method.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self == &ProviderConfig::default()
    }

    /// Whether the auth method selects a stored OAuth/token credential.
    pub fn uses_stored_credential(&self) -> bool {
        self.auth_method == "oauth" || self.auth_method == "token"
    }
}

/// All legacy provider configurations, one per family.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub anthropic: ProviderConfig,
    pub openai: ProviderConfig,
    pub openrouter: ProviderConfig,
    pub groq: ProviderConfig,
    pub zhipu: ProviderConfig,
    pub vllm: ProviderConfig,
    pub gemini: ProviderConfig,
    pub nvidia: ProviderConfig,
    pub ollama: ProviderConfig,
    pub moonshot: ProviderConfig,
    pub shengsuanyun: ProviderConfig,
    pub deepseek: ProviderConfig,
    pub cerebras: ProviderConfig,
    pub volcengine: ProviderConfig,
    pub qwen: ProviderConfig,
    pub github_copilot: ProviderConfig,
    pub antigravity: ProviderConfig,
}

impl ProvidersConfig {
    /// Get a provider config by canonical family name (e.g. `"anthropic"`).
    pub fn get_by_name(&self, name: &str) -> Option<&ProviderConfig> {
        self.entries()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| c)
    }

    /// `(family, config)` pairs in declaration order.
    pub fn entries(&self) -> [(&'static str, &ProviderConfig); 17] {
        [
            ("anthropic", &self.anthropic),
            ("openai", &self.openai),
            ("openrouter", &self.openrouter),
            ("groq", &self.groq),
            ("zhipu", &self.zhipu),
            ("vllm", &self.vllm),
            ("gemini", &self.gemini),
            ("nvidia", &self.nvidia),
            ("ollama", &self.ollama),
            ("moonshot", &self.moonshot),
            ("shengsuanyun", &self.shengsuanyun),
            ("deepseek", &self.deepseek),
            ("cerebras", &self.cerebras),
            ("volcengine", &self.volcengine),
            ("qwen", &self.qwen),
            ("github-copilot", &self.github_copilot),
            ("antigravity", &self.antigravity),
        ]
    }
}

// ─────────────────────────────────────────────
// Route table
// ─────────────────────────────────────────────

/// A named, fully protocol-qualified model route.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelConfig {
    /// Logical name callers may request (e.g. `"fast"`).
    pub model_name: String,
    /// `protocol/model-id`, e.g. `"groq/openai/gpt-oss-120b"`.
    pub model: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_base: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub proxy: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub auth_method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub connect_mode: String,
}

impl ModelConfig {
    /// The endpoint fields of this route as a [`ProviderConfig`].
    pub fn endpoint(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self.api_key.clone(),
            api_base: self.api_base.clone(),
            proxy: self.proxy.clone(),
            auth_method: self.auth_method.clone(),
            connect_mode: self.connect_mode.clone(),
        }
    }
}

// ─────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────

/// What to do with an expired credential that has no refresh token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiredCredentialPolicy {
    /// Return it silently.
    Allow,
    /// Log a warning and return it.
    #[default]
    Warn,
    /// Fail with an authentication error.
    Reject,
}

/// Credential lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    /// A credential expiring within this many seconds is refreshed.
    pub refresh_window_secs: u64,
    pub expired_policy: ExpiredCredentialPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_window_secs: 300,
            expired_policy: ExpiredCredentialPolicy::Warn,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
