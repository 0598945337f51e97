//! Provider resolution: turn a [`Config`] and a requested model into one
//! ready-to-use adapter.
//!
//! Precedence:
//! 1. a `model_list` route whose `model_name` or `model` matches;
//! 2. the family named in `agents.defaults.provider`, when its legacy
//!    entry is populated;
//! 3. the first [`HEURISTICS`] row matching the model name whose family
//!    entry is populated;
//! 4. OpenRouter, when it has a key.
//!
//! A route that fails to build is fatal; it never falls through to the
//! legacy surface.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use modelgate_auth::CredentialManager;
use modelgate_core::config::{Config, ModelConfig, ProviderConfig};
use modelgate_core::utils::mask_secret;
use modelgate_core::{Error, Result};

use crate::antigravity::AntigravityProvider;
use crate::claude::ClaudeProvider;
use crate::cli_bridge::CliBridgeProvider;
use crate::codex::CodexProvider;
use crate::copilot::{CopilotProvider, DEFAULT_COPILOT_BASE};
use crate::http_provider::HttpProvider;
use crate::protocol::extract_protocol;
use crate::registry::{
    find_by_legacy_name, find_by_name, find_by_protocol, FamilyKind, FamilySpec, HEURISTICS,
};
use crate::token::{AccessToken, CodexCliToken, ManagedToken, StaticToken, TokenSource};
use crate::traits::{LlmProvider, LlmRequestConfig};

/// DeepSeek model ids the legacy `deepseek` provider passes through.
const DEEPSEEK_MODELS: &[&str] = &["deepseek-chat", "deepseek-reasoner"];
const DEEPSEEK_DEFAULT_MODEL: &str = "deepseek-chat";

/// The outcome of resolution: an adapter plus the model id to send it.
pub struct ResolvedProvider {
    pub provider: Box<dyn LlmProvider>,
    pub model_id: String,
    /// Per-call defaults from `agents.defaults` (max tokens, temperature).
    pub request_defaults: LlmRequestConfig,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("provider", &self.provider.display_name())
            .field("model_id", &self.model_id)
            .field("max_tokens", &self.request_defaults.max_tokens)
            .field("temperature", &self.request_defaults.temperature)
            .finish()
    }
}

/// What adapters may need beyond their endpoint fields.
#[derive(Clone)]
pub struct ResolveContext {
    /// Working directory for CLI bridges.
    pub workspace: PathBuf,
    pub credentials: Arc<CredentialManager>,
    pub request_defaults: LlmRequestConfig,
}

impl ResolveContext {
    pub fn new(config: &Config, credentials: Arc<CredentialManager>) -> Self {
        Self {
            workspace: config.workspace_path(),
            credentials,
            request_defaults: LlmRequestConfig::from_defaults(&config.agents.defaults),
        }
    }
}

// ─────────────────────────────────────────────
// Entry points
// ─────────────────────────────────────────────

/// Resolve `agents.defaults.model`.
pub async fn resolve_default(
    config: &Config,
    credentials: Arc<CredentialManager>,
) -> Result<ResolvedProvider> {
    let model = config.agents.defaults.model.clone();
    resolve(config, &model, credentials).await
}

/// Resolve `requested_model` against `config`.
pub async fn resolve(
    config: &Config,
    requested_model: &str,
    credentials: Arc<CredentialManager>,
) -> Result<ResolvedProvider> {
    let model = requested_model.trim();
    let ctx = ResolveContext::new(config, credentials);

    if !config.model_list.is_empty() {
        if let Some(route) = config.get_model_config(model) {
            debug!(model_name = %route.model_name, model = %route.model, "Using model_list route");
            return create_provider_from_model_config(route, &ctx).await;
        }
    }

    if config.has_providers_config() && config.model_list.is_empty() {
        warn!("`providers` config is deprecated; migrate to `model_list`");
    }

    if let Some(resolved) = resolve_explicit(config, model, &ctx).await? {
        return Ok(resolved);
    }
    resolve_by_model_name(config, model, &ctx).await
}

/// Build the adapter for one route-table entry.
pub async fn create_provider_from_model_config(
    route: &ModelConfig,
    ctx: &ResolveContext,
) -> Result<ResolvedProvider> {
    if route.model.trim().is_empty() {
        return Err(Error::config(format!(
            "model_list entry '{}' has no model",
            route.model_name
        )));
    }
    let (protocol, model_id) = extract_protocol(&route.model);
    let family = find_by_protocol(protocol).ok_or_else(|| {
        Error::config(format!(
            "unknown protocol '{protocol}' in model '{}'",
            route.model
        ))
    })?;

    let provider = build_family(family, &route.endpoint(), ctx).await?;
    info!(provider = family.name, model = %model_id, "Resolved provider from model_list");
    Ok(ResolvedProvider {
        provider,
        model_id: model_id.to_string(),
        request_defaults: ctx.request_defaults.clone(),
    })
}

// ─────────────────────────────────────────────
// Family construction
// ─────────────────────────────────────────────

/// Construct the adapter for `family` bound to `endpoint`.
async fn build_family(
    family: &'static FamilySpec,
    endpoint: &ProviderConfig,
    ctx: &ResolveContext,
) -> Result<Box<dyn LlmProvider>> {
    match family.kind {
        FamilyKind::Http => {
            if endpoint.api_key.is_empty() && endpoint.api_base.is_empty() {
                return Err(Error::config(format!(
                    "api_key or api_base is required for protocol '{}'",
                    family.name
                )));
            }
            http_provider(family, endpoint)
        }
        FamilyKind::Anthropic if endpoint.uses_stored_credential() => {
            let tokens = credential_tokens(family, endpoint, ctx)?;
            Ok(Box::new(
                ClaudeProvider::new(tokens, &endpoint.proxy)?.with_api_base(&endpoint.api_base),
            ))
        }
        FamilyKind::OpenAi if endpoint.uses_stored_credential() => {
            let tokens = credential_tokens(family, endpoint, ctx)?;
            Ok(Box::new(
                CodexProvider::new(tokens, &endpoint.proxy)?.with_api_base(&endpoint.api_base),
            ))
        }
        FamilyKind::OpenAi if endpoint.auth_method == "codex-cli" => {
            let tokens: Arc<dyn TokenSource> = Arc::new(CodexCliToken::default());
            Ok(Box::new(
                CodexProvider::new(tokens, &endpoint.proxy)?.with_api_base(&endpoint.api_base),
            ))
        }
        FamilyKind::Anthropic | FamilyKind::OpenAi => {
            if endpoint.api_key.is_empty() && endpoint.api_base.is_empty() {
                return Err(Error::config(format!(
                    "api_key, api_base or auth_method is required for protocol '{}'",
                    family.name
                )));
            }
            http_provider(family, endpoint)
        }
        FamilyKind::Antigravity => {
            let tokens = credential_tokens(family, endpoint, ctx)?;
            Ok(Box::new(
                AntigravityProvider::new(tokens, &endpoint.proxy)?
                    .with_api_base(&endpoint.api_base),
            ))
        }
        FamilyKind::ClaudeCli => Ok(Box::new(CliBridgeProvider::claude(ctx.workspace.clone()))),
        FamilyKind::CodexCli => Ok(Box::new(CliBridgeProvider::codex(ctx.workspace.clone()))),
        FamilyKind::GithubCopilot => {
            let base = if endpoint.api_base.is_empty() {
                family.default_api_base.unwrap_or(DEFAULT_COPILOT_BASE)
            } else {
                endpoint.api_base.as_str()
            };
            Ok(Box::new(
                CopilotProvider::connect(base, &endpoint.connect_mode, &endpoint.proxy).await?,
            ))
        }
    }
}

/// OpenAI-wire adapter at the endpoint's base, or the family default.
fn http_provider(family: &FamilySpec, endpoint: &ProviderConfig) -> Result<Box<dyn LlmProvider>> {
    let base = if endpoint.api_base.is_empty() {
        family.default_api_base.unwrap_or_default()
    } else {
        endpoint.api_base.as_str()
    };
    if base.is_empty() {
        return Err(Error::config(format!(
            "no API base configured for '{}'",
            family.name
        )));
    }
    Ok(Box::new(
        HttpProvider::new(&endpoint.api_key, base, &endpoint.proxy)?
            .with_display_name(family.display_name),
    ))
}

/// Token source for a credential-backed adapter.
///
/// A key on the endpoint is used as-is; otherwise the family's stored
/// credential must exist now and is re-read (and refreshed) per call.
fn credential_tokens(
    family: &FamilySpec,
    endpoint: &ProviderConfig,
    ctx: &ResolveContext,
) -> Result<Arc<dyn TokenSource>> {
    if !endpoint.api_key.is_empty() {
        debug!(provider = family.name, key = %mask_secret(&endpoint.api_key), "Using inline token");
        return Ok(Arc::new(StaticToken(AccessToken {
            token: endpoint.api_key.clone(),
            ..Default::default()
        })));
    }
    let key = family.credential_key.unwrap_or(family.name);
    if ctx.credentials.get_credential(key)?.is_none() {
        return Err(Error::not_logged_in(key, format!("no credentials for {key}")));
    }
    Ok(Arc::new(ManagedToken::new(ctx.credentials.clone(), key)))
}

// ─────────────────────────────────────────────
// Legacy `providers` surface
// ─────────────────────────────────────────────

fn legacy_endpoint(config: &Config, family: &FamilySpec) -> ProviderConfig {
    family
        .legacy_key
        .and_then(|k| config.providers.get_by_name(k))
        .cloned()
        .unwrap_or_default()
}

/// HTTP adapter on the legacy surface, which always needs a key.
fn legacy_http(
    family: &FamilySpec,
    endpoint: &ProviderConfig,
    model: &str,
) -> Result<Box<dyn LlmProvider>> {
    if endpoint.api_key.is_empty() && !model.starts_with("bedrock/") {
        return Err(Error::config(format!(
            "no API key configured for provider '{}' (model: {model})",
            family.name
        )));
    }
    http_provider(family, endpoint)
}

/// Build `family` from its legacy entry: credential-backed and non-HTTP
/// kinds go through [`build_family`], the rest through [`legacy_http`].
async fn build_legacy(
    family: &'static FamilySpec,
    endpoint: &ProviderConfig,
    model: &str,
    ctx: &ResolveContext,
) -> Result<Box<dyn LlmProvider>> {
    match family.kind {
        FamilyKind::Http => legacy_http(family, endpoint, model),
        FamilyKind::Anthropic | FamilyKind::OpenAi
            if endpoint.uses_stored_credential() || endpoint.auth_method == "codex-cli" =>
        {
            build_family(family, endpoint, ctx).await
        }
        FamilyKind::Anthropic | FamilyKind::OpenAi => legacy_http(family, endpoint, model),
        _ => build_family(family, endpoint, ctx).await,
    }
}

/// Step 2: `agents.defaults.provider`. An unknown or unpopulated family
/// yields `None` so model-name detection can run.
async fn resolve_explicit(
    config: &Config,
    model: &str,
    ctx: &ResolveContext,
) -> Result<Option<ResolvedProvider>> {
    let name = config.agents.defaults.provider.trim();
    if name.is_empty() {
        return Ok(None);
    }
    let Some(family) = find_by_legacy_name(name) else {
        warn!(provider = name, "Unknown provider in agents.defaults.provider");
        return Ok(None);
    };
    let endpoint = legacy_endpoint(config, family);
    if !family.explicit_requirement.satisfied_by(&endpoint) {
        debug!(provider = family.name, "Explicit provider has no endpoint configured");
        return Ok(None);
    }

    let model_id = if family.name == "deepseek" && !DEEPSEEK_MODELS.contains(&model) {
        DEEPSEEK_DEFAULT_MODEL
    } else {
        model
    };
    let provider = build_legacy(family, &endpoint, model_id, ctx).await?;
    info!(provider = family.name, model = %model_id, "Resolved explicitly configured provider");
    Ok(Some(ResolvedProvider {
        provider,
        model_id: model_id.to_string(),
        request_defaults: ctx.request_defaults.clone(),
    }))
}

/// Steps 3 and 4: model-name heuristics, then the OpenRouter default.
async fn resolve_by_model_name(
    config: &Config,
    model: &str,
    ctx: &ResolveContext,
) -> Result<ResolvedProvider> {
    let detected = HEURISTICS.iter().find_map(|h| {
        let family = find_by_name(h.family)?;
        let endpoint = legacy_endpoint(config, family);
        (h.matches(model) && h.requires.satisfied_by(&endpoint)).then_some((family, endpoint))
    });

    let (family, endpoint) = match detected {
        Some(found) => found,
        None => {
            let openrouter = find_by_name("openrouter")
                .map(|f| (f, legacy_endpoint(config, f)))
                .filter(|(_, e)| e.is_configured());
            openrouter.ok_or_else(|| unconfigured_model(model))?
        }
    };

    let provider = build_legacy(family, &endpoint, model, ctx).await?;
    info!(provider = family.name, model = %model, "Resolved provider from model name");
    Ok(ResolvedProvider {
        provider,
        model_id: model.to_string(),
        request_defaults: ctx.request_defaults.clone(),
    })
}

/// Error for a model no family can serve, naming the families whose
/// pattern matched but whose entry is not configured.
fn unconfigured_model(model: &str) -> Error {
    let matched: Vec<&str> = HEURISTICS
        .iter()
        .filter(|h| !h.is_catch_all() && h.matches(model))
        .map(|h| h.family)
        .collect();
    if matched.is_empty() {
        Error::config(format!("no provider configured for model '{model}'"))
    } else {
        Error::config(format!(
            "no provider configured for model '{model}': it matches {} but none is configured",
            matched.join(", ")
        ))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
