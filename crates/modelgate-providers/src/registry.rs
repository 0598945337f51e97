//! Family registry: static tables describing every supported backend.
//!
//! Adding a family is a table edit: a [`FamilySpec`] row for construction,
//! optionally a [`Heuristic`] row for legacy model-name detection, and a
//! [`ModelOverride`] row for per-model request quirks.

use modelgate_core::config::ProviderConfig;

// ─────────────────────────────────────────────
// FamilySpec: static metadata for one family
// ─────────────────────────────────────────────

/// Which adapter a family is built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FamilyKind {
    /// OpenAI-compatible `/chat/completions` endpoint.
    Http,
    /// Anthropic: HTTP with an API key, Messages API with a stored credential.
    Anthropic,
    /// OpenAI: HTTP with an API key, Codex backend with a stored credential.
    OpenAi,
    /// Google Cloud Code backend, always credential-backed.
    Antigravity,
    ClaudeCli,
    CodexCli,
    /// Local Copilot sidecar.
    GithubCopilot,
}

/// Which legacy fields make a family usable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    /// Nothing; the family is always usable.
    None,
    ApiKey,
    ApiBase,
    /// API key or an `auth_method`.
    KeyOrAuth,
    /// API key, API base or `auth_method`.
    Any,
}

impl Requirement {
    pub fn satisfied_by(self, p: &ProviderConfig) -> bool {
        match self {
            Requirement::None => true,
            Requirement::ApiKey => !p.api_key.is_empty(),
            Requirement::ApiBase => !p.api_base.is_empty(),
            Requirement::KeyOrAuth => !p.api_key.is_empty() || !p.auth_method.is_empty(),
            Requirement::Any => p.is_usable(),
        }
    }
}

/// Static specification of one family.
#[derive(Clone, Debug)]
pub struct FamilySpec {
    /// Canonical protocol tag, e.g. `"groq"`.
    pub name: &'static str,
    pub kind: FamilyKind,
    /// Human-readable name for logs.
    pub display_name: &'static str,
    /// Other protocol tags accepted in `model_list` entries.
    pub protocol_aliases: &'static [&'static str],
    /// Other names accepted in `agents.defaults.provider`.
    pub legacy_aliases: &'static [&'static str],
    pub default_api_base: Option<&'static str>,
    /// The backend expects the bare model id, so `<name>/` is stripped on the wire.
    pub strip_wire_prefix: bool,
    /// Field of the legacy `providers` section holding this family's endpoint.
    pub legacy_key: Option<&'static str>,
    /// Credential-store key for credential-backed adapters.
    pub credential_key: Option<&'static str>,
    /// What an explicit legacy selection needs to be honoured.
    pub explicit_requirement: Requirement,
}

const fn http(
    name: &'static str,
    display_name: &'static str,
    legacy_aliases: &'static [&'static str],
    default_api_base: Option<&'static str>,
    strip_wire_prefix: bool,
) -> FamilySpec {
    FamilySpec {
        name,
        kind: FamilyKind::Http,
        display_name,
        protocol_aliases: &[],
        legacy_aliases,
        default_api_base,
        strip_wire_prefix,
        legacy_key: Some(name),
        credential_key: None,
        explicit_requirement: Requirement::Any,
    }
}

/// Every supported family.
pub static FAMILIES: &[FamilySpec] = &[
    http("openrouter", "OpenRouter", &[], Some("https://openrouter.ai/api/v1"), false),
    http("groq", "Groq", &[], Some("https://api.groq.com/openai/v1"), true),
    http("zhipu", "ZhiPu", &["glm"], Some("https://open.bigmodel.cn/api/paas/v4"), false),
    http(
        "gemini",
        "Gemini",
        &["google"],
        Some("https://generativelanguage.googleapis.com/v1beta"),
        false,
    ),
    http("nvidia", "NVIDIA", &[], Some("https://integrate.api.nvidia.com/v1"), true),
    http("ollama", "Ollama", &[], Some("http://localhost:11434/v1"), true),
    http("moonshot", "Moonshot", &[], Some("https://api.moonshot.cn/v1"), true),
    http(
        "shengsuanyun",
        "ShengSuanYun",
        &[],
        Some("https://router.shengsuanyun.com/api/v1"),
        false,
    ),
    http("deepseek", "DeepSeek", &[], Some("https://api.deepseek.com/v1"), false),
    http("cerebras", "Cerebras", &[], Some("https://api.cerebras.ai/v1"), true),
    http(
        "volcengine",
        "VolcEngine",
        &["doubao"],
        Some("https://ark.cn-beijing.volces.com/api/v3"),
        false,
    ),
    http("vllm", "vLLM", &[], None, false),
    http(
        "qwen",
        "Qwen",
        &[],
        Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
        true,
    ),
    FamilySpec {
        name: "openai",
        kind: FamilyKind::OpenAi,
        display_name: "OpenAI",
        protocol_aliases: &[],
        legacy_aliases: &["gpt"],
        default_api_base: Some("https://api.openai.com/v1"),
        strip_wire_prefix: false,
        legacy_key: Some("openai"),
        credential_key: Some("openai"),
        explicit_requirement: Requirement::Any,
    },
    FamilySpec {
        name: "anthropic",
        kind: FamilyKind::Anthropic,
        display_name: "Anthropic",
        protocol_aliases: &[],
        legacy_aliases: &["claude"],
        default_api_base: Some("https://api.anthropic.com/v1"),
        strip_wire_prefix: false,
        legacy_key: Some("anthropic"),
        credential_key: Some("anthropic"),
        explicit_requirement: Requirement::Any,
    },
    FamilySpec {
        name: "antigravity",
        kind: FamilyKind::Antigravity,
        display_name: "Antigravity",
        protocol_aliases: &[],
        legacy_aliases: &["google-antigravity"],
        default_api_base: Some("https://cloudcode-pa.googleapis.com"),
        strip_wire_prefix: false,
        legacy_key: Some("antigravity"),
        credential_key: Some("google-antigravity"),
        explicit_requirement: Requirement::None,
    },
    FamilySpec {
        name: "claude-cli",
        kind: FamilyKind::ClaudeCli,
        display_name: "Claude CLI",
        protocol_aliases: &["claudecli"],
        legacy_aliases: &["claude-code", "claudecode"],
        default_api_base: None,
        strip_wire_prefix: false,
        legacy_key: None,
        credential_key: None,
        explicit_requirement: Requirement::None,
    },
    FamilySpec {
        name: "codex-cli",
        kind: FamilyKind::CodexCli,
        display_name: "Codex CLI",
        protocol_aliases: &["codexcli"],
        legacy_aliases: &["codex-code"],
        default_api_base: None,
        strip_wire_prefix: false,
        legacy_key: None,
        credential_key: None,
        explicit_requirement: Requirement::None,
    },
    FamilySpec {
        name: "github-copilot",
        kind: FamilyKind::GithubCopilot,
        display_name: "GitHub Copilot",
        protocol_aliases: &["copilot"],
        legacy_aliases: &["copilot", "github_copilot"],
        default_api_base: Some("localhost:4321"),
        strip_wire_prefix: false,
        legacy_key: Some("github-copilot"),
        credential_key: None,
        explicit_requirement: Requirement::None,
    },
];

/// Find a family by `model_list` protocol tag.
pub fn find_by_protocol(protocol: &str) -> Option<&'static FamilySpec> {
    FAMILIES
        .iter()
        .find(|f| f.name == protocol || f.protocol_aliases.contains(&protocol))
}

/// Find a family by `agents.defaults.provider` value (case-insensitive,
/// legacy synonyms accepted).
pub fn find_by_legacy_name(name: &str) -> Option<&'static FamilySpec> {
    let name = name.trim().to_lowercase();
    FAMILIES
        .iter()
        .find(|f| f.name == name || f.legacy_aliases.contains(&name.as_str()))
}

/// Find a family by canonical name.
pub fn find_by_name(name: &str) -> Option<&'static FamilySpec> {
    FAMILIES.iter().find(|f| f.name == name)
}

// ─────────────────────────────────────────────
// Legacy model-name heuristics
// ─────────────────────────────────────────────

/// One row of the legacy model-name detection table.
#[derive(Clone, Debug)]
pub struct Heuristic {
    pub family: &'static str,
    /// Lowercase substrings of the model name.
    pub contains: &'static [&'static str],
    /// Case-sensitive prefixes of the model name.
    pub prefixes: &'static [&'static str],
    /// What the family's legacy entry needs for this row to apply.
    pub requires: Requirement,
}

impl Heuristic {
    /// Whether the row matches every model.
    pub fn is_catch_all(&self) -> bool {
        self.contains.is_empty() && self.prefixes.is_empty()
    }

    /// Whether the model name alone matches this row. An empty pattern
    /// set matches every model.
    pub fn matches(&self, model: &str) -> bool {
        if self.is_catch_all() {
            return true;
        }
        let lower = model.to_lowercase();
        self.contains.iter().any(|c| lower.contains(c))
            || self.prefixes.iter().any(|p| model.starts_with(p))
    }
}

/// Ordered detection table; the first populated match wins.
pub static HEURISTICS: &[Heuristic] = &[
    Heuristic {
        family: "moonshot",
        contains: &["kimi", "moonshot"],
        prefixes: &["moonshot/"],
        requires: Requirement::ApiKey,
    },
    Heuristic {
        family: "openrouter",
        contains: &[],
        prefixes: &[
            "openrouter/",
            "anthropic/",
            "openai/",
            "meta-llama/",
            "deepseek/",
            "google/",
        ],
        requires: Requirement::ApiKey,
    },
    Heuristic {
        family: "anthropic",
        contains: &["claude"],
        prefixes: &["anthropic/"],
        requires: Requirement::KeyOrAuth,
    },
    Heuristic {
        family: "openai",
        contains: &["gpt"],
        prefixes: &["openai/"],
        requires: Requirement::KeyOrAuth,
    },
    Heuristic {
        family: "gemini",
        contains: &["gemini"],
        prefixes: &["google/"],
        requires: Requirement::ApiKey,
    },
    Heuristic {
        family: "zhipu",
        contains: &["glm", "zhipu", "zai"],
        prefixes: &[],
        requires: Requirement::ApiKey,
    },
    Heuristic {
        family: "groq",
        contains: &["groq"],
        prefixes: &["groq/"],
        requires: Requirement::ApiKey,
    },
    Heuristic {
        family: "qwen",
        contains: &["qwen"],
        prefixes: &["qwen/"],
        requires: Requirement::ApiKey,
    },
    Heuristic {
        family: "nvidia",
        contains: &["nvidia"],
        prefixes: &["nvidia/"],
        requires: Requirement::ApiKey,
    },
    Heuristic {
        family: "cerebras",
        contains: &["cerebras"],
        prefixes: &["cerebras/"],
        requires: Requirement::ApiKey,
    },
    Heuristic {
        family: "ollama",
        contains: &["ollama"],
        prefixes: &["ollama/"],
        requires: Requirement::ApiKey,
    },
    Heuristic {
        family: "volcengine",
        contains: &["doubao", "volcengine"],
        prefixes: &[],
        requires: Requirement::ApiKey,
    },
    Heuristic {
        family: "vllm",
        contains: &[],
        prefixes: &[],
        requires: Requirement::ApiBase,
    },
];

// ─────────────────────────────────────────────
// Wire quirks
// ─────────────────────────────────────────────

/// Strip a leading `<family>/` segment when that family expects bare ids.
///
/// Only the first segment is considered: `groq/openai/gpt-oss-120b`
/// becomes `openai/gpt-oss-120b`.
pub fn strip_wire_prefix(model: &str) -> &str {
    match model.split_once('/') {
        Some((prefix, rest))
            if find_by_name(prefix).is_some_and(|f| f.strip_wire_prefix) =>
        {
            rest
        }
        _ => model,
    }
}

/// A per-model parameter override.
#[derive(Clone, Debug)]
pub struct ModelOverride {
    /// All of these must appear in the lowercase model name.
    pub patterns: &'static [&'static str],
    pub field: OverrideField,
    pub value: f64,
}

/// Fields that can be overridden per model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverrideField {
    Temperature,
}

/// Known model quirks. Kimi K2 models only accept `temperature = 1`.
pub static MODEL_OVERRIDES: &[ModelOverride] = &[ModelOverride {
    patterns: &["kimi", "k2"],
    field: OverrideField::Temperature,
    value: 1.0,
}];

/// Models that take `max_completion_tokens` instead of `max_tokens`.
pub static MAX_COMPLETION_TOKENS_MODELS: &[&str] = &["glm", "o1"];

/// Apply [`MODEL_OVERRIDES`] to a requested temperature.
pub fn apply_model_overrides(model: &str, temperature: f64) -> f64 {
    let lower = model.to_lowercase();
    MODEL_OVERRIDES
        .iter()
        .filter(|o| o.patterns.iter().all(|p| lower.contains(p)))
        .fold(temperature, |_, o| match o.field {
            OverrideField::Temperature => o.value,
        })
}

pub fn uses_max_completion_tokens(model: &str) -> bool {
    let lower = model.to_lowercase();
    MAX_COMPLETION_TOKENS_MODELS.iter().any(|p| lower.contains(p))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
