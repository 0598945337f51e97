//! Legacy `providers` → `model_list` conversion.
//!
//! Each populated legacy entry becomes one route named after the family,
//! pointing at a representative model for that family.

use super::schema::{Config, ModelConfig, ProviderConfig};

/// `(family, default qualified model)` in conversion order.
const LEGACY_ROUTES: &[(&str, &str)] = &[
    ("openai", "openai/gpt-4o"),
    ("anthropic", "anthropic/claude-3-sonnet"),
    ("openrouter", "openrouter/auto"),
    ("groq", "groq/llama-3.1-70b-versatile"),
    ("zhipu", "openai/glm-4"),
    ("vllm", "openai/auto"),
    ("gemini", "openai/gemini-pro"),
    ("nvidia", "nvidia/meta/llama-3.1-8b-instruct"),
    ("ollama", "ollama/llama3"),
    ("moonshot", "moonshot/kimi"),
    ("shengsuanyun", "openai/auto"),
    ("deepseek", "openai/deepseek-chat"),
    ("cerebras", "cerebras/llama-3.3-70b"),
    ("volcengine", "openai/doubao-pro"),
    ("github-copilot", "github-copilot/gpt-4o"),
    ("antigravity", "antigravity/gemini-2.0-flash"),
    ("qwen", "qwen/qwen-max"),
];

/// Convert the legacy per-family section into route-table entries.
pub fn convert_providers_to_model_list(config: &Config) -> Vec<ModelConfig> {
    LEGACY_ROUTES
        .iter()
        .filter_map(|(family, model)| {
            let p = config.providers.get_by_name(family)?;
            if !is_populated(family, p) {
                return None;
            }
            Some(route_for(family, model, p))
        })
        .collect()
}

/// Which fields make a legacy entry worth converting.
fn is_populated(family: &str, p: &ProviderConfig) -> bool {
    match family {
        "github-copilot" => {
            !p.api_key.is_empty() || !p.api_base.is_empty() || !p.connect_mode.is_empty()
        }
        "antigravity" => !p.api_key.is_empty() || !p.auth_method.is_empty(),
        _ => !p.api_key.is_empty() || !p.api_base.is_empty(),
    }
}

fn route_for(family: &str, model: &str, p: &ProviderConfig) -> ModelConfig {
    let mut route = ModelConfig {
        model_name: family.to_string(),
        model: model.to_string(),
        ..Default::default()
    };
    match family {
        "github-copilot" => {
            route.api_base = p.api_base.clone();
            route.connect_mode = p.connect_mode.clone();
        }
        "antigravity" => {
            route.api_key = p.api_key.clone();
            route.auth_method = p.auth_method.clone();
        }
        _ => {
            route.api_key = p.api_key.clone();
            route.api_base = p.api_base.clone();
            route.proxy = p.proxy.clone();
            if family == "openai" || family == "anthropic" {
                route.auth_method = p.auth_method.clone();
            }
        }
    }
    route
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_openai() {
        let mut config = Config::default();
        config.providers.openai = ProviderConfig {
            api_key: "sk-test-key".into(),
            api_base: "https://custom.api.com/v1".into(),
            ..Default::default()
        };

        let result = convert_providers_to_model_list(&config);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].model_name, "openai");
        assert_eq!(result[0].model, "openai/gpt-4o");
        assert_eq!(result[0].api_key, "sk-test-key");
        assert_eq!(result[0].api_base, "https://custom.api.com/v1");
    }

    #[test]
    fn test_convert_multiple_keeps_order() {
        let mut config = Config::default();
        config.providers.zhipu.api_key = "zhipu-key".into();
        config.providers.openai.api_key = "openai-key".into();
        config.providers.groq.api_key = "groq-key".into();

        let names: Vec<String> = convert_providers_to_model_list(&config)
            .into_iter()
            .map(|m| m.model_name)
            .collect();

        assert_eq!(names, vec!["openai", "groq", "zhipu"]);
    }

    #[test]
    fn test_convert_copilot_by_connect_mode() {
        let mut config = Config::default();
        config.providers.github_copilot.connect_mode = "http".into();

        let result = convert_providers_to_model_list(&config);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].model, "github-copilot/gpt-4o");
        assert_eq!(result[0].connect_mode, "http");
    }

    #[test]
    fn test_convert_antigravity_by_auth_method() {
        let mut config = Config::default();
        config.providers.antigravity.auth_method = "oauth".into();

        let result = convert_providers_to_model_list(&config);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].auth_method, "oauth");
    }

    #[test]
    fn test_convert_auth_method_alone_is_not_enough_for_http_family() {
        let mut config = Config::default();
        config.providers.anthropic.auth_method = "oauth".into();
        assert!(convert_providers_to_model_list(&config).is_empty());
    }

    #[test]
    fn test_convert_empty() {
        assert!(convert_providers_to_model_list(&Config::default()).is_empty());
    }
}
