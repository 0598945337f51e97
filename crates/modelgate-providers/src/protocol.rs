//! `protocol/model-id` parsing.

/// Protocol assumed when a model string carries no prefix.
pub const DEFAULT_PROTOCOL: &str = "openai";

/// Split a model string into `(protocol, model_id)` at the first `/`.
///
/// Surrounding whitespace is trimmed first. Without a `/` the protocol is
/// [`DEFAULT_PROTOCOL`] and the whole trimmed string is the model id.
///
/// ```
/// use modelgate_providers::protocol::extract_protocol;
///
/// assert_eq!(extract_protocol("groq/openai/gpt-oss-120b"), ("groq", "openai/gpt-oss-120b"));
/// assert_eq!(extract_protocol("  gpt-4o "), ("openai", "gpt-4o"));
/// ```
pub fn extract_protocol(model: &str) -> (&str, &str) {
    let model = model.trim();
    match model.split_once('/') {
        Some((protocol, model_id)) => (protocol, model_id),
        None => (DEFAULT_PROTOCOL, model),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_at_first_separator() {
        assert_eq!(extract_protocol("openai/gpt-4o"), ("openai", "gpt-4o"));
        assert_eq!(extract_protocol("anthropic/claude-3-sonnet"), ("anthropic", "claude-3-sonnet"));
        assert_eq!(
            extract_protocol("nvidia/meta/llama-3.1-8b-instruct"),
            ("nvidia", "meta/llama-3.1-8b-instruct")
        );
    }

    #[test]
    fn test_no_separator_defaults_to_openai() {
        assert_eq!(extract_protocol("gpt-4o"), ("openai", "gpt-4o"));
        assert_eq!(extract_protocol("\tglm-4.7\n"), ("openai", "glm-4.7"));
        assert_eq!(extract_protocol(""), ("openai", ""));
    }

    #[test]
    fn test_edge_separators() {
        assert_eq!(extract_protocol("/gpt-4o"), ("", "gpt-4o"));
        assert_eq!(extract_protocol("ollama/"), ("ollama", ""));
        assert_eq!(extract_protocol(" moonshot/kimi-k2.5 "), ("moonshot", "kimi-k2.5"));
    }

    #[test]
    fn test_property_over_many_inputs() {
        let samples = [
            "a/b", "a/b/c", "x", "  y  ", "qwen/qwen-max", "ollama/qwen2.5:14b", "/", "a//b",
        ];
        for s in samples {
            let trimmed = s.trim();
            let (protocol, model_id) = extract_protocol(s);
            match trimmed.find('/') {
                Some(i) => {
                    assert_eq!(protocol, &trimmed[..i]);
                    assert_eq!(model_id, &trimmed[i + 1..]);
                }
                None => {
                    assert_eq!(protocol, DEFAULT_PROTOCOL);
                    assert_eq!(model_id, trimmed);
                }
            }
        }
    }
}
