//! LLM provider layer for Modelgate.
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`]: the single `chat` contract every adapter implements
//! - [`registry`]: static family, heuristic and quirk tables
//! - [`resolver::resolve`]: picks and builds exactly one adapter for a model
//! - [`http_provider::HttpProvider`]: generic OpenAI-compatible HTTP client
//! - [`claude`], [`codex`], [`antigravity`]: credential-backed adapters
//! - [`cli_bridge`], [`copilot`]: local CLI and sidecar adapters

pub mod antigravity;
pub mod claude;
pub mod cli_bridge;
pub mod codex;
pub mod copilot;
pub mod http_provider;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod token;
pub mod traits;

// Re-export main types for convenience
pub use antigravity::AntigravityProvider;
pub use claude::ClaudeProvider;
pub use cli_bridge::{ClaudeCliProvider, CliBridgeProvider, CliKind, CodexCliProvider};
pub use codex::CodexProvider;
pub use copilot::{ConnectMode, CopilotProvider};
pub use http_provider::HttpProvider;
pub use protocol::extract_protocol;
pub use registry::{FamilyKind, FamilySpec, FAMILIES};
pub use resolver::{
    create_provider_from_model_config, resolve, resolve_default, ResolveContext, ResolvedProvider,
};
pub use token::{AccessToken, CodexCliToken, ManagedToken, StaticToken, TokenSource};
pub use traits::{LlmProvider, LlmRequestConfig};
