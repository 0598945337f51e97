//! Configuration schema consumed by provider resolution.
//!
//! Loading and saving the file is the caller's job; this crate only defines
//! the shape and the legacy-migration helper.
//!
//! # Usage
//! ```
//! use modelgate_core::config::Config;
//!
//! let cfg: Config = serde_json::from_str(r#"{"agents":{"defaults":{"model":"gpt-4o"}}}"#).unwrap();
//! assert_eq!(cfg.agents.defaults.model, "gpt-4o");
//! ```

pub mod migration;
pub mod schema;

// Re-export key types
pub use migration::convert_providers_to_model_list;
pub use schema::{
    AgentDefaults, AuthConfig, Config, ExpiredCredentialPolicy, ModelConfig, ProviderConfig,
    ProvidersConfig,
};
