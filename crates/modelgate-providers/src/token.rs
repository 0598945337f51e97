//! Where credential-backed adapters get their bearer token for each call.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use modelgate_auth::{AuthCredential, CredentialManager};
use modelgate_core::{Error, Result};
use serde::Deserialize;

/// A bearer token plus the identity fields some backends need alongside it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub account_id: Option<String>,
    pub project_id: Option<String>,
}

impl From<AuthCredential> for AccessToken {
    fn from(cred: AuthCredential) -> Self {
        Self {
            token: cred.access_token,
            account_id: cred.account_id,
            project_id: cred.project_id,
        }
    }
}

/// Yields a token each time an adapter is about to call its backend.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<AccessToken>;
}

/// A fixed token, e.g. an API key pasted into the route table.
pub struct StaticToken(pub AccessToken);

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<AccessToken> {
        Ok(self.0.clone())
    }
}

/// Reads through the credential manager, so expiring tokens are refreshed.
pub struct ManagedToken {
    manager: Arc<CredentialManager>,
    provider: String,
}

impl ManagedToken {
    pub fn new(manager: Arc<CredentialManager>, provider: impl Into<String>) -> Self {
        Self {
            manager,
            provider: provider.into(),
        }
    }
}

#[async_trait]
impl TokenSource for ManagedToken {
    async fn token(&self) -> Result<AccessToken> {
        Ok(self.manager.get_usable_credential(&self.provider).await?.into())
    }
}

// ─────────────────────────────────────────────
// Codex CLI auth file
// ─────────────────────────────────────────────

#[derive(Deserialize)]
struct CodexAuthFile {
    #[serde(default)]
    tokens: Option<CodexTokens>,
}

#[derive(Deserialize)]
struct CodexTokens {
    access_token: String,
    #[serde(default)]
    account_id: Option<String>,
}

/// Token stored by the Codex CLI's own login, re-read on every call.
pub struct CodexCliToken {
    path: PathBuf,
}

impl CodexCliToken {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$CODEX_HOME/auth.json`, else `~/.codex/auth.json`.
    pub fn default_path() -> PathBuf {
        match std::env::var_os("CODEX_HOME") {
            Some(home) if !home.is_empty() => PathBuf::from(home).join("auth.json"),
            _ => dirs_next::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".codex")
                .join("auth.json"),
        }
    }
}

impl Default for CodexCliToken {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

#[async_trait]
impl TokenSource for CodexCliToken {
    async fn token(&self) -> Result<AccessToken> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Authentication {
                message: format!("cannot read Codex CLI credentials at {}: {e}", self.path.display()),
                hint: "codex login".into(),
            }
        })?;
        let file: CodexAuthFile = serde_json::from_str(&text)?;
        let tokens = file
            .tokens
            .filter(|t| !t.access_token.is_empty())
            .ok_or_else(|| Error::Authentication {
                message: "Codex CLI credentials contain no access token".into(),
                hint: "codex login".into(),
            })?;
        Ok(AccessToken {
            token: tokens.access_token,
            account_id: tokens.account_id,
            project_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_auth::MemoryCredentialStore;

    #[tokio::test]
    async fn test_static_token() {
        let src = StaticToken(AccessToken {
            token: "t".into(),
            ..Default::default()
        });
        assert_eq!(src.token().await.unwrap().token, "t");
    }

    #[tokio::test]
    async fn test_managed_token_reads_store() {
        let manager = Arc::new(CredentialManager::new(Arc::new(MemoryCredentialStore::new())));
        let mut cred = AuthCredential::token("openai", "at");
        cred.account_id = Some("acct".into());
        manager.set_credential("openai", cred).unwrap();

        let token = ManagedToken::new(manager, "openai").token().await.unwrap();
        assert_eq!(token.token, "at");
        assert_eq!(token.account_id.as_deref(), Some("acct"));
    }

    #[tokio::test]
    async fn test_managed_token_refreshes_expiring_credential() -> anyhow::Result<()> {
        use modelgate_auth::OAuthProviderConfig;
        use wiremock::matchers::{body_string_contains, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/oauth/token"))
            .and(body_string_contains("refresh_token=rt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dialect = OAuthProviderConfig {
            token_url: format!("{}/v1/oauth/token", server.uri()),
            ..OAuthProviderConfig::anthropic()
        };
        let manager = Arc::new(
            CredentialManager::new(Arc::new(MemoryCredentialStore::new())).with_dialect(dialect),
        );
        manager.set_credential(
            "anthropic",
            AuthCredential {
                provider: "anthropic".into(),
                access_token: "stale".into(),
                refresh_token: Some("rt-1".into()),
                expires_at: Some(chrono::Utc::now() + chrono::Duration::seconds(60)),
                auth_method: "oauth".into(),
                ..Default::default()
            },
        )?;

        let token = ManagedToken::new(manager.clone(), "anthropic").token().await?;
        assert_eq!(token.token, "fresh");

        let stored = manager.get_credential("anthropic")?.expect("stored credential");
        assert_eq!(stored.refresh_token.as_deref(), Some("rt-1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_managed_token_missing_is_authentication_error() {
        let manager = Arc::new(CredentialManager::new(Arc::new(MemoryCredentialStore::new())));
        let err = ManagedToken::new(manager, "anthropic").token().await.unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn test_codex_cli_token_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("auth.json");
        std::fs::write(
            &path,
            r#"{"OPENAI_API_KEY":null,"tokens":{"access_token":"cx","account_id":"a1","refresh_token":"r"}}"#,
        )
        .unwrap();

        let token = CodexCliToken::new(&path).token().await.unwrap();
        assert_eq!(token.token, "cx");
        assert_eq!(token.account_id.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_codex_cli_token_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = CodexCliToken::new(tmp.path().join("nope.json"))
            .token()
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert!(err.to_string().contains("codex login"));
    }
}
