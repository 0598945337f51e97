//! Credential lifecycle: look up, classify, refresh on read, persist.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use modelgate_core::config::{AuthConfig, ExpiredCredentialPolicy};
use modelgate_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::credential::{default_window, AuthCredential, CredentialStatus};
use crate::oauth::{AntigravityModel, OAuthClient, OAuthProviderConfig};
use crate::store::CredentialStore;

/// One row of `auth status`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialReport {
    pub provider: String,
    pub credential: AuthCredential,
    pub status: CredentialStatus,
}

/// Front door to stored credentials.
///
/// Reads refresh expiring OAuth tokens transparently; a failed refresh
/// never destroys what is stored.
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    client: OAuthClient,
    dialects: HashMap<String, OAuthProviderConfig>,
    refresh_window: Duration,
    expired_policy: ExpiredCredentialPolicy,
}

impl CredentialManager {
    /// Manager over `store` with the built-in OAuth dialects.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let dialects = ["openai", "anthropic", "google-antigravity"]
            .into_iter()
            .filter_map(OAuthProviderConfig::for_provider)
            .map(|cfg| (cfg.provider.clone(), cfg))
            .collect();
        Self {
            store,
            client: OAuthClient::new(),
            dialects,
            refresh_window: default_window(),
            expired_policy: ExpiredCredentialPolicy::default(),
        }
    }

    /// Manager configured from the `auth` config section.
    pub fn from_config(store: Arc<dyn CredentialStore>, config: &AuthConfig) -> Self {
        let window = i64::try_from(config.refresh_window_secs).unwrap_or(i64::MAX / 1000);
        Self::new(store)
            .with_refresh_window(Duration::seconds(window))
            .with_expired_policy(config.expired_policy)
    }

    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    pub fn with_expired_policy(mut self, policy: ExpiredCredentialPolicy) -> Self {
        self.expired_policy = policy;
        self
    }

    /// Replace (or add) the OAuth dialect for its provider family.
    pub fn with_dialect(mut self, cfg: OAuthProviderConfig) -> Self {
        self.dialects.insert(cfg.provider.clone(), cfg);
        self
    }

    pub fn with_client(mut self, client: OAuthClient) -> Self {
        self.client = client;
        self
    }

    pub fn client(&self) -> &OAuthClient {
        &self.client
    }

    pub fn dialect(&self, provider: &str) -> Option<&OAuthProviderConfig> {
        self.dialects.get(provider)
    }

    pub fn status_of(&self, cred: &AuthCredential, now: DateTime<Utc>) -> CredentialStatus {
        cred.status_at(now, self.refresh_window)
    }

    /// A credential for `provider`, refreshed first when it is close to
    /// expiry and a refresh token is available.
    ///
    /// A failed refresh is logged and the stored credential is returned
    /// unchanged; the caller sees the upstream rejection, if any.
    pub async fn get_usable_credential(&self, provider: &str) -> Result<AuthCredential> {
        let cred = self.store.get(provider)?.ok_or_else(|| {
            Error::not_logged_in(provider, format!("no credentials for {provider}"))
        })?;

        let status = self.status_of(&cred, Utc::now());
        if status == CredentialStatus::Active {
            return Ok(cred);
        }

        if cred.has_refresh_token() {
            if let Some(dialect) = self.dialects.get(provider) {
                return Ok(self.refresh(provider, cred, dialect).await);
            }
            debug!(provider, "no OAuth dialect for provider, skipping refresh");
        }

        if status == CredentialStatus::Expired {
            return match self.expired_policy {
                ExpiredCredentialPolicy::Allow => Ok(cred),
                ExpiredCredentialPolicy::Warn => {
                    warn!(provider, "credential expired and cannot be refreshed");
                    Ok(cred)
                }
                ExpiredCredentialPolicy::Reject => Err(Error::not_logged_in(
                    provider,
                    format!("credentials for {provider} expired"),
                )),
            };
        }
        Ok(cred)
    }

    async fn refresh(
        &self,
        provider: &str,
        cred: AuthCredential,
        dialect: &OAuthProviderConfig,
    ) -> AuthCredential {
        match self.client.refresh_access_token(&cred, dialect).await {
            Ok(refreshed) => {
                info!(provider, "refreshed access token");
                if let Err(e) = self.store.set(provider, refreshed.clone()) {
                    warn!(provider, error = %e, "failed to persist refreshed credential");
                }
                refreshed
            }
            Err(e) => {
                warn!(provider, error = %e, "token refresh failed, using stored credential");
                cred
            }
        }
    }

    /// Models available to the stored Google Antigravity account, refreshing
    /// its token first when needed.
    pub async fn antigravity_models(&self) -> Result<Vec<AntigravityModel>> {
        let cred = self.get_usable_credential("google-antigravity").await?;
        self.client.fetch_available_models(&cred).await
    }

    pub fn get_credential(&self, provider: &str) -> Result<Option<AuthCredential>> {
        self.store.get(provider)
    }

    pub fn set_credential(&self, provider: &str, credential: AuthCredential) -> Result<()> {
        self.store.set(provider, credential)
    }

    pub fn delete_credential(&self, provider: &str) -> Result<()> {
        self.store.delete(provider)
    }

    pub fn delete_all_credentials(&self) -> Result<()> {
        self.store.delete_all()
    }

    /// Every stored credential with its status, sorted by family.
    pub fn list_credentials_with_status(&self) -> Result<Vec<CredentialReport>> {
        let now = Utc::now();
        let mut reports: Vec<CredentialReport> = self
            .store
            .load()?
            .into_iter()
            .map(|(provider, credential)| CredentialReport {
                status: self.status_of(&credential, now),
                provider,
                credential,
            })
            .collect();
        reports.sort_by(|a, b| a.provider.cmp(&b.provider));
        Ok(reports)
    }
}
