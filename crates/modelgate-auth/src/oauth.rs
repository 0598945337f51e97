//! OAuth dialects and the HTTP exchanges behind them.
//!
//! Every endpoint is a plain field on [`OAuthProviderConfig`] so embedders
//! (and tests) can point a dialect somewhere else.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use modelgate_core::{Error, Result};
use rand::RngCore;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::credential::AuthCredential;

/// Timeout for every OAuth / enrichment request.
pub const OAUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloud Code endpoint used for project discovery.
pub const CLOUD_CODE_BASE_URL: &str = "https://cloudcode-pa.googleapis.com";

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

// ─────────────────────────────────────────────
// Dialects
// ─────────────────────────────────────────────

/// Endpoints and client identity for one provider's OAuth server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthProviderConfig {
    /// Credential family this dialect issues tokens for.
    pub provider: String,
    pub client_id: String,
    /// Empty for public (PKCE-only) clients.
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub device_code_url: Option<String>,
    pub userinfo_url: Option<String>,
    pub scopes: String,
    /// Port of the local redirect listener for browser logins.
    pub redirect_port: u16,
    pub extra_authorize_params: Vec<(String, String)>,
}

impl OAuthProviderConfig {
    pub fn openai() -> Self {
        Self {
            provider: "openai".into(),
            client_id: "app_EMoamEEZ73f0CkXaXp7hrann".into(),
            client_secret: String::new(),
            authorize_url: "https://auth.openai.com/oauth/authorize".into(),
            token_url: "https://auth.openai.com/oauth/token".into(),
            device_code_url: Some("https://auth.openai.com/oauth/device/code".into()),
            userinfo_url: None,
            scopes: "openid profile email offline_access".into(),
            redirect_port: 1455,
            extra_authorize_params: vec![
                ("id_token_add_organizations".into(), "true".into()),
                ("codex_cli_simplified_flow".into(), "true".into()),
            ],
        }
    }

    pub fn anthropic() -> Self {
        Self {
            provider: "anthropic".into(),
            client_id: "9d1c250a-e61b-44d9-88ed-5944d1962f5e".into(),
            client_secret: String::new(),
            authorize_url: "https://claude.ai/oauth/authorize".into(),
            token_url: "https://console.anthropic.com/v1/oauth/token".into(),
            device_code_url: None,
            userinfo_url: None,
            scopes: "org:create_api_key user:profile user:inference".into(),
            redirect_port: 54545,
            extra_authorize_params: Vec::new(),
        }
    }

    /// Google dialect used by the Antigravity Cloud Code backend.
    ///
    /// Client id and secret come from `MODELGATE_GOOGLE_CLIENT_ID` /
    /// `MODELGATE_GOOGLE_CLIENT_SECRET`.
    pub fn google_antigravity() -> Self {
        Self {
            provider: "google-antigravity".into(),
            client_id: std::env::var("MODELGATE_GOOGLE_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("MODELGATE_GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            device_code_url: None,
            userinfo_url: Some("https://www.googleapis.com/oauth2/v2/userinfo".into()),
            scopes: [
                "https://www.googleapis.com/auth/cloud-platform",
                "https://www.googleapis.com/auth/userinfo.email",
                "https://www.googleapis.com/auth/userinfo.profile",
            ]
            .join(" "),
            redirect_port: 51121,
            extra_authorize_params: vec![
                ("access_type".into(), "offline".into()),
                ("prompt".into(), "consent".into()),
            ],
        }
    }

    /// Built-in dialect for a credential family, if there is one.
    pub fn for_provider(provider: &str) -> Option<Self> {
        match provider {
            "openai" => Some(Self::openai()),
            "anthropic" => Some(Self::anthropic()),
            "google-antigravity" => Some(Self::google_antigravity()),
            _ => None,
        }
    }

    /// `http://localhost:<port>/auth/callback`
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/auth/callback", self.redirect_port)
    }
}

// ─────────────────────────────────────────────
// PKCE
// ─────────────────────────────────────────────

/// PKCE verifier and its S256 challenge.
#[derive(Clone, Debug)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        let verifier = random_urlsafe(32);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self { verifier, challenge }
    }
}

/// Random anti-CSRF `state` value.
pub fn generate_state() -> String {
    random_urlsafe(16)
}

fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Authorization URL for a browser login.
pub fn build_authorize_url(
    cfg: &OAuthProviderConfig,
    pkce: &PkceChallenge,
    state: &str,
    redirect_uri: &str,
) -> Result<String> {
    let mut params: Vec<(&str, &str)> = vec![
        ("response_type", "code"),
        ("client_id", cfg.client_id.as_str()),
        ("redirect_uri", redirect_uri),
        ("scope", cfg.scopes.as_str()),
        ("code_challenge", pkce.challenge.as_str()),
        ("code_challenge_method", "S256"),
        ("state", state),
    ];
    params.extend(
        cfg.extra_authorize_params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str())),
    );
    let url = url::Url::parse_with_params(&cfg.authorize_url, &params)
        .map_err(|e| Error::config(format!("invalid authorize url {}: {e}", cfg.authorize_url)))?;
    Ok(url.into())
}

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// RFC 8628 device authorization response.
#[derive(Clone, Debug, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    #[serde(default = "default_device_expiry")]
    pub expires_in: u64,
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
}

fn default_device_expiry() -> u64 {
    900
}

fn default_poll_interval() -> u64 {
    5
}

/// Build a credential from a token endpoint response.
pub fn credential_from_token_response(
    provider: &str,
    resp: TokenResponse,
    auth_method: &str,
) -> AuthCredential {
    let account_id = if provider == "openai" {
        resp.id_token
            .as_deref()
            .and_then(extract_account_id)
            .or_else(|| extract_account_id(&resp.access_token))
    } else {
        None
    };
    AuthCredential {
        provider: provider.to_string(),
        access_token: resp.access_token,
        refresh_token: resp.refresh_token.filter(|t| !t.is_empty()),
        expires_at: resp
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        account_id,
        email: None,
        project_id: None,
        auth_method: auth_method.to_string(),
    }
}

/// ChatGPT account id from an OpenAI JWT's auth claim.
pub fn extract_account_id(jwt: &str) -> Option<String> {
    let payload = jwt.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims
        .get("https://api.openai.com/auth")
        .and_then(|auth| auth.get("chatgpt_account_id"))
        .or_else(|| claims.get("chatgpt_account_id"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ─────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────

/// HTTP client for token, device-code and enrichment endpoints.
#[derive(Clone, Debug)]
pub struct OAuthClient {
    client: reqwest::Client,
    cloud_code_base: String,
}

impl Default for OAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(OAUTH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            cloud_code_base: CLOUD_CODE_BASE_URL.to_string(),
        }
    }

    /// Point project discovery at another Cloud Code base URL.
    pub fn with_cloud_code_base(mut self, base: impl Into<String>) -> Self {
        self.cloud_code_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The returned credential keeps the old refresh token when the server
    /// omits a new one, and carries over account, email and project.
    pub async fn refresh_access_token(
        &self,
        cred: &AuthCredential,
        cfg: &OAuthProviderConfig,
    ) -> Result<AuthCredential> {
        let refresh_token = cred
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::not_logged_in(&cred.provider, "no refresh token available"))?;

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", cfg.client_id.as_str()),
        ];
        if !cfg.client_secret.is_empty() {
            form.push(("client_secret", cfg.client_secret.as_str()));
        }

        debug!(provider = %cred.provider, "refreshing access token");
        let resp = self.post_token_form(&cfg.token_url, &form).await?;
        let mut refreshed = credential_from_token_response(&cred.provider, resp, &cred.auth_method);

        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = cred.refresh_token.clone();
        }
        if refreshed.account_id.is_none() {
            refreshed.account_id = cred.account_id.clone();
        }
        refreshed.email = cred.email.clone();
        refreshed.project_id = cred.project_id.clone();
        Ok(refreshed)
    }

    /// Exchange an authorization code from a browser login.
    pub async fn exchange_code(
        &self,
        cfg: &OAuthProviderConfig,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<AuthCredential> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", cfg.client_id.as_str()),
            ("code_verifier", verifier),
        ];
        if !cfg.client_secret.is_empty() {
            form.push(("client_secret", cfg.client_secret.as_str()));
        }
        let resp = self.post_token_form(&cfg.token_url, &form).await?;
        Ok(credential_from_token_response(&cfg.provider, resp, "oauth"))
    }

    /// Start a device-code login.
    pub async fn request_device_code(&self, cfg: &OAuthProviderConfig) -> Result<DeviceCodeResponse> {
        let url = cfg.device_code_url.as_deref().ok_or_else(|| {
            Error::config(format!("{} does not support device-code login", cfg.provider))
        })?;
        let resp = self
            .client
            .post(url)
            .form(&[("client_id", cfg.client_id.as_str()), ("scope", cfg.scopes.as_str())])
            .send()
            .await
            .map_err(network)?;
        let status = resp.status();
        let body = resp.text().await.map_err(network)?;
        if !status.is_success() {
            return Err(Error::Transport {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Poll the token endpoint until the user approves the device code.
    ///
    /// Honours `authorization_pending`, `slow_down` and the code's expiry.
    pub async fn poll_device_code(
        &self,
        cfg: &OAuthProviderConfig,
        device: &DeviceCodeResponse,
    ) -> Result<AuthCredential> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(device.expires_in);
        let mut interval = Duration::from_secs(device.interval);

        loop {
            let resp = self
                .client
                .post(&cfg.token_url)
                .form(&[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("device_code", device.device_code.as_str()),
                    ("client_id", cfg.client_id.as_str()),
                ])
                .send()
                .await
                .map_err(network)?;
            let status = resp.status();
            let body = resp.text().await.map_err(network)?;

            if status.is_success() {
                let token: TokenResponse = serde_json::from_str(&body)?;
                return Ok(credential_from_token_response(&cfg.provider, token, "oauth"));
            }

            match serde_json::from_str::<OAuthErrorBody>(&body) {
                Ok(err) if err.error == "authorization_pending" => {}
                Ok(err) if err.error == "slow_down" => interval += Duration::from_secs(5),
                Ok(err) => {
                    let detail = err.error_description.unwrap_or_default();
                    return Err(Error::not_logged_in(
                        &cfg.provider,
                        format!("device login failed: {} {detail}", err.error).trim_end(),
                    ));
                }
                Err(_) => {
                    return Err(Error::Transport {
                        status: status.as_u16(),
                        body,
                    })
                }
            }

            if tokio::time::Instant::now() + interval >= deadline {
                return Err(Error::not_logged_in(&cfg.provider, "device code expired"));
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Email address of the account behind `access_token`.
    pub async fn fetch_user_email(
        &self,
        cfg: &OAuthProviderConfig,
        access_token: &str,
    ) -> Result<String> {
        let url = cfg
            .userinfo_url
            .as_deref()
            .ok_or_else(|| Error::config(format!("{} has no userinfo endpoint", cfg.provider)))?;
        let body = self.send_json(self.client.get(url).bearer_auth(access_token)).await?;
        body.get("email")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::Decode("userinfo response has no email".into()))
    }

    /// Cloud Code project bound to the account, via `loadCodeAssist`.
    pub async fn fetch_project_id(&self, access_token: &str) -> Result<String> {
        let url = format!("{}/v1internal:loadCodeAssist", self.cloud_code_base);
        let request = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "metadata": { "ideType": "ANTIGRAVITY" } }));
        let body = self.send_json(request).await?;

        let project = match body.get("cloudaicompanionProject") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(obj @ Value::Object(_)) => obj.get("id").and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        project
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Decode("loadCodeAssist returned no project".into()))
    }

    /// Models the Cloud Code project behind `credential` can call, sorted by id.
    ///
    /// A model whose quota has no remaining fraction is reported as exhausted.
    pub async fn fetch_available_models(
        &self,
        credential: &AuthCredential,
    ) -> Result<Vec<AntigravityModel>> {
        let project = credential
            .project_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                Error::not_logged_in(
                    &credential.provider,
                    "no Cloud Code project stored for this credential",
                )
            })?;
        let url = format!("{}/v1internal:fetchAvailableModels", self.cloud_code_base);
        let request = self
            .client
            .post(&url)
            .bearer_auth(&credential.access_token)
            .json(&serde_json::json!({ "project": project }));
        let body: AvailableModelsResponse = serde_json::from_value(self.send_json(request).await?)?;

        let mut models: Vec<AntigravityModel> = body
            .models
            .into_iter()
            .map(|(id, info)| AntigravityModel {
                quota_exhausted: info
                    .quota_info
                    .and_then(|q| q.remaining_fraction)
                    .is_some_and(|f| f <= 0.0),
                display_name: info.display_name.unwrap_or_default(),
                id,
            })
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(project, count = models.len(), "fetched available models");
        Ok(models)
    }

    async fn post_token_form(&self, url: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let body = self.send_json(self.client.post(url).form(form)).await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let resp = request.send().await.map_err(network)?;
        let status = resp.status();
        let body = resp.text().await.map_err(network)?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "OAuth endpoint returned an error");
            return Err(Error::Transport {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

/// One entry of the Cloud Code model catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct AntigravityModel {
    pub id: String,
    pub display_name: String,
    pub quota_exhausted: bool,
}

#[derive(Deserialize)]
struct AvailableModelsResponse {
    #[serde(default)]
    models: std::collections::HashMap<String, AvailableModelInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailableModelInfo {
    display_name: Option<String>,
    quota_info: Option<QuotaInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotaInfo {
    remaining_fraction: Option<f64>,
}

fn network(e: reqwest::Error) -> Error {
    Error::Network(e.to_string())
}
