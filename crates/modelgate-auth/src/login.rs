//! Interactive login flows. Each produces a fresh [`AuthCredential`];
//! persisting it is the caller's job (usually via the manager).

use std::io::BufRead;

use modelgate_core::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::credential::AuthCredential;
use crate::oauth::{
    build_authorize_url, generate_state, DeviceCodeResponse, OAuthClient, OAuthProviderConfig,
    PkceChallenge,
};

const CALLBACK_PAGE: &str = "<!DOCTYPE html><html><body>\
<h2>Login complete</h2><p>You can close this window and return to the terminal.</p>\
</body></html>";

// ─────────────────────────────────────────────
// Paste token
// ─────────────────────────────────────────────

/// Read one line from `reader` and store it as a non-expiring token.
pub fn login_paste_token<R: BufRead>(provider: &str, mut reader: R) -> Result<AuthCredential> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .map_err(|e| Error::config(format!("could not read token for {provider}: {e}")))?;
    let token = line.trim();
    if token.is_empty() {
        return Err(Error::not_logged_in(provider, "no token provided"));
    }
    Ok(AuthCredential::token(provider, token))
}

// ─────────────────────────────────────────────
// Device code
// ─────────────────────────────────────────────

/// Device-code login. `prompt` is shown the user code and verification URL
/// before polling starts.
pub async fn login_device_code(
    client: &OAuthClient,
    cfg: &OAuthProviderConfig,
    prompt: impl FnOnce(&DeviceCodeResponse),
) -> Result<AuthCredential> {
    let device = client.request_device_code(cfg).await?;
    prompt(&device);
    let cred = client.poll_device_code(cfg, &device).await?;
    Ok(enrich_credential(client, cfg, cred).await)
}

// ─────────────────────────────────────────────
// Browser (authorization code + PKCE)
// ─────────────────────────────────────────────

/// One in-flight browser login: the URL to open plus the secrets needed to
/// finish it.
#[derive(Clone, Debug)]
pub struct BrowserLogin {
    cfg: OAuthProviderConfig,
    pkce: PkceChallenge,
    state: String,
    redirect_uri: String,
    /// Authorization URL to open in the user's browser.
    pub url: String,
}

impl BrowserLogin {
    pub fn start(cfg: OAuthProviderConfig) -> Result<Self> {
        let pkce = PkceChallenge::generate();
        let state = generate_state();
        let redirect_uri = cfg.redirect_uri();
        let url = build_authorize_url(&cfg, &pkce, &state, &redirect_uri)?;
        Ok(Self {
            cfg,
            pkce,
            state,
            redirect_uri,
            url,
        })
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// Extract the authorization code from a redirect.
    ///
    /// Accepts a full callback URL, a bare query string, or (for manual
    /// copy-paste) the code itself.
    pub fn parse_callback(&self, input: &str) -> Result<String> {
        let input = input.trim();
        let query = match input.split_once('?') {
            Some((_, q)) => q,
            None if input.contains("code=") => input,
            None if !input.is_empty() => return Ok(input.to_string()),
            None => return Err(Error::not_logged_in(&self.cfg.provider, "empty callback")),
        };

        let mut code = None;
        let mut state = None;
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            match k.as_ref() {
                "code" => code = Some(v.into_owned()),
                "state" => state = Some(v.into_owned()),
                "error" => {
                    return Err(Error::not_logged_in(
                        &self.cfg.provider,
                        format!("authorization failed: {v}"),
                    ))
                }
                _ => {}
            }
        }
        if state.as_deref() != Some(self.state.as_str()) {
            return Err(Error::not_logged_in(&self.cfg.provider, "state mismatch in callback"));
        }
        code.filter(|c| !c.is_empty())
            .ok_or_else(|| Error::not_logged_in(&self.cfg.provider, "callback carried no code"))
    }

    /// Bind the local redirect listener on the dialect's port.
    pub async fn bind_callback_listener(&self) -> Result<TcpListener> {
        TcpListener::bind(("127.0.0.1", self.cfg.redirect_port))
            .await
            .map_err(|e| {
                Error::config(format!(
                    "cannot listen for the OAuth callback on port {}: {e}",
                    self.cfg.redirect_port
                ))
            })
    }

    /// Wait on `listener` for the redirect and return its code.
    ///
    /// Requests that carry neither `code` nor `error` (favicon, preflight)
    /// get a 404 and the wait continues.
    pub async fn accept_callback(&self, listener: &TcpListener) -> Result<String> {
        loop {
            let (mut stream, _) = listener.accept().await.map_err(callback_io)?;
            let mut buf = vec![0u8; 8192];
            let n = match stream.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "failed to read OAuth callback request");
                    continue;
                }
            };
            let request = String::from_utf8_lossy(&buf[..n]);
            let target = request
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().nth(1))
                .unwrap_or_default()
                .to_string();

            if !is_redirect(&target) {
                debug!(target = %target, "ignoring non-callback request");
                respond(&mut stream, "404 Not Found", "").await;
                continue;
            }
            respond(&mut stream, "200 OK", CALLBACK_PAGE).await;
            return self.parse_callback(&target);
        }
    }

    /// Exchange `code` and enrich the resulting credential.
    pub async fn finish(&self, client: &OAuthClient, code: &str) -> Result<AuthCredential> {
        let cred = client
            .exchange_code(&self.cfg, code, &self.pkce.verifier, &self.redirect_uri)
            .await?;
        info!(provider = %self.cfg.provider, "browser login complete");
        Ok(enrich_credential(client, &self.cfg, cred).await)
    }
}

/// Whether a request target is the OAuth redirect rather than a stray fetch.
fn is_redirect(target: &str) -> bool {
    let Some((_, query)) = target.split_once('?') else {
        return false;
    };
    url::form_urlencoded::parse(query.as_bytes()).any(|(k, _)| k == "code" || k == "error")
}

async fn respond(stream: &mut tokio::net::TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!(error = %e, "failed to answer OAuth callback");
    }
}

fn callback_io(e: std::io::Error) -> Error {
    Error::Network(format!("OAuth callback listener failed: {e}"))
}

// ─────────────────────────────────────────────
// Enrichment
// ─────────────────────────────────────────────

/// Best-effort email and project lookup; failures only warn.
pub async fn enrich_credential(
    client: &OAuthClient,
    cfg: &OAuthProviderConfig,
    mut cred: AuthCredential,
) -> AuthCredential {
    if cfg.userinfo_url.is_some() && cred.email.is_none() {
        match client.fetch_user_email(cfg, &cred.access_token).await {
            Ok(email) => cred.email = Some(email),
            Err(e) => warn!(provider = %cfg.provider, error = %e, "could not fetch account email"),
        }
    }
    if cfg.provider == "google-antigravity" && cred.project_id.is_none() {
        match client.fetch_project_id(&cred.access_token).await {
            Ok(project) => cred.project_id = Some(project),
            Err(e) => warn!(provider = %cfg.provider, error = %e, "could not fetch Cloud Code project"),
        }
    }
    cred
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_paste_token_trims() {
        let cred = login_paste_token("anthropic", "  sk-ant-abc \n".as_bytes()).unwrap();
        assert_eq!(cred.access_token, "sk-ant-abc");
        assert_eq!(cred.auth_method, "token");
        assert!(cred.expires_at.is_none());
    }

    #[test]
    fn test_paste_token_empty_is_error() {
        let err = login_paste_token("openai", "\n".as_bytes()).unwrap_err();
        assert!(err.is_authentication());
        assert!(err.to_string().contains("--provider openai"));
    }

    #[test]
    fn test_paste_token_read_failure_is_configuration_error() {
        let err = login_paste_token("openai", &[0xff, 0xfe, b'\n'][..]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_is_redirect() {
        assert!(is_redirect("/auth/callback?code=abc&state=s"));
        assert!(is_redirect("/auth/callback?error=access_denied"));
        assert!(!is_redirect("/favicon.ico"));
        assert!(!is_redirect("/auth/callback?foo=bar"));
    }

    #[test]
    fn test_parse_callback_checks_state() {
        let login = BrowserLogin::start(OAuthProviderConfig::openai()).unwrap();
        let ok = format!("http://localhost:1455/auth/callback?code=abc&state={}", login.state());
        assert_eq!(login.parse_callback(&ok).unwrap(), "abc");

        let bad = "http://localhost:1455/auth/callback?code=abc&state=forged";
        assert!(login.parse_callback(bad).is_err());

        let denied = format!("/auth/callback?error=access_denied&state={}", login.state());
        assert!(login.parse_callback(&denied).unwrap_err().to_string().contains("access_denied"));
    }

    #[test]
    fn test_parse_callback_bare_code() {
        let login = BrowserLogin::start(OAuthProviderConfig::anthropic()).unwrap();
        assert_eq!(login.parse_callback(" pasted-code ").unwrap(), "pasted-code");
    }

    #[test]
    fn test_start_embeds_state_in_url() {
        let login = BrowserLogin::start(OAuthProviderConfig::openai()).unwrap();
        assert!(login.url.contains(&format!("state={}", login.state())));
    }

    #[tokio::test]
    async fn test_accept_callback_reads_code() {
        let cfg = OAuthProviderConfig {
            redirect_port: 0,
            ..OAuthProviderConfig::openai()
        };
        let login = BrowserLogin::start(cfg).unwrap();
        let listener = login.bind_callback_listener().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = login.state().to_string();

        let browser = tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            let req = format!("GET /auth/callback?code=xyz&state={state} HTTP/1.1\r\nHost: localhost\r\n\r\n");
            stream.write_all(req.as_bytes()).await.unwrap();
            let mut body = String::new();
            stream.read_to_string(&mut body).await.unwrap();
            body
        });

        let code = login.accept_callback(&listener).await.unwrap();
        assert_eq!(code, "xyz");
        assert!(browser.await.unwrap().contains("200 OK"));
    }

    #[tokio::test]
    async fn test_accept_callback_skips_favicon_request() {
        let cfg = OAuthProviderConfig {
            redirect_port: 0,
            ..OAuthProviderConfig::openai()
        };
        let login = BrowserLogin::start(cfg).unwrap();
        let listener = login.bind_callback_listener().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = login.state().to_string();

        let browser = tokio::spawn(async move {
            let targets = [
                "/favicon.ico".to_string(),
                format!("/auth/callback?code=xyz&state={state}"),
            ];
            let mut replies = Vec::new();
            for target in targets {
                let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
                let req = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
                stream.write_all(req.as_bytes()).await.unwrap();
                let mut body = String::new();
                stream.read_to_string(&mut body).await.unwrap();
                replies.push(body);
            }
            replies
        });

        let code = login.accept_callback(&listener).await.unwrap();
        assert_eq!(code, "xyz");
        let replies = browser.await.unwrap();
        assert!(replies[0].contains("404 Not Found"));
        assert!(replies[1].contains("200 OK"));
    }

    #[tokio::test]
    async fn test_device_code_login_shows_user_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/device/code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "device_code": "dev-9",
                "user_code": "WXYZ-1234",
                "verification_uri": "https://example.com/activate",
                "interval": 0
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "dc-access",
                "expires_in": 600
            })))
            .mount(&server)
            .await;

        let cfg = OAuthProviderConfig {
            device_code_url: Some(format!("{}/device/code", server.uri())),
            token_url: format!("{}/token", server.uri()),
            ..OAuthProviderConfig::openai()
        };
        let mut shown = None;
        let cred = login_device_code(&OAuthClient::new(), &cfg, |d| {
            shown = Some(d.user_code.clone())
        })
        .await
        .unwrap();

        assert_eq!(shown.as_deref(), Some("WXYZ-1234"));
        assert_eq!(cred.provider, "openai");
        assert_eq!(cred.access_token, "dc-access");
        assert!(cred.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_enrich_google_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "email": "g@example.com"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1internal:loadCodeAssist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cloudaicompanionProject": "proj-7"
            })))
            .mount(&server)
            .await;

        let cfg = OAuthProviderConfig {
            userinfo_url: Some(format!("{}/userinfo", server.uri())),
            ..OAuthProviderConfig::google_antigravity()
        };
        let client = OAuthClient::new().with_cloud_code_base(server.uri());
        let cred = AuthCredential {
            provider: "google-antigravity".into(),
            access_token: "at".into(),
            auth_method: "oauth".into(),
            ..Default::default()
        };

        let enriched = enrich_credential(&client, &cfg, cred).await;
        assert_eq!(enriched.email.as_deref(), Some("g@example.com"));
        assert_eq!(enriched.project_id.as_deref(), Some("proj-7"));
    }

    #[tokio::test]
    async fn test_enrich_failure_keeps_credential() {
        let server = MockServer::start().await;
        let cfg = OAuthProviderConfig {
            userinfo_url: Some(format!("{}/userinfo", server.uri())),
            ..OAuthProviderConfig::google_antigravity()
        };
        let client = OAuthClient::new().with_cloud_code_base(server.uri());
        let cred = AuthCredential::token("google-antigravity", "at");

        let enriched = enrich_credential(&client, &cfg, cred.clone()).await;
        assert_eq!(enriched, cred);
    }
}
