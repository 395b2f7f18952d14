use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, RedirectUrl,
    RefreshToken, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use std::env;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::dispatch::open_external;
use crate::errors::{AppError, AppResult};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const SERVICE_NAME: &str = "unsub-google-oauth";

/// Opaque bearer credential handed to the pipeline. The pipeline never
/// inspects it beyond attaching it as an Authorization header.
#[derive(Clone, Debug)]
pub struct TokenBundle {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
}

/// Obtain a bearer token for the given scopes: silently via a stored
/// refresh token when possible, otherwise through an interactive consent
/// flow with a loopback redirect listener.
pub async fn obtain_token(scopes: &[Scope], account_key: &str) -> AppResult<TokenBundle> {
    let creds = client_credentials()?;
    let store = RefreshStore::new(account_key);

    if let Some(refresh_token) = store.load() {
        let client = oauth_client(&creds, "http://127.0.0.1")?;
        if let Some(bundle) = try_refresh(&client, &refresh_token).await {
            return Ok(bundle);
        }
        warn!(account = %account_key, "Stored refresh token rejected; starting consent flow");
        store.clear();
    }

    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|e| AppError::Unexpected(format!("binding loopback port: {e}")))?;
    let port = listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| AppError::Unexpected(format!("reading local addr: {e}")))?;
    let redirect = format!("http://127.0.0.1:{port}");
    let client = oauth_client(&creds, &redirect)?;

    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let mut request = client
        .authorize_url(CsrfToken::new_random)
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(challenge);
    for scope in scopes {
        request = request.add_scope(scope.clone());
    }
    let (consent_url, csrf) = request.url();

    info!(account = %account_key, redirect = %redirect, "Opening browser for Google consent");
    if let Err(e) = open_external(consent_url.as_str()) {
        warn!(error = %e, "Could not open browser; navigate to this URL manually:\n{consent_url}");
    }

    let callback = wait_for_callback(listener).await?;
    if callback.state != *csrf.secret() {
        return Err(AppError::AuthExpired);
    }

    let token_res = client
        .exchange_code(AuthorizationCode::new(callback.code))
        .set_pkce_verifier(verifier)
        .request_async(async_http_client)
        .await
        .map_err(|e| AppError::Network(format!("token exchange failed: {e}")))?;

    let refresh_token = token_res.refresh_token().map(|r| r.secret().to_string());
    if let Some(token) = &refresh_token {
        store.save(token);
    }

    Ok(TokenBundle {
        access_token: token_res.access_token().secret().to_string(),
        expires_at: expiry(token_res.expires_in()),
        refresh_token,
    })
}

/// Resolve the authenticated account's email address.
pub async fn fetch_user_email(access_token: &str) -> AppResult<String> {
    #[derive(Debug, Deserialize)]
    struct UserInfo {
        email: String,
    }

    let res = reqwest::Client::new()
        .get(USERINFO_URL)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| AppError::Network(format!("userinfo request failed: {e}")))?;
    if !res.status().is_success() {
        return Err(AppError::Network(format!(
            "userinfo failed with status {}",
            res.status()
        )));
    }
    let parsed: UserInfo = res
        .json()
        .await
        .map_err(|e| AppError::Unexpected(format!("parse userinfo: {e}")))?;
    Ok(parsed.email)
}

async fn try_refresh(client: &BasicClient, refresh_token: &str) -> Option<TokenBundle> {
    let refresh = RefreshToken::new(refresh_token.to_string());
    match client
        .exchange_refresh_token(&refresh)
        .request_async(async_http_client)
        .await
    {
        Ok(token_res) => Some(TokenBundle {
            access_token: token_res.access_token().secret().to_string(),
            expires_at: expiry(token_res.expires_in()),
            refresh_token: None,
        }),
        Err(err) => {
            warn!("Refresh token invalid or expired: {err}");
            None
        }
    }
}

fn expiry(expires_in: Option<std::time::Duration>) -> Option<DateTime<Utc>> {
    expires_in
        .map(|d| Utc::now() + Duration::from_std(d).unwrap_or_else(|_| Duration::seconds(0)))
}

struct ClientCredentials {
    client_id: String,
    client_secret: String,
}

fn client_credentials() -> AppResult<ClientCredentials> {
    let client_id = env::var("GOOGLE_CLIENT_ID")
        .map_err(|_| AppError::Config("GOOGLE_CLIENT_ID missing".into()))?;
    let client_secret = env::var("GOOGLE_CLIENT_SECRET")
        .map_err(|_| AppError::Config("GOOGLE_CLIENT_SECRET missing".into()))?;
    Ok(ClientCredentials {
        client_id,
        client_secret,
    })
}

fn oauth_client(creds: &ClientCredentials, redirect: &str) -> AppResult<BasicClient> {
    let client = BasicClient::new(
        ClientId::new(creds.client_id.clone()),
        Some(ClientSecret::new(creds.client_secret.clone())),
        AuthUrl::new(AUTH_URL.to_string())
            .map_err(|e| AppError::Config(format!("invalid auth url: {e}")))?,
        Some(
            TokenUrl::new(TOKEN_URL.to_string())
                .map_err(|e| AppError::Config(format!("invalid token url: {e}")))?,
        ),
    )
    .set_redirect_uri(
        RedirectUrl::new(redirect.to_string())
            .map_err(|e| AppError::Config(format!("invalid redirect uri {redirect}: {e}")))?,
    )
    .set_auth_type(oauth2::AuthType::RequestBody);

    Ok(client)
}

struct Callback {
    code: String,
    state: String,
}

async fn wait_for_callback(listener: TcpListener) -> AppResult<Callback> {
    let (mut stream, _) = listener
        .accept()
        .await
        .map_err(|e| AppError::Unexpected(format!("redirect accept failed: {e}")))?;

    let mut buf = [0u8; 4096];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| AppError::Unexpected(format!("reading auth callback failed: {e}")))?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let path = request
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| AppError::Unexpected("invalid HTTP request on callback".into()))?;
    let parsed = url::Url::parse(&format!("http://localhost{path}"))
        .map_err(|e| AppError::Unexpected(format!("parsing callback url: {e}")))?;

    let code = parsed
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
        .ok_or_else(|| AppError::Unexpected("callback missing code parameter".into()))?;
    let state = parsed
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.to_string())
        .unwrap_or_default();

    let response =
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nAuth complete. You can close this tab.";
    let _ = stream.write_all(response.as_bytes()).await;
    Ok(Callback { code, state })
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoredToken {
    refresh_token: String,
}

/// Refresh tokens live in the OS keyring, keyed per account. Keyring
/// trouble degrades to a fresh consent flow instead of failing the run.
struct RefreshStore {
    account_key: String,
}

impl RefreshStore {
    fn new(account_key: &str) -> Self {
        Self {
            account_key: account_key.to_string(),
        }
    }

    fn load(&self) -> Option<String> {
        let entry = match keyring::Entry::new(SERVICE_NAME, &self.account_key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Keyring unavailable: {e}");
                return None;
            }
        };
        match entry.get_password() {
            Ok(raw) => match serde_json::from_str::<StoredToken>(&raw) {
                Ok(stored) => Some(stored.refresh_token),
                Err(e) => {
                    warn!("Discarding undecodable stored token: {e}");
                    None
                }
            },
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!("Keyring read failed: {e}");
                None
            }
        }
    }

    fn save(&self, refresh_token: &str) {
        let stored = StoredToken {
            refresh_token: refresh_token.to_string(),
        };
        let serialized = match serde_json::to_string(&stored) {
            Ok(s) => s,
            Err(e) => {
                warn!("Could not encode token for storage: {e}");
                return;
            }
        };
        let result = keyring::Entry::new(SERVICE_NAME, &self.account_key)
            .and_then(|entry| entry.set_password(&serialized));
        if let Err(e) = result {
            warn!("Keyring save failed; consent will be required next run: {e}");
        }
    }

    fn clear(&self) {
        if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, &self.account_key) {
            let _ = entry.delete_password();
        }
    }
}
