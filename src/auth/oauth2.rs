//! OAuth2 client-credentials token cache.
//!
//! Readers load the current token lock-free; a refresh is serialized
//! behind a mutex so concurrent callers trigger a single exchange.
//! A token the DP rejects is dropped with [`TokenCache::invalidate`].

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::auth::AuthError;

/// Tokens are refreshed this long before they expire.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(30);

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Upper bound on any advertised lifetime.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}

/// Lifetime to cache a token for, clamped to [`MAX_TOKEN_TTL`].
fn token_ttl(expires_in: Option<u64>) -> Duration {
    expires_in.map_or(DEFAULT_TOKEN_TTL, |secs| Duration::from_secs(secs).min(MAX_TOKEN_TTL))
}

/// Client-credentials grant parameters.
#[derive(Debug, Clone, Copy)]
pub struct ClientCredentials<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub token_url: &'a str,
    pub scopes: &'a [String],
}

#[derive(Debug, Default)]
pub struct TokenCache {
    current: ArcSwapOption<CachedToken>,
    refresh: Mutex<()>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&self) -> Option<String> {
        self.current
            .load()
            .as_ref()
            .filter(|t| t.is_fresh())
            .map(|t| t.access_token.clone())
    }

    /// Last token obtained, fresh or not.
    pub fn cached(&self) -> Option<String> {
        self.current.load().as_ref().map(|t| t.access_token.clone())
    }

    /// Forget the current token; the next call fetches a new one.
    pub fn invalidate(&self) {
        if self.current.swap(None).is_some() {
            tracing::debug!("Cached OAuth2 token invalidated");
        }
    }

    /// Cached token, or a new one from the token endpoint.
    pub async fn get_or_refresh(
        &self,
        http: &reqwest::Client,
        credentials: ClientCredentials<'_>,
    ) -> Result<String, AuthError> {
        if let Some(token) = self.fresh() {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(token) = self.fresh() {
            return Ok(token);
        }

        let token = fetch_token(http, credentials).await?;
        let access_token = token.access_token.clone();
        self.current.store(Some(Arc::new(token)));
        Ok(access_token)
    }
}

async fn fetch_token(
    http: &reqwest::Client,
    credentials: ClientCredentials<'_>,
) -> Result<CachedToken, AuthError> {
    tracing::debug!(token_url = %credentials.token_url, "Fetching OAuth2 access token");

    let mut form = vec![("grant_type", "client_credentials".to_string())];
    if !credentials.scopes.is_empty() {
        form.push(("scope", credentials.scopes.join(" ")));
    }

    let response = http
        .post(credentials.token_url)
        .basic_auth(credentials.client_id, Some(credentials.client_secret))
        .form(&form)
        .send()
        .await
        .map_err(|e| AuthError::TokenExchange(format!("token request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::TokenExchange(format!(
            "token endpoint returned {}",
            status
        )));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| AuthError::TokenExchange(format!("malformed token response: {}", e)))?;
    if body.access_token.is_empty() {
        return Err(AuthError::TokenExchange("token endpoint returned an empty token".into()));
    }

    Ok(CachedToken {
        access_token: body.access_token,
        expires_at: Instant::now() + token_ttl(body.expires_in),
    })
}
