//! Outbound authentication.
//!
//! # Methods
//! - None: no credential
//! - ApiKey: static key in a configurable header
//! - OAuth2: client-credentials bearer token, cached until shortly before expiry
//! - Mtls: client identity on the TLS handshake plus a fingerprint header
//! - Jwt: short-lived HS256 service token minted per request

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use subtle::ConstantTimeEq;
use thiserror::Error;

pub use crate::config::AuthenticationConfig;
use crate::connector::types::OutboundRequest;

pub mod jwt;
pub mod mtls;
pub mod oauth2;

pub use mtls::ClientCertificate;
use oauth2::{ClientCredentials, TokenCache};

/// Header carrying the SHA-256 fingerprint of the mTLS client certificate.
pub const CLIENT_CERT_FINGERPRINT_HEADER: &str = "x-client-cert-fingerprint";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{method} authentication requires a non-empty `{field}`")]
    MissingField {
        method: &'static str,
        field: &'static str,
    },

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("empty token")]
    EmptyToken,

    #[error("client certificate error: {0}")]
    Certificate(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The DP refused the credential (HTTP 401/403, gRPC 16/7).
    #[error("credential rejected by the data provider: {0}")]
    Rejected(String),
}

fn require(method: &'static str, field: &'static str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        Err(AuthError::MissingField { method, field })
    } else {
        Ok(())
    }
}

fn bearer(token: &str) -> Result<HeaderValue, AuthError> {
    HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| AuthError::InvalidHeader(e.to_string()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Decorates outbound requests with the configured credential.
#[derive(Debug)]
pub struct Authenticator {
    config: AuthenticationConfig,
    http: reqwest::Client,
    tokens: TokenCache,
    certificate: ArcSwapOption<ClientCertificate>,
}

impl Authenticator {
    /// `http` is used only for OAuth2 token exchanges.
    pub fn new(config: AuthenticationConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            tokens: TokenCache::new(),
            certificate: ArcSwapOption::empty(),
        }
    }

    pub fn method(&self) -> &'static str {
        self.config.method()
    }

    /// The mTLS client certificate, loaded from disk on first use.
    ///
    /// Returns `Ok(None)` for every other method.
    pub fn client_certificate(&self) -> Result<Option<Arc<ClientCertificate>>, AuthError> {
        let AuthenticationConfig::Mtls {
            cert_file,
            key_file,
            ca_file,
        } = &self.config
        else {
            return Ok(None);
        };

        if let Some(loaded) = self.certificate.load_full() {
            return Ok(Some(loaded));
        }
        if cert_file.as_os_str().is_empty() {
            return Err(AuthError::MissingField {
                method: "mtls",
                field: "cert_file",
            });
        }
        if key_file.as_os_str().is_empty() {
            return Err(AuthError::MissingField {
                method: "mtls",
                field: "key_file",
            });
        }

        let loaded = Arc::new(mtls::load_client_certificate(
            cert_file,
            key_file,
            ca_file.as_deref(),
        )?);
        self.certificate.store(Some(loaded.clone()));
        Ok(Some(loaded))
    }

    /// Attach the credential for the configured method to `request`.
    pub async fn authenticate_request(
        &self,
        request: &mut OutboundRequest,
    ) -> Result<(), AuthError> {
        match &self.config {
            AuthenticationConfig::None => {}
            AuthenticationConfig::ApiKey { key, header } => {
                require("api_key", "key", key)?;
                let name = HeaderName::from_bytes(header.trim().as_bytes())
                    .map_err(|e| AuthError::InvalidHeader(format!("{}: {}", header, e)))?;
                let value = if name == AUTHORIZATION {
                    bearer(key)?
                } else {
                    HeaderValue::from_str(key).map_err(|e| AuthError::InvalidHeader(e.to_string()))?
                };
                request.insert_header(name, value);
            }
            AuthenticationConfig::OAuth2 {
                client_id,
                client_secret,
                token_url,
                scopes,
            } => {
                require("oauth2", "client_id", client_id)?;
                require("oauth2", "client_secret", client_secret)?;
                require("oauth2", "token_url", token_url)?;

                let token = self
                    .tokens
                    .get_or_refresh(
                        &self.http,
                        ClientCredentials {
                            client_id,
                            client_secret,
                            token_url,
                            scopes,
                        },
                    )
                    .await?;
                request.insert_header(AUTHORIZATION, bearer(&token)?);
            }
            AuthenticationConfig::Mtls { .. } => {
                let certificate = self.client_certificate()?.ok_or_else(|| {
                    AuthError::Certificate("client certificate unavailable".into())
                })?;
                let value = HeaderValue::from_str(certificate.fingerprint())
                    .map_err(|e| AuthError::InvalidHeader(e.to_string()))?;
                let name = HeaderName::from_static(CLIENT_CERT_FINGERPRINT_HEADER);
                request.insert_header(name, value);
                request.requires_client_cert = true;
            }
            AuthenticationConfig::Jwt {
                secret,
                issuer,
                audience,
                expiration_secs,
            } => {
                require("jwt", "secret", secret)?;
                require("jwt", "issuer", issuer)?;
                require("jwt", "audience", audience)?;

                let ttl = Duration::from_secs(*expiration_secs);
                let token = jwt::mint(secret, issuer, audience, ttl)?;
                request.insert_header(AUTHORIZATION, bearer(&token)?);
            }
        }
        Ok(())
    }

    /// Drop cached credentials after the DP rejected them.
    pub fn invalidate_credentials(&self) {
        if let AuthenticationConfig::OAuth2 { .. } = self.config {
            self.tokens.invalidate();
        }
    }

    /// Check a credential as produced by [`Self::authenticate_request`].
    pub fn validate_token(&self, token: &str) -> Result<(), AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::EmptyToken);
        }

        match &self.config {
            AuthenticationConfig::None => Ok(()),
            AuthenticationConfig::ApiKey { key, .. } => {
                if constant_time_eq(token, key) {
                    Ok(())
                } else {
                    Err(AuthError::InvalidToken("API key mismatch".into()))
                }
            }
            AuthenticationConfig::OAuth2 { .. } => match self.tokens.cached() {
                Some(cached) if !constant_time_eq(token, &cached) => {
                    Err(AuthError::InvalidToken("not the current access token".into()))
                }
                _ => Ok(()),
            },
            AuthenticationConfig::Mtls { .. } => {
                let certificate = self.client_certificate()?.ok_or_else(|| {
                    AuthError::Certificate("client certificate unavailable".into())
                })?;
                if constant_time_eq(token, certificate.fingerprint()) {
                    Ok(())
                } else {
                    Err(AuthError::InvalidToken("certificate fingerprint mismatch".into()))
                }
            }
            AuthenticationConfig::Jwt {
                secret,
                issuer,
                audience,
                ..
            } => jwt::verify(token, secret, issuer, audience).map(|_| ()),
        }
    }

    /// Authenticate a blank request and validate the credential it received.
    pub async fn test_authentication_flow(&self) -> Result<(), AuthError> {
        let mut request = OutboundRequest::new(serde_json::Value::Null);
        self.authenticate_request(&mut request).await?;

        let credential = match &self.config {
            AuthenticationConfig::None => return Ok(()),
            AuthenticationConfig::ApiKey { header, .. } => request.header(header.trim()),
            AuthenticationConfig::Mtls { .. } => request.header(CLIENT_CERT_FINGERPRINT_HEADER),
            AuthenticationConfig::OAuth2 { .. } | AuthenticationConfig::Jwt { .. } => {
                request.header(AUTHORIZATION.as_str())
            }
        }
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v))
        .ok_or(AuthError::EmptyToken)?;

        self.validate_token(credential)?;
        tracing::debug!(method = self.method(), "Authentication self-test passed");
        Ok(())
    }
}
