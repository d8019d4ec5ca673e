//! Service JWTs signed with a shared HS256 secret.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthError;

const SUBJECT: &str = "dp-connector";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
    pub jti: String,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Mint a fresh token valid for `ttl`.
pub fn mint(
    secret: &str,
    issuer: &str,
    audience: &str,
    ttl: Duration,
) -> Result<String, AuthError> {
    let iat = now_secs();
    let claims = ServiceClaims {
        iss: issuer.to_string(),
        aud: audience.to_string(),
        sub: SUBJECT.to_string(),
        iat,
        exp: iat.saturating_add(ttl.as_secs()),
        jti: Uuid::new_v4().to_string(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::InvalidToken(format!("failed to sign JWT: {}", e)))
}

/// Check signature, issuer, audience and expiry.
pub fn verify(
    token: &str,
    secret: &str,
    issuer: &str,
    audience: &str,
) -> Result<ServiceClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);

    decode::<ServiceClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_and_verify() {
        let token = mint("s3cret", "trust-broker", "dp-acme", Duration::from_secs(300)).unwrap();
        let claims = verify(&token, "s3cret", "trust-broker", "dp-acme").unwrap();

        assert_eq!(claims.iss, "trust-broker");
        assert_eq!(claims.aud, "dp-acme");
        assert_eq!(claims.exp - claims.iat, 300);
        assert!(Uuid::parse_str(&claims.jti).is_ok());
    }

    #[test]
    fn test_rejects_wrong_secret_and_audience() {
        let token = mint("s3cret", "trust-broker", "dp-acme", Duration::from_secs(300)).unwrap();
        assert!(verify(&token, "other", "trust-broker", "dp-acme").is_err());
        assert!(verify(&token, "s3cret", "trust-broker", "dp-other").is_err());
        assert!(verify(&token, "s3cret", "someone-else", "dp-acme").is_err());
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let token = mint("k", "i", "a", Duration::from_secs(u64::MAX)).unwrap();
        let claims = verify(&token, "k", "i", "a").unwrap();
        assert_eq!(claims.exp, u64::MAX);
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = mint("k", "i", "a", Duration::from_secs(60)).unwrap();
        let b = mint("k", "i", "a", Duration::from_secs(60)).unwrap();
        assert_ne!(a, b);
    }
}
