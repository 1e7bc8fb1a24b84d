//! Player Tokens
//!
//! Checks JWTs minted by the identity provider. This server only reads
//! tokens; the `sub` claim names the player.

use std::fmt;

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::state::PlayerId;

/// Key and claim expectations for incoming tokens.
///
/// A server without one runs in development mode.
#[derive(Clone)]
pub struct AuthConfig {
    algorithm: Algorithm,
    key: DecodingKey,
    /// Required `iss`, if any.
    pub issuer: Option<String>,
    /// Required `aud`, if any.
    pub audience: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl AuthConfig {
    /// Shared-secret tokens.
    pub fn hs256(secret: &str) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: None,
            audience: None,
        }
    }

    /// Tokens signed by the provider's RSA key.
    pub fn rs256_pem(pem: &str) -> Result<Self, AuthError> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::BadKey(e.to_string()))?;
        Ok(Self {
            algorithm: Algorithm::RS256,
            key,
            issuer: None,
            audience: None,
        })
    }

    /// Require this issuer.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Require this audience.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Read `AUTH_PUBLIC_KEY_PEM` (preferred) or `AUTH_SECRET`, plus
    /// `AUTH_ISSUER` and `AUTH_AUDIENCE`. `None` when no key is set.
    pub fn from_env() -> Result<Option<Self>, AuthError> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let config = match (var("AUTH_PUBLIC_KEY_PEM"), var("AUTH_SECRET")) {
            (Some(pem), _) => Self::rs256_pem(&pem)?,
            (None, Some(secret)) => Self::hs256(&secret),
            (None, None) => return Ok(None),
        };

        Ok(Some(Self {
            issuer: var("AUTH_ISSUER"),
            audience: var("AUTH_AUDIENCE"),
            ..config
        }))
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

/// The claims this server reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Player id.
    pub sub: String,
    /// Display name, when the provider sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Expiry, Unix seconds.
    pub exp: u64,
}

impl TokenClaims {
    /// Player named by the token.
    pub fn player_id(&self) -> PlayerId {
        PlayerId::new(self.sub.clone())
    }

    /// `username`, or the player id when absent.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.sub)
    }
}

/// Why a token was refused.
#[derive(Debug, Error)]
pub enum AuthError {
    /// `exp` is in the past.
    #[error("token expired")]
    Expired,
    /// Signed with another key.
    #[error("invalid signature")]
    InvalidSignature,
    /// `iss` does not match.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// `aud` does not match.
    #[error("invalid audience")]
    InvalidAudience,
    /// Not a decodable JWT.
    #[error("malformed token")]
    Malformed,
    /// `sub` is blank.
    #[error("token has no subject")]
    MissingSubject,
    /// Configured key could not be parsed.
    #[error("unusable verification key: {0}")]
    BadKey(String),
    /// Any other validation failure.
    #[error("token rejected: {0}")]
    Rejected(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                AuthError::Malformed
            }
            _ => AuthError::Rejected(err.to_string()),
        }
    }
}

/// Verify `token` and return its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let claims = decode::<TokenClaims>(token, &config.key, &config.validation())?.claims;
    if claims.sub.trim().is_empty() {
        return Err(AuthError::MissingSubject);
    }
    Ok(claims)
}
