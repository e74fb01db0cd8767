//! JWT token codec
//!
//! Issues and verifies the two token classes of the auth core with
//! HMAC-SHA256 signing:
//! - Access tokens carry identity claims and live for a short, fixed time.
//! - Refresh tokens carry only the subject and live for days.
//!
//! Each class is signed with its own secret and carries its own audience,
//! so a token of one class never verifies as the other.

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use mailhost_core::{AuthConfig, UserRole};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Current Unix time in seconds
pub fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Claims with an expiry timestamp
pub trait Expiring {
    fn exp(&self) -> u64;

    /// `true` once `now` is past `exp`
    fn is_expired_at(&self, now: u64) -> bool {
        now > self.exp()
    }

    fn is_expired(&self) -> bool {
        self.is_expired_at(now_secs())
    }
}

/// Identity claims signed into an access token.
///
/// A snapshot taken at issuance; anything enforcing authorization must
/// re-read the live account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Token issuer
    pub iss: String,
    /// Audience (access audience)
    pub aud: String,
    /// Subject - user ID
    pub sub: Uuid,
    /// JWT ID - unique per issued token
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    /// User's email address
    pub email: String,
    /// User's back-office role
    pub role: UserRole,
    /// Tenant the user belongs to
    pub company_id: Option<Uuid>,
}

impl Expiring for AccessClaims {
    fn exp(&self) -> u64 {
        self.exp
    }
}

/// Claims signed into a refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub iss: String,
    pub aud: String,
    pub sub: Uuid,
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
    /// Account token generation at issuance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ver: Option<i32>,
}

impl Expiring for RefreshClaims {
    fn exp(&self) -> u64 {
        self.exp
    }
}

/// Who an access token is issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
}

/// A freshly signed token and its expiry (Unix seconds)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: u64,
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Token issuer or audience mismatch")]
    ClaimMismatch,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Token codec holding both signing secrets.
///
/// Built once at startup from [`AuthConfig`] and shared immutably.
pub struct TokenCodec {
    access: SigningKeys,
    refresh: SigningKeys,
    issuer: String,
    access_audience: String,
    refresh_audience: String,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("access_audience", &self.access_audience)
            .field("refresh_audience", &self.refresh_audience)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access: SigningKeys::from_secret(&config.access_secret),
            refresh: SigningKeys::from_secret(&config.refresh_secret),
            issuer: config.issuer.clone(),
            access_audience: config.access_audience.clone(),
            refresh_audience: config.refresh_audience.clone(),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
        }
    }

    pub fn access_ttl_secs(&self) -> u64 {
        self.access_ttl_secs
    }

    /// Sign an access token expiring `access_ttl_secs` from now
    pub fn issue_access_token(&self, identity: &Identity) -> Result<IssuedToken, JwtError> {
        self.issue_access_token_at(identity, now_secs())
    }

    pub fn issue_access_token_at(
        &self,
        identity: &Identity,
        now: u64,
    ) -> Result<IssuedToken, JwtError> {
        let claims = AccessClaims {
            iss: self.issuer.clone(),
            aud: self.access_audience.clone(),
            sub: identity.user_id,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now.saturating_add(self.access_ttl_secs),
            email: identity.email.clone(),
            role: identity.role,
            company_id: identity.company_id,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.access.encoding,
        )?;

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    /// Sign a refresh token with the refresh secret
    pub fn issue_refresh_token(
        &self,
        user_id: Uuid,
        version: Option<i32>,
    ) -> Result<IssuedToken, JwtError> {
        self.issue_refresh_token_at(user_id, version, now_secs())
    }

    pub fn issue_refresh_token_at(
        &self,
        user_id: Uuid,
        version: Option<i32>,
        now: u64,
    ) -> Result<IssuedToken, JwtError> {
        let claims = RefreshClaims {
            iss: self.issuer.clone(),
            aud: self.refresh_audience.clone(),
            sub: user_id,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now.saturating_add(self.refresh_ttl_secs),
            ver: version,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.refresh.encoding,
        )?;

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, JwtError> {
        self.verify_access_at(token, now_secs())
    }

    pub fn verify_access_at(&self, token: &str, now: u64) -> Result<AccessClaims, JwtError> {
        verify(
            token,
            &self.access.decoding,
            &self.issuer,
            &self.access_audience,
            now,
        )
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        self.verify_refresh_at(token, now_secs())
    }

    pub fn verify_refresh_at(&self, token: &str, now: u64) -> Result<RefreshClaims, JwtError> {
        verify(
            token,
            &self.refresh.decoding,
            &self.issuer,
            &self.refresh_audience,
            now,
        )
    }
}

/// Verify signature, issuer, audience and expiry of a token.
///
/// The payload is validated as a plain JSON object before it is shaped into
/// `C`, so a well-signed token of the other class reports `ClaimMismatch`
/// rather than a deserialization failure. Expiry is checked against the
/// supplied clock rather than the library's, with no leeway.
pub fn verify<C>(
    token: &str,
    key: &DecodingKey,
    issuer: &str,
    audience: &str,
    now: u64,
) -> Result<C, JwtError>
where
    C: DeserializeOwned + Expiring,
{
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);

    let payload = decode::<serde_json::Value>(token, key, &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => JwtError::ClaimMismatch,
            ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
            _ => JwtError::InvalidToken,
        })?
        .claims;
    let claims: C = serde_json::from_value(payload).map_err(|_| JwtError::InvalidToken)?;

    if claims.is_expired_at(now) {
        return Err(JwtError::ExpiredToken);
    }

    Ok(claims)
}

/// Extract access claims WITHOUT checking the signature.
///
/// Only the request gate uses this, as a coarse filter. A `Some` result
/// proves nothing about who issued the token and must never be the basis of
/// a final authorization decision.
pub fn decode_unverified(token: &str) -> Option<AccessClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}
