//! JWT access/refresh token issuance and verification, plus opaque
//! token generation for offline, session and CSRF tokens.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use agrinova_core::models::user::Role;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Which of the two signed token shapes a JWT is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims embedded in every signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user ID (UUID string).
    pub sub: String,
    /// Bound device; absent for tokens not tied to a device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub role: Role,
    /// Home company at issuance (UUID string).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique token ID; for refresh tokens also the persisted record id.
    pub jti: String,
    pub typ: TokenType,
}

impl TokenClaims {
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|e| AuthError::TokenInvalid(format!("sub: {e}")))
    }

    pub fn token_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.jti).map_err(|e| AuthError::TokenInvalid(format!("jti: {e}")))
    }
}

/// Who a token is issued to.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub device_id: Option<String>,
    pub role: Role,
    pub company_id: Option<Uuid>,
}

/// A freshly signed token together with its id and expiry.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub jti: Uuid,
    pub expires_at: DateTime<Utc>,
}

fn lifetime(kind: TokenType, config: &AuthConfig) -> u64 {
    match kind {
        TokenType::Access => config.access_token_lifetime_secs,
        TokenType::Refresh => config.refresh_token_lifetime_secs,
    }
}

/// `now + secs`, or a config error when that leaves chrono's range.
pub fn expiry_after(now: DateTime<Utc>, secs: u64) -> Result<DateTime<Utc>, AuthError> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| AuthError::Config(format!("lifetime of {secs}s is out of range")))
}

/// Issue a signed EdDSA (Ed25519) JWT of the given type.
pub fn issue_token(
    kind: TokenType,
    subject: &TokenSubject,
    config: &AuthConfig,
) -> Result<SignedToken, AuthError> {
    let now = Utc::now();
    let expires_at = expiry_after(now, lifetime(kind, config))?;
    let jti = Uuid::new_v4();
    let claims = TokenClaims {
        sub: subject.user_id.to_string(),
        device_id: subject.device_id.clone(),
        role: subject.role,
        company_id: subject.company_id.map(|c| c.to_string()),
        iss: config.jwt_issuer.clone(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
        jti: jti.to_string(),
        typ: kind,
    };

    let key = EncodingKey::from_ed_pem(config.jwt_private_key_pem.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("bad private key: {e}")))?;

    let header = Header::new(Algorithm::EdDSA);
    let token = jsonwebtoken::encode(&header, &claims, &key)
        .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))?;

    Ok(SignedToken {
        token,
        jti,
        expires_at,
    })
}

/// Decode and verify an EdDSA JWT, insisting on the expected type so an
/// access token is never accepted where a refresh token is required
/// (or the reverse).
pub fn decode_token(
    token: &str,
    expected: TokenType,
    config: &AuthConfig,
) -> Result<TokenClaims, AuthError> {
    let key = DecodingKey::from_ed_pem(config.jwt_public_key_pem.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("bad public key: {e}")))?;

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.set_issuer(&[&config.jwt_issuer]);
    validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);
    validation.leeway = 0;

    let claims = jsonwebtoken::decode::<TokenClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid(e.to_string()),
        })?;

    if claims.typ != expected {
        return Err(AuthError::TokenInvalid(format!(
            "expected {expected:?} token, got {:?}",
            claims.typ
        )));
    }
    Ok(claims)
}

/// Generate a cryptographically random opaque token
/// (32 bytes, base64url-encoded, no padding).
pub fn generate_opaque_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hash of a raw token, hex-encoded. This is the only form in
/// which token material is persisted.
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
