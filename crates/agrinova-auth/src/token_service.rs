//! Mobile token lifecycle: the access/refresh/offline triad.
//!
//! Access tokens are stateless. Refresh tokens are signed and persisted
//! (the JWT `jti` is the record id). Offline tokens are opaque and only
//! ever validated by a hash lookup.

use std::sync::Arc;

use agrinova_core::error::{AgrinovaError, AgrinovaResult};
use agrinova_core::models::token::{CreateTokenRecord, TokenKind, TokenRecord};
use agrinova_core::repository::TokenRepository;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token::{self, SignedToken, TokenClaims, TokenSubject, TokenType};

/// Tokens handed out by a mobile login.
#[derive(Debug, Clone)]
pub struct TokenTriad {
    pub access: SignedToken,
    pub refresh: SignedToken,
    pub offline: OfflineToken,
}

#[derive(Debug, Clone)]
pub struct OfflineToken {
    pub token: String,
    pub id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Access + refresh pair minted by refresh or device renew.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: SignedToken,
    pub refresh: SignedToken,
}

#[derive(Clone)]
pub struct TokenService<T: TokenRepository> {
    tokens: T,
    config: Arc<AuthConfig>,
}

impl<T: TokenRepository> TokenService<T> {
    pub fn new(tokens: T, config: Arc<AuthConfig>) -> Self {
        Self { tokens, config }
    }

    fn refresh_record(subject: &TokenSubject, refresh: &SignedToken) -> CreateTokenRecord {
        CreateTokenRecord {
            id: refresh.jti,
            user_id: subject.user_id,
            device_id: subject.device_id.clone(),
            kind: TokenKind::Refresh,
            token_hash: token::hash_token(&refresh.token),
            expires_at: refresh.expires_at,
        }
    }

    fn sign_pair(&self, subject: &TokenSubject) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access: token::issue_token(TokenType::Access, subject, &self.config)?,
            refresh: token::issue_token(TokenType::Refresh, subject, &self.config)?,
        })
    }

    /// Revoke every token of the subject's device and issue a fresh
    /// triad, atomically.
    pub async fn issue_login_tokens(&self, subject: &TokenSubject) -> AgrinovaResult<TokenTriad> {
        let Some(device_id) = subject.device_id.as_deref() else {
            return Err(AgrinovaError::Validation {
                message: "login tokens require a device id".into(),
            });
        };

        let TokenPair { access, refresh } = self.sign_pair(subject)?;
        let offline = OfflineToken {
            token: token::generate_opaque_token(),
            id: Uuid::new_v4(),
            expires_at: token::expiry_after(Utc::now(), self.config.offline_token_lifetime_secs)?,
        };

        let records = vec![
            Self::refresh_record(subject, &refresh),
            CreateTokenRecord {
                id: offline.id,
                user_id: subject.user_id,
                device_id: Some(device_id.to_string()),
                kind: TokenKind::Offline,
                token_hash: token::hash_token(&offline.token),
                expires_at: offline.expires_at,
            },
        ];
        self.tokens
            .replace_device_tokens(subject.user_id, device_id, records)
            .await?;

        info!(user_id = %subject.user_id, device_id, "Issued login token triad");
        Ok(TokenTriad {
            access,
            refresh,
            offline,
        })
    }

    /// Consume `consumed_id` (a refresh or offline record) and issue a new
    /// access/refresh pair in the same transaction. A record that was
    /// already consumed yields `InvalidToken`.
    pub async fn rotate_pair(
        &self,
        consumed_id: Uuid,
        subject: &TokenSubject,
    ) -> AgrinovaResult<TokenPair> {
        let pair = self.sign_pair(subject)?;
        match self
            .tokens
            .rotate(consumed_id, Self::refresh_record(subject, &pair.refresh))
            .await
        {
            Ok(_) => {
                debug!(user_id = %subject.user_id, %consumed_id, "Rotated token pair");
                Ok(pair)
            }
            Err(AgrinovaError::Conflict { .. }) => {
                Err(AuthError::TokenInvalid("token already used".into()).into())
            }
            Err(e) => Err(e),
        }
    }

    /// Signature, issuer, type and expiry, then the persisted record this
    /// token names, whatever its state. The record must carry this
    /// token's hash.
    pub async fn lookup_refresh_token(
        &self,
        raw: &str,
    ) -> AgrinovaResult<(TokenClaims, TokenRecord)> {
        let claims = token::decode_token(raw, TokenType::Refresh, &self.config)?;
        let id = claims.token_id()?;

        let record = match self.tokens.get_by_id(id).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                return Err(AuthError::TokenInvalid("unknown refresh token".into()).into());
            }
            Err(e) => return Err(e),
        };
        if record.kind != TokenKind::Refresh || record.token_hash != token::hash_token(raw) {
            return Err(AuthError::TokenInvalid("refresh token does not match record".into()).into());
        }
        Ok((claims, record))
    }

    /// [`lookup_refresh_token`](Self::lookup_refresh_token) plus the
    /// record must still be live. Nothing is consumed.
    pub async fn validate_refresh_token(
        &self,
        raw: &str,
    ) -> AgrinovaResult<(TokenClaims, TokenRecord)> {
        let (claims, record) = self.lookup_refresh_token(raw).await?;
        ensure_live(&record)?;
        Ok((claims, record))
    }

    /// Hash lookup of an offline token, whatever its state.
    ///
    /// Callers check the device binding first and liveness second, so a
    /// token orphaned by an unbind reports the device problem.
    pub async fn lookup_offline_token(&self, raw: &str) -> AgrinovaResult<TokenRecord> {
        match self
            .tokens
            .find_by_hash(TokenKind::Offline, &token::hash_token(raw))
            .await
        {
            Ok(record) => Ok(record),
            Err(e) if e.is_not_found() => {
                Err(AuthError::TokenInvalid("unknown offline token".into()).into())
            }
            Err(e) => Err(e),
        }
    }

    /// Live offline record for this token, or `InvalidToken`.
    pub async fn validate_offline_token(&self, raw: &str) -> AgrinovaResult<TokenRecord> {
        match self
            .tokens
            .find_live_by_hash(TokenKind::Offline, &token::hash_token(raw))
            .await
        {
            Ok(record) => Ok(record),
            Err(e) if e.is_not_found() => {
                Err(AuthError::TokenInvalid("offline token revoked or expired".into()).into())
            }
            Err(e) => Err(e),
        }
    }

    pub fn validate_access_token(&self, raw: &str) -> AgrinovaResult<TokenClaims> {
        Ok(token::decode_token(raw, TokenType::Access, &self.config)?)
    }

    /// Idempotent; an unknown or already revoked id is not an error.
    pub async fn revoke_token(&self, id: Uuid) -> AgrinovaResult<()> {
        self.tokens.revoke(id).await?;
        Ok(())
    }

    pub async fn revoke_device_tokens(&self, user_id: Uuid, device_id: &str) -> AgrinovaResult<u64> {
        let revoked = self.tokens.revoke_for_device(user_id, device_id).await?;
        debug!(%user_id, device_id, revoked, "Revoked device tokens");
        Ok(revoked)
    }

    pub async fn revoke_user_tokens(&self, user_id: Uuid) -> AgrinovaResult<u64> {
        let revoked = self.tokens.revoke_for_user(user_id).await?;
        debug!(%user_id, revoked, "Revoked user tokens");
        Ok(revoked)
    }

    pub fn access_token_lifetime_secs(&self) -> u64 {
        self.config.access_token_lifetime_secs
    }
}

/// A revoked or expired record fails as `InvalidToken`.
pub fn ensure_live(record: &TokenRecord) -> Result<(), AuthError> {
    if record.is_live(Utc::now()) {
        Ok(())
    } else {
        Err(AuthError::TokenInvalid(format!(
            "{} token revoked or expired",
            record.kind
        )))
    }
}
