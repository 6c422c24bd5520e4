//! Persisted token state.
//!
//! Access tokens are stateless and never stored. Refresh and offline
//! tokens are persisted as SHA-256 digests so they can be revoked
//! before they expire.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Refresh,
    Offline,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Refresh => "Refresh",
            TokenKind::Offline => "Offline",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Token id; for refresh tokens this is also the JWT `jti`.
    pub id: Uuid,
    pub user_id: Uuid,
    /// `None` for tokens not bound to a device.
    pub device_id: Option<String>,
    pub kind: TokenKind,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }
}

/// Input for persisting a freshly minted token. The id is chosen by
/// the caller because it is embedded in the signed claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: Option<String>,
    pub kind: TokenKind,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}
