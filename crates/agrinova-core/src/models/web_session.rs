//! Web session domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-side record backing the session cookie. Revocation is a soft
/// state change; rows are kept for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSession {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    #[serde(skip_serializing)]
    pub csrf_token_hash: String,
    /// Browser fingerprint, when the client supplied one.
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub login_method: String,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub revoked: bool,
    pub revoked_by: Option<Uuid>,
    pub revoked_reason: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WebSession {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.revoked && self.expires_at > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWebSession {
    pub user_id: Uuid,
    pub token_hash: String,
    pub csrf_token_hash: String,
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub login_method: String,
    pub expires_at: DateTime<Utc>,
}

/// Who revoked a session and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRevocation {
    pub revoked_by: Option<Uuid>,
    pub reason: String,
}
