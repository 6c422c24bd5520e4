//! QR-code login for the web dashboard.
//!
//! The browser opens a short-lived challenge and renders it as a QR
//! code. A user already signed in on the mobile app scans and approves
//! it. The browser then consumes the approval exactly once and receives
//! an ordinary web session for the approving user.
//!
//! Challenges live in process memory. Every call takes the challenge
//! alongside the session id, so knowing the id alone is not enough.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::AuthError;
use crate::token;

/// Consumed entries linger this long so late status polls still see
/// `Consumed` instead of an unknown session.
const CONSUMED_RETENTION_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrLoginStatus {
    Pending,
    Approved,
    Consumed,
    Expired,
}

impl QrLoginStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QrLoginStatus::Pending => "PENDING",
            QrLoginStatus::Approved => "APPROVED",
            QrLoginStatus::Consumed => "CONSUMED",
            QrLoginStatus::Expired => "EXPIRED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QrState {
    Pending,
    Approved { user_id: Uuid },
    /// A consume is creating the session right now.
    Processing { user_id: Uuid },
    Consumed { at: DateTime<Utc> },
}

#[derive(Debug, Clone)]
struct QrLoginEntry {
    challenge: String,
    qr_data: String,
    state: QrState,
    expires_at: DateTime<Utc>,
}

impl QrLoginEntry {
    fn matches(&self, challenge: &str) -> bool {
        bool::from(self.challenge.as_bytes().ct_eq(challenge.as_bytes()))
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    fn status(&self, now: DateTime<Utc>) -> QrLoginStatus {
        match self.state {
            QrState::Consumed { .. } => QrLoginStatus::Consumed,
            _ if self.is_expired(now) => QrLoginStatus::Expired,
            QrState::Approved { .. } => QrLoginStatus::Approved,
            // An in-flight consume is not observable from outside.
            QrState::Pending | QrState::Processing { .. } => QrLoginStatus::Pending,
        }
    }

    fn view(&self, session_id: Uuid, now: DateTime<Utc>) -> QrLoginSession {
        QrLoginSession {
            session_id,
            challenge: self.challenge.clone(),
            qr_data: self.qr_data.clone(),
            status: self.status(now),
            expires_at: self.expires_at,
        }
    }
}

/// What the browser needs to render and later poll a QR login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrLoginSession {
    pub session_id: Uuid,
    pub challenge: String,
    /// Payload to encode in the QR image.
    pub qr_data: String,
    pub status: QrLoginStatus,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct QrLoginStore {
    entries: DashMap<Uuid, QrLoginEntry>,
    ttl_secs: u64,
}

impl QrLoginStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_secs,
        }
    }

    pub fn create(&self) -> Result<QrLoginSession, AuthError> {
        self.create_at(Utc::now())
    }

    pub fn status(&self, session_id: Uuid, challenge: &str) -> Result<QrLoginSession, AuthError> {
        self.status_at(session_id, challenge, Utc::now())
    }

    /// Idempotent for the same user; a different approver is refused.
    pub fn approve(
        &self,
        session_id: Uuid,
        challenge: &str,
        user_id: Uuid,
    ) -> Result<QrLoginSession, AuthError> {
        self.approve_at(session_id, challenge, user_id, Utc::now())
    }

    /// Take an approved login for consumption and return the approver.
    /// The caller must follow up with [`finish`](Self::finish) or
    /// [`release`](Self::release).
    pub fn claim(&self, session_id: Uuid, challenge: &str) -> Result<Uuid, AuthError> {
        self.claim_at(session_id, challenge, Utc::now())
    }

    /// Hand a claimed login back after the session could not be created.
    pub fn release(&self, session_id: Uuid) {
        if let Some(mut entry) = self.entries.get_mut(&session_id) {
            let state = entry.state;
            if let QrState::Processing { user_id } = state {
                entry.state = QrState::Approved { user_id };
            }
        }
    }

    pub fn finish(&self, session_id: Uuid) {
        self.finish_at(session_id, Utc::now());
    }

    /// Drop expired entries and consumed ones past their retention.
    /// Returns how many were removed.
    pub fn prune(&self) -> usize {
        self.prune_at(Utc::now())
    }

    fn create_at(&self, now: DateTime<Utc>) -> Result<QrLoginSession, AuthError> {
        let session_id = Uuid::new_v4();
        let challenge = token::generate_opaque_token();
        let expires_at = token::expiry_after(now, self.ttl_secs)?;
        let entry = QrLoginEntry {
            qr_data: qr_payload(session_id, &challenge, expires_at),
            challenge,
            state: QrState::Pending,
            expires_at,
        };
        let view = entry.view(session_id, now);
        self.entries.insert(session_id, entry);
        Ok(view)
    }

    fn status_at(
        &self,
        session_id: Uuid,
        challenge: &str,
        now: DateTime<Utc>,
    ) -> Result<QrLoginSession, AuthError> {
        let entry = self
            .entries
            .get(&session_id)
            .ok_or(AuthError::InvalidSession)?;
        if !entry.matches(challenge) {
            return Err(AuthError::InvalidSession);
        }
        Ok(entry.view(session_id, now))
    }

    fn approve_at(
        &self,
        session_id: Uuid,
        challenge: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<QrLoginSession, AuthError> {
        let mut entry = self
            .entries
            .get_mut(&session_id)
            .ok_or(AuthError::InvalidSession)?;
        if !entry.matches(challenge) {
            return Err(AuthError::InvalidSession);
        }
        let state = entry.state;
        match state {
            QrState::Consumed { .. } => return Err(AuthError::QrLoginConsumed),
            _ if entry.is_expired(now) => return Err(AuthError::QrLoginExpired),
            QrState::Pending => entry.state = QrState::Approved { user_id },
            QrState::Approved { user_id: approver } | QrState::Processing { user_id: approver }
                if approver == user_id => {}
            QrState::Approved { .. } | QrState::Processing { .. } => {
                return Err(AuthError::InvalidSession);
            }
        }
        Ok(entry.view(session_id, now))
    }

    fn claim_at(
        &self,
        session_id: Uuid,
        challenge: &str,
        now: DateTime<Utc>,
    ) -> Result<Uuid, AuthError> {
        let mut entry = self
            .entries
            .get_mut(&session_id)
            .ok_or(AuthError::InvalidSession)?;
        if !entry.matches(challenge) {
            return Err(AuthError::InvalidSession);
        }
        let state = entry.state;
        match state {
            QrState::Consumed { .. } => Err(AuthError::QrLoginConsumed),
            _ if entry.is_expired(now) => Err(AuthError::QrLoginExpired),
            QrState::Pending => Err(AuthError::QrLoginNotApproved),
            // Someone else is mid-consume; they win or release.
            QrState::Processing { .. } => Err(AuthError::QrLoginConsumed),
            QrState::Approved { user_id } => {
                entry.state = QrState::Processing { user_id };
                Ok(user_id)
            }
        }
    }

    fn finish_at(&self, session_id: Uuid, now: DateTime<Utc>) {
        if let Some(mut entry) = self.entries.get_mut(&session_id) {
            entry.state = QrState::Consumed { at: now };
        }
    }

    fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let retention = Duration::seconds(CONSUMED_RETENTION_SECS);
        self.entries.retain(|_, entry| match entry.state {
            QrState::Consumed { at } => now - at < retention,
            // Never pull an entry out from under an in-flight consume.
            QrState::Processing { .. } => true,
            QrState::Pending | QrState::Approved { .. } => !entry.is_expired(now),
        });
        before.saturating_sub(self.entries.len())
    }
}

/// `agrinova://login?...` deep link scanned by the mobile app. The
/// challenge is base64url and needs no escaping.
fn qr_payload(session_id: Uuid, challenge: &str, expires_at: DateTime<Utc>) -> String {
    format!(
        "agrinova://login?challenge={challenge}&exp={}&sessionId={session_id}&v=1",
        expires_at.timestamp()
    )
}
