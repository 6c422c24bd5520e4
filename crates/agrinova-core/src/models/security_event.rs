//! Security event domain model (append-only audit facts).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventKind {
    LoginSuccess,
    LoginFailure,
    Logout,
    PasswordChange,
    DeviceBind,
    DeviceUnbind,
    DeviceTrust,
    SessionRevoked,
    SuspiciousActivity,
}

impl SecurityEventKind {
    pub const ALL: [SecurityEventKind; 9] = [
        SecurityEventKind::LoginSuccess,
        SecurityEventKind::LoginFailure,
        SecurityEventKind::Logout,
        SecurityEventKind::PasswordChange,
        SecurityEventKind::DeviceBind,
        SecurityEventKind::DeviceUnbind,
        SecurityEventKind::DeviceTrust,
        SecurityEventKind::SessionRevoked,
        SecurityEventKind::SuspiciousActivity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SecurityEventKind::LoginSuccess => "LOGIN_SUCCESS",
            SecurityEventKind::LoginFailure => "LOGIN_FAILURE",
            SecurityEventKind::Logout => "LOGOUT",
            SecurityEventKind::PasswordChange => "PASSWORD_CHANGE",
            SecurityEventKind::DeviceBind => "DEVICE_BIND",
            SecurityEventKind::DeviceUnbind => "DEVICE_UNBIND",
            SecurityEventKind::DeviceTrust => "DEVICE_TRUST",
            SecurityEventKind::SessionRevoked => "SESSION_REVOKED",
            SecurityEventKind::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Info, Severity::Warning, Severity::Critical];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub kind: SecurityEventKind,
    pub severity: Severity,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A security event about to be recorded.
///
/// Built fluently:
///
/// ```
/// use agrinova_core::models::security_event::{NewSecurityEvent, SecurityEventKind, Severity};
///
/// let event = NewSecurityEvent::new(SecurityEventKind::SuspiciousActivity)
///     .severity(Severity::Critical)
///     .detail("reason", "device_fingerprint_mismatch");
/// assert_eq!(event.details["reason"], "device_fingerprint_mismatch");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSecurityEvent {
    pub kind: SecurityEventKind,
    pub severity: Severity,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
}

impl NewSecurityEvent {
    pub fn new(kind: SecurityEventKind) -> Self {
        Self {
            kind,
            severity: Severity::Info,
            user_id: None,
            ip_address: None,
            user_agent: None,
            details: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let serde_json::Value::Object(ref mut map) = self.details {
            map.insert(key.to_string(), value.into());
        }
        self
    }
}
