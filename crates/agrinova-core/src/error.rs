//! Error types for the Agrinova auth core.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of authentication failure kinds surfaced to callers.
///
/// Callers match on the kind, never on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorKind {
    InvalidCredentials,
    WebAccessDenied,
    MobileAccessDenied,
    InvalidToken,
    InvalidSession,
    DeviceNotFound,
    DeviceNotAuthorized,
    DeviceAlreadyBound,
    DeviceFingerprintMismatch,
    NoAssignments,
    NoCompany,
    UserNotFound,
    NotImplemented,
    RateLimited,
    WeakPassword,
    QrLoginExpired,
    QrLoginNotApproved,
    QrLoginConsumed,
}

impl AuthErrorKind {
    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::WebAccessDenied => "WEB_ACCESS_DENIED",
            Self::MobileAccessDenied => "MOBILE_ACCESS_DENIED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidSession => "INVALID_SESSION",
            Self::DeviceNotFound => "DEVICE_NOT_FOUND",
            Self::DeviceNotAuthorized => "DEVICE_NOT_AUTHORIZED",
            Self::DeviceAlreadyBound => "DEVICE_ALREADY_BOUND",
            Self::DeviceFingerprintMismatch => "DEVICE_FINGERPRINT_MISMATCH",
            Self::NoAssignments => "NO_ASSIGNMENTS",
            Self::NoCompany => "NO_COMPANY",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::RateLimited => "RATE_LIMITED",
            Self::WeakPassword => "WEAK_PASSWORD",
            Self::QrLoginExpired => "QR_LOGIN_EXPIRED",
            Self::QrLoginNotApproved => "QR_LOGIN_NOT_APPROVED",
            Self::QrLoginConsumed => "QR_LOGIN_CONSUMED",
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
pub enum AgrinovaError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    /// A conditional write lost its race (e.g. a token consumed twice).
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Authentication failed [{kind}]{}", message_suffix(.message))]
    Auth {
        kind: AuthErrorKind,
        message: Option<String>,
    },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgrinovaError {
    pub fn auth(kind: AuthErrorKind) -> Self {
        Self::Auth {
            kind,
            message: None,
        }
    }

    /// The authentication kind, if this is an authentication failure.
    pub fn auth_kind(&self) -> Option<AuthErrorKind> {
        match self {
            Self::Auth { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

fn message_suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

pub type AgrinovaResult<T> = Result<T, AgrinovaError>;
