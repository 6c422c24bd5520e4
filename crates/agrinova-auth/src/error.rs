//! Authentication error types.

use agrinova_core::error::{AgrinovaError, AuthErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("role may not sign in to the web dashboard")]
    WebAccessDenied,

    #[error("role may not sign in from the mobile app")]
    MobileAccessDenied,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("invalid session")]
    InvalidSession,

    #[error("device not found")]
    DeviceNotFound,

    #[error("device not authorized")]
    DeviceNotAuthorized,

    #[error("device already bound")]
    DeviceAlreadyBound,

    #[error("device fingerprint mismatch")]
    DeviceFingerprintMismatch,

    #[error("account has no active assignments")]
    NoAssignments,

    #[error("account is not affiliated with a company")]
    NoCompany,

    #[error("user not found")]
    UserNotFound,

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("too many failed attempts, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("password must be at least {min_length} characters")]
    WeakPassword { min_length: usize },

    #[error("QR login has expired")]
    QrLoginExpired,

    #[error("QR login has not been approved")]
    QrLoginNotApproved,

    #[error("QR login was already used")]
    QrLoginConsumed,

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// The caller-facing failure kind, or `None` for internal faults.
    pub fn kind(&self) -> Option<AuthErrorKind> {
        let kind = match self {
            AuthError::InvalidCredentials => AuthErrorKind::InvalidCredentials,
            AuthError::WebAccessDenied => AuthErrorKind::WebAccessDenied,
            AuthError::MobileAccessDenied => AuthErrorKind::MobileAccessDenied,
            AuthError::TokenExpired | AuthError::TokenInvalid(_) => AuthErrorKind::InvalidToken,
            AuthError::InvalidSession => AuthErrorKind::InvalidSession,
            AuthError::DeviceNotFound => AuthErrorKind::DeviceNotFound,
            AuthError::DeviceNotAuthorized => AuthErrorKind::DeviceNotAuthorized,
            AuthError::DeviceAlreadyBound => AuthErrorKind::DeviceAlreadyBound,
            AuthError::DeviceFingerprintMismatch => AuthErrorKind::DeviceFingerprintMismatch,
            AuthError::NoAssignments => AuthErrorKind::NoAssignments,
            AuthError::NoCompany => AuthErrorKind::NoCompany,
            AuthError::UserNotFound => AuthErrorKind::UserNotFound,
            AuthError::NotImplemented(_) => AuthErrorKind::NotImplemented,
            AuthError::RateLimited { .. } => AuthErrorKind::RateLimited,
            AuthError::WeakPassword { .. } => AuthErrorKind::WeakPassword,
            AuthError::QrLoginExpired => AuthErrorKind::QrLoginExpired,
            AuthError::QrLoginNotApproved => AuthErrorKind::QrLoginNotApproved,
            AuthError::QrLoginConsumed => AuthErrorKind::QrLoginConsumed,
            AuthError::Crypto(_) | AuthError::Config(_) => return None,
        };
        Some(kind)
    }
}

impl From<AuthError> for AgrinovaError {
    fn from(err: AuthError) -> Self {
        match err.kind() {
            Some(kind) => {
                // Token parse details stay server-side.
                let message = match &err {
                    AuthError::NotImplemented(_)
                    | AuthError::RateLimited { .. }
                    | AuthError::WeakPassword { .. } => Some(err.to_string()),
                    _ => None,
                };
                AgrinovaError::Auth { kind, message }
            }
            None => match err {
                AuthError::Config(msg) => AgrinovaError::Config(msg),
                other => AgrinovaError::Crypto(other.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_collapse_to_invalid_token() {
        let expired: AgrinovaError = AuthError::TokenExpired.into();
        let garbled: AgrinovaError = AuthError::TokenInvalid("bad base64".into()).into();
        assert_eq!(expired.auth_kind(), Some(AuthErrorKind::InvalidToken));
        assert_eq!(garbled.auth_kind(), Some(AuthErrorKind::InvalidToken));
        assert!(!garbled.to_string().contains("base64"));
    }

    #[test]
    fn internal_faults_are_not_auth_failures() {
        let err: AgrinovaError = AuthError::Crypto("bad key".into()).into();
        assert!(matches!(err, AgrinovaError::Crypto(_)));
        let err: AgrinovaError = AuthError::Config("missing".into()).into();
        assert!(matches!(err, AgrinovaError::Config(_)));
    }

    #[test]
    fn rate_limit_keeps_retry_hint() {
        let err: AgrinovaError = AuthError::RateLimited {
            retry_after_secs: 42,
        }
        .into();
        assert_eq!(err.auth_kind(), Some(AuthErrorKind::RateLimited));
        assert!(err.to_string().contains("42s"));
    }
}
