//! Credential verification.
//!
//! Every password rejection surfaces to the caller as the same
//! `InvalidCredentials`, while the precise reason is kept for the audit
//! log. Biometric assertions are refused before any account lookup, so
//! their answer does not depend on the identifier either.

use agrinova_core::error::AgrinovaResult;
use agrinova_core::models::user::User;
use agrinova_core::repository::UserRepository;
use uuid::Uuid;

use crate::error::AuthError;
use crate::password;

/// The secret presented at login.
#[derive(Debug, Clone)]
pub enum Credential {
    Password(String),
    /// Assertion produced by the device's biometric unlock.
    Biometric(String),
}

/// Why a credential was refused. Only ever written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UserNotFound,
    UserInactive,
    InvalidPassword,
    BiometricNotImplemented,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::UserNotFound => "user_not_found",
            RejectReason::UserInactive => "user_inactive",
            RejectReason::InvalidPassword => "invalid_password",
            RejectReason::BiometricNotImplemented => "biometric_not_implemented",
        }
    }

    /// What the caller is told.
    pub fn into_error(self) -> AuthError {
        match self {
            RejectReason::BiometricNotImplemented => AuthError::NotImplemented("biometric login"),
            _ => AuthError::InvalidCredentials,
        }
    }
}

#[derive(Debug)]
pub enum Verification {
    Verified(User),
    Rejected {
        reason: RejectReason,
        user_id: Option<Uuid>,
    },
}

#[derive(Clone)]
pub struct CredentialVerifier<U: UserRepository> {
    users: U,
    pepper: Option<String>,
}

impl<U: UserRepository> CredentialVerifier<U> {
    pub fn new(users: U, pepper: Option<String>) -> Self {
        Self { users, pepper }
    }

    /// Check `credential` for the user known by `identifier` (username or
    /// email, case-insensitive).
    ///
    /// Store failures propagate; every credential problem comes back as
    /// [`Verification::Rejected`].
    pub async fn verify(
        &self,
        identifier: &str,
        credential: &Credential,
    ) -> AgrinovaResult<Verification> {
        // Assertion checking does not exist yet; never fall through to
        // another credential.
        let candidate = match credential {
            Credential::Password(candidate) => candidate,
            Credential::Biometric(_) => {
                return Ok(Verification::Rejected {
                    reason: RejectReason::BiometricNotImplemented,
                    user_id: None,
                });
            }
        };

        let user = match self.users.get_by_identifier(identifier).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                return Ok(Verification::Rejected {
                    reason: RejectReason::UserNotFound,
                    user_id: None,
                });
            }
            Err(e) => return Err(e),
        };

        let user_id = Some(user.id);
        let reject = |reason: RejectReason| -> AgrinovaResult<Verification> {
            Ok(Verification::Rejected { reason, user_id })
        };

        if !user.is_active {
            return reject(RejectReason::UserInactive);
        }

        if !self.verify_password(&user, candidate)? {
            return reject(RejectReason::InvalidPassword);
        }

        Ok(Verification::Verified(user))
    }

    /// Plain password check for an already-identified user.
    pub fn verify_password(&self, user: &User, candidate: &str) -> Result<bool, AuthError> {
        password::verify_password(candidate, &user.password_hash, self.pepper.as_deref())
    }
}
