//! Authentication service: the login orchestrators for both platforms
//! plus the account-wide operations they share.
//!
//! Generic over repository implementations so that the auth layer
//! has no dependency on the database crate.

mod mobile;
mod web;

use std::sync::Arc;

use agrinova_core::error::{AgrinovaError, AgrinovaResult};
use agrinova_core::models::security_event::{
    NewSecurityEvent, SecurityEvent, SecurityEventKind, Severity,
};
use agrinova_core::models::user::User;
use agrinova_core::repository::{
    AssignmentRepository, DeviceRepository, PaginatedResult, Pagination, SecurityEventFilter,
    SecurityEventRepository, TokenRepository, UserRepository, WebSessionRepository,
};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::SecurityAuditSink;
use crate::config::AuthConfig;
use crate::credential::{Credential, CredentialVerifier, RejectReason, Verification};
use crate::device::DeviceBindingManager;
use crate::error::AuthError;
use crate::events::{AuthEventBus, SessionEvent};
use crate::password;
use crate::qr_login::QrLoginStore;
use crate::rate_limit::LoginRateLimiter;
use crate::scope::AssignmentResolver;
use crate::token_service::TokenService;
use crate::web_session::WebSessionManager;

pub use mobile::{
    DeviceRenewInput, DeviceRenewOutput, MobileLoginInput, MobileLoginOutput, OfflineAccess,
    RefreshInput, RefreshOutput,
};
pub use web::{MeOutput, QrLoginApproval, WebLoginInput, WebLoginOutput};

/// Where a request came from, as far as the transport layer knows.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// The persistence backends the service is built from.
pub struct AuthStores<U, A, D, T, W, E> {
    pub users: U,
    pub assignments: A,
    pub devices: D,
    pub tokens: T,
    pub web_sessions: W,
    pub security_events: E,
}

pub struct AuthService<U, A, D, T, W, E>
where
    U: UserRepository + Clone,
    A: AssignmentRepository,
    D: DeviceRepository,
    T: TokenRepository,
    W: WebSessionRepository,
    E: SecurityEventRepository + Clone,
{
    config: Arc<AuthConfig>,
    users: U,
    credentials: CredentialVerifier<U>,
    assignments: AssignmentResolver<A>,
    devices: DeviceBindingManager<D, E>,
    tokens: TokenService<T>,
    sessions: WebSessionManager<W>,
    audit: SecurityAuditSink<E>,
    limiter: LoginRateLimiter,
    qr_logins: QrLoginStore,
    events: AuthEventBus,
}

impl<U, A, D, T, W, E> AuthService<U, A, D, T, W, E>
where
    U: UserRepository + Clone,
    A: AssignmentRepository,
    D: DeviceRepository,
    T: TokenRepository,
    W: WebSessionRepository,
    E: SecurityEventRepository + Clone,
{
    /// Fails with `Config` if the configuration would issue unusable
    /// credentials.
    pub fn new(stores: AuthStores<U, A, D, T, W, E>, config: AuthConfig) -> AgrinovaResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let audit = SecurityAuditSink::new(stores.security_events);

        Ok(Self {
            credentials: CredentialVerifier::new(stores.users.clone(), config.pepper.clone()),
            users: stores.users,
            assignments: AssignmentResolver::new(stores.assignments),
            devices: DeviceBindingManager::new(stores.devices, audit.clone()),
            tokens: TokenService::new(stores.tokens, Arc::clone(&config)),
            sessions: WebSessionManager::new(stores.web_sessions, Arc::clone(&config)),
            limiter: LoginRateLimiter::new(&config.rate_limit),
            qr_logins: QrLoginStore::new(config.qr_login_lifetime_secs),
            events: AuthEventBus::default(),
            audit,
            config,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Subscribe to session lifecycle events (logouts, unbinds,
    /// revocations).
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Newest first.
    pub async fn list_security_events(
        &self,
        filter: SecurityEventFilter,
        pagination: Pagination,
    ) -> AgrinovaResult<PaginatedResult<SecurityEvent>> {
        self.audit.store().list(filter, pagination).await
    }

    /// Drop lapsed login-throttling entries.
    pub fn prune_login_limits(&self) {
        self.limiter.prune();
    }

    /// Drop expired QR logins and long-consumed ones. Returns how many
    /// were removed.
    pub fn prune_qr_logins(&self) -> usize {
        self.qr_logins.prune()
    }

    /// Verify a login credential. Rejections are audited with their
    /// precise reason and surface as the reason's public error.
    async fn verify_login(
        &self,
        identifier: &str,
        credential: &Credential,
        platform: &'static str,
        client: &ClientContext,
    ) -> AgrinovaResult<Result<User, RejectReason>> {
        match self.credentials.verify(identifier, credential).await? {
            Verification::Verified(user) => Ok(Ok(user)),
            Verification::Rejected { reason, user_id } => {
                info!(platform, reason = reason.as_str(), "Login rejected");
                self.audit_login_failure(reason.as_str(), user_id, platform, client)
                    .await;
                Ok(Err(reason))
            }
        }
    }

    async fn audit_login_failure(
        &self,
        reason: &str,
        user_id: Option<Uuid>,
        platform: &'static str,
        client: &ClientContext,
    ) {
        let mut event = NewSecurityEvent::new(SecurityEventKind::LoginFailure)
            .client(client.ip_address.clone(), client.user_agent.clone())
            .detail("reason", reason)
            .detail("platform", platform);
        if let Some(user_id) = user_id {
            event = event.user(user_id);
        }
        self.audit.record(event).await;
    }

    /// The user behind a token or session, provided they still exist
    /// and are active.
    async fn active_user(&self, user_id: Uuid) -> AgrinovaResult<User> {
        match self.users.get_by_id(user_id).await {
            Ok(user) if user.is_active => Ok(user),
            Ok(_) => Err(AuthError::UserNotFound.into()),
            Err(e) if e.is_not_found() => Err(AuthError::UserNotFound.into()),
            Err(e) => Err(e),
        }
    }

    /// Replace the password of an active user.
    ///
    /// Every token and web session of the user is revoked on success.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        client: &ClientContext,
    ) -> AgrinovaResult<()> {
        let user = self.active_user(user_id).await?;

        if !self.credentials.verify_password(&user, current_password)? {
            warn!(%user_id, "Password change with wrong current password");
            self.audit
                .record(
                    NewSecurityEvent::new(SecurityEventKind::SuspiciousActivity)
                        .severity(Severity::Warning)
                        .user(user_id)
                        .client(client.ip_address.clone(), client.user_agent.clone())
                        .detail("reason", "wrong_current_password"),
                )
                .await;
            return Err(AuthError::InvalidCredentials.into());
        }
        password::check_password_policy(new_password, self.config.min_password_length)?;

        self.users.set_password(user_id, new_password).await?;
        let tokens = self.tokens.revoke_user_tokens(user_id).await?;
        let sessions = self
            .sessions
            .revoke_for_user(user_id, Some(user_id), "password_change")
            .await?;

        info!(%user_id, tokens, sessions, "Password changed");
        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::PasswordChange)
                    .user(user_id)
                    .client(client.ip_address.clone(), client.user_agent.clone())
                    .detail("revoked_tokens", tokens)
                    .detail("revoked_sessions", sessions),
            )
            .await;
        self.events
            .publish(SessionEvent::UserSignedOutEverywhere { user_id });
        Ok(())
    }

    /// Sign the user out of every device and every browser.
    pub async fn logout_all_devices(
        &self,
        user_id: Uuid,
        client: &ClientContext,
    ) -> AgrinovaResult<()> {
        let tokens = self.tokens.revoke_user_tokens(user_id).await?;
        let sessions = self
            .sessions
            .revoke_for_user(user_id, Some(user_id), "logout_all")
            .await?;

        info!(%user_id, tokens, sessions, "Signed out everywhere");
        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::Logout)
                    .user(user_id)
                    .client(client.ip_address.clone(), client.user_agent.clone())
                    .detail("scope", "all")
                    .detail("revoked_tokens", tokens)
                    .detail("revoked_sessions", sessions),
            )
            .await;
        self.events
            .publish(SessionEvent::UserSignedOutEverywhere { user_id });
        Ok(())
    }
}

/// Public error for a rejected credential.
fn rejection(reason: RejectReason) -> AgrinovaError {
    reason.into_error().into()
}

