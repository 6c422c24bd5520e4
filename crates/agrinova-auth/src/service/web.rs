//! Web dashboard orchestration: password and QR-code login, cookie
//! sessions, CSRF and session administration.

use agrinova_core::error::AgrinovaResult;
use agrinova_core::models::assignment::Assignment;
use agrinova_core::models::device::Platform;
use agrinova_core::models::scope::AuthorizedScope;
use agrinova_core::models::security_event::{NewSecurityEvent, SecurityEventKind, Severity};
use agrinova_core::models::user::User;
use agrinova_core::models::web_session::WebSession;
use agrinova_core::repository::{
    AssignmentRepository, DeviceRepository, SecurityEventRepository, TokenRepository,
    UserRepository, WebSessionRepository,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AuthService, ClientContext, rejection};
use crate::credential::Credential;
use crate::error::AuthError;
use crate::events::SessionEvent;
use crate::qr_login::QrLoginSession;
use crate::rate_limit::strip_port;
use crate::web_session::{ClientInfo, CookieSpec};

const PLATFORM_WEB: &str = "WEB";
const LOGIN_METHOD_PASSWORD: &str = "PASSWORD";
const LOGIN_METHOD_QR: &str = "QR_CODE";

#[derive(Debug, Clone)]
pub struct WebLoginInput {
    /// Username or email.
    pub identifier: String,
    pub password: String,
    pub remember_me: bool,
    /// Browser fingerprint, stored as the session's device id.
    pub fingerprint: Option<String>,
    pub client: ClientContext,
}

#[derive(Debug, Clone)]
pub struct WebLoginOutput {
    pub session_id: Uuid,
    /// Raw session token; the value of the session cookie.
    pub session_token: String,
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
    pub assignments: Vec<Assignment>,
    pub company_ids: Vec<Uuid>,
    pub scope: AuthorizedScope,
    /// Session cookie, then CSRF cookie.
    pub cookies: [CookieSpec; 2],
}

#[derive(Debug, Clone)]
pub struct QrLoginApproval {
    pub session_id: Uuid,
    pub challenge: String,
    /// Access token of the signed-in mobile user.
    pub access_token: String,
    pub client: ClientContext,
}

#[derive(Debug, Clone)]
pub struct MeOutput {
    pub user: User,
    pub session: WebSession,
    pub assignments: Vec<Assignment>,
    pub company_ids: Vec<Uuid>,
    pub scope: AuthorizedScope,
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
    /// Password login for the dashboard. Failed attempts are throttled
    /// per client address.
    pub async fn web_login(&self, input: WebLoginInput) -> AgrinovaResult<WebLoginOutput> {
        let limiter_key = input
            .client
            .ip_address
            .as_deref()
            .map(|ip| strip_port(ip).to_string());

        if let Some(key) = limiter_key.as_deref() {
            if let Err(retry_after) = self.limiter.check(key) {
                return Err(AuthError::RateLimited {
                    retry_after_secs: retry_after.as_secs().max(1),
                }
                .into());
            }
        }

        let credential = Credential::Password(input.password);
        let user = match self
            .verify_login(&input.identifier, &credential, PLATFORM_WEB, &input.client)
            .await?
        {
            Ok(user) => user,
            Err(reason) => {
                let tripped = limiter_key
                    .as_deref()
                    .is_some_and(|key| self.limiter.record_failure(key));
                if tripped {
                    warn!(client = ?limiter_key, "Web login rate limit tripped");
                    self.audit
                        .record(
                            NewSecurityEvent::new(SecurityEventKind::SuspiciousActivity)
                                .severity(Severity::Warning)
                                .client(
                                    input.client.ip_address.clone(),
                                    input.client.user_agent.clone(),
                                )
                                .detail("reason", "login_rate_limited")
                                .detail("identifier", input.identifier.as_str()),
                        )
                        .await;
                    return Err(AuthError::RateLimited {
                        retry_after_secs: self.config.rate_limit.block_secs.max(1),
                    }
                    .into());
                }
                return Err(rejection(reason));
            }
        };

        if !self.config.allows_web(user.role) {
            self.audit_login_failure(
                "web_access_denied",
                Some(user.id),
                PLATFORM_WEB,
                &input.client,
            )
            .await;
            return Err(AuthError::WebAccessDenied.into());
        }
        if let Some(key) = limiter_key.as_deref() {
            self.limiter.reset(key);
        }

        self.open_web_session(
            user,
            LOGIN_METHOD_PASSWORD,
            input.remember_me,
            input.fingerprint,
            input.client,
        )
        .await
    }

    /// Start a QR login. The browser renders `qr_data` and polls with
    /// the returned challenge.
    pub fn create_qr_login(&self) -> AgrinovaResult<QrLoginSession> {
        let qr = self.qr_logins.create()?;
        debug!(session_id = %qr.session_id, "QR login created");
        Ok(qr)
    }

    pub fn get_qr_login_status(
        &self,
        session_id: Uuid,
        challenge: &str,
    ) -> AgrinovaResult<QrLoginSession> {
        Ok(self.qr_logins.status(session_id, challenge)?)
    }

    /// Approve a QR login from the mobile app. The approver must hold a
    /// valid access token and a role allowed on the web dashboard.
    pub async fn approve_qr_login(&self, input: QrLoginApproval) -> AgrinovaResult<QrLoginSession> {
        let claims = self.tokens.validate_access_token(&input.access_token)?;
        let user = self.active_user(claims.user_id()?).await?;
        if !self.config.allows_web(user.role) {
            self.audit_login_failure(
                "web_access_denied",
                Some(user.id),
                PLATFORM_WEB,
                &input.client,
            )
            .await;
            return Err(AuthError::WebAccessDenied.into());
        }

        let qr = self
            .qr_logins
            .approve(input.session_id, &input.challenge, user.id)?;
        info!(user_id = %user.id, session_id = %input.session_id, "QR login approved");
        Ok(qr)
    }

    /// Exchange an approved QR login for a web session of the approving
    /// user. Succeeds at most once per QR login.
    pub async fn consume_qr_login(
        &self,
        session_id: Uuid,
        challenge: &str,
        client: ClientContext,
    ) -> AgrinovaResult<WebLoginOutput> {
        let user_id = self.qr_logins.claim(session_id, challenge)?;

        match self.open_qr_session(user_id, client).await {
            Ok(output) => {
                self.qr_logins.finish(session_id);
                Ok(output)
            }
            Err(e) => {
                warn!(%session_id, %user_id, error = %e, "QR login consume failed");
                self.qr_logins.release(session_id);
                Err(e)
            }
        }
    }

    async fn open_qr_session(
        &self,
        user_id: Uuid,
        client: ClientContext,
    ) -> AgrinovaResult<WebLoginOutput> {
        // The approver may have been deactivated or re-roled since.
        let user = self.active_user(user_id).await?;
        if !self.config.allows_web(user.role) {
            return Err(AuthError::WebAccessDenied.into());
        }
        self.open_web_session(user, LOGIN_METHOD_QR, false, None, client)
            .await
    }

    async fn open_web_session(
        &self,
        user: User,
        login_method: &str,
        remember_me: bool,
        fingerprint: Option<String>,
        client: ClientContext,
    ) -> AgrinovaResult<WebLoginOutput> {
        let resolved = self.assignments.resolve(user.id, user.role).await?;
        let issued = self
            .sessions
            .create_session(
                user.id,
                login_method,
                remember_me,
                ClientInfo {
                    fingerprint,
                    ip_address: client.ip_address.clone(),
                    user_agent: client.user_agent.clone(),
                },
            )
            .await?;

        info!(user_id = %user.id, session_id = %issued.session.id, role = %user.role, login_method, "Web login succeeded");
        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::LoginSuccess)
                    .user(user.id)
                    .client(client.ip_address, client.user_agent)
                    .detail("platform", Platform::Web.as_str())
                    .detail("session_id", issued.session.id.to_string())
                    .detail("login_method", login_method)
                    .detail("remember_me", remember_me),
            )
            .await;

        Ok(WebLoginOutput {
            session_id: issued.session.id,
            session_token: issued.session_token,
            csrf_token: issued.csrf_token,
            expires_at: issued.session.expires_at,
            user,
            assignments: resolved.assignments,
            company_ids: resolved.company_ids,
            scope: resolved.scope,
            cookies: issued.cookies,
        })
    }

    /// Resolve a session cookie; rejects unknown, revoked, inactive and
    /// expired sessions with `InvalidSession`.
    pub async fn validate_session(&self, session_token: &str) -> AgrinovaResult<WebSession> {
        self.sessions.validate_session(session_token).await
    }

    pub fn validate_csrf(&self, session: &WebSession, csrf_token: &str) -> AgrinovaResult<()> {
        Ok(self.sessions.validate_csrf(session, csrf_token)?)
    }

    pub async fn get_me(&self, session_token: &str) -> AgrinovaResult<MeOutput> {
        let session = self.sessions.validate_session(session_token).await?;
        let user = self.active_user(session.user_id).await?;
        let resolved = self.assignments.resolve(user.id, user.role).await?;

        Ok(MeOutput {
            user,
            session,
            assignments: resolved.assignments,
            company_ids: resolved.company_ids,
            scope: resolved.scope,
        })
    }

    /// Revoke the caller's own session. Returns the cookies that clear
    /// it from the browser.
    pub async fn web_logout(
        &self,
        session_id: Uuid,
        client: &ClientContext,
    ) -> AgrinovaResult<[CookieSpec; 2]> {
        let session = self.sessions.get(session_id).await?;
        let session = self
            .sessions
            .revoke(session.id, Some(session.user_id), "logout")
            .await?;

        info!(user_id = %session.user_id, %session_id, "Web logout");
        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::Logout)
                    .user(session.user_id)
                    .client(client.ip_address.clone(), client.user_agent.clone())
                    .detail("platform", PLATFORM_WEB)
                    .detail("session_id", session_id.to_string()),
            )
            .await;
        self.events.publish(SessionEvent::WebSessionRevoked {
            user_id: session.user_id,
            session_id,
        });
        Ok(self.sessions.clearing_cookies())
    }

    /// Administrative revocation of one session.
    pub async fn revoke_session(
        &self,
        session_id: Uuid,
        revoked_by: Uuid,
        reason: &str,
    ) -> AgrinovaResult<WebSession> {
        let session = self
            .sessions
            .revoke(session_id, Some(revoked_by), reason)
            .await?;

        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::SessionRevoked)
                    .user(session.user_id)
                    .detail("session_id", session_id.to_string())
                    .detail("revoked_by", revoked_by.to_string())
                    .detail("reason", reason),
            )
            .await;
        self.events.publish(SessionEvent::WebSessionRevoked {
            user_id: session.user_id,
            session_id,
        });
        Ok(session)
    }

    /// Administrative revocation of every session of a user.
    pub async fn revoke_all_user_sessions(
        &self,
        user_id: Uuid,
        revoked_by: Uuid,
        reason: &str,
    ) -> AgrinovaResult<u64> {
        let active = self.sessions.list_active(user_id).await?;
        let revoked = self
            .sessions
            .revoke_for_user(user_id, Some(revoked_by), reason)
            .await?;

        info!(%user_id, %revoked_by, revoked, "Revoked all web sessions");
        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::SessionRevoked)
                    .user(user_id)
                    .detail("scope", "all")
                    .detail("revoked_by", revoked_by.to_string())
                    .detail("reason", reason)
                    .detail("count", revoked),
            )
            .await;
        for session in active {
            self.events.publish(SessionEvent::WebSessionRevoked {
                user_id,
                session_id: session.id,
            });
        }
        Ok(revoked)
    }

    /// Mark expired sessions inactive. Meant to be driven by an external
    /// scheduler.
    pub async fn expire_stale_sessions(&self) -> AgrinovaResult<u64> {
        let expired = self.sessions.expire_stale().await?;
        if expired > 0 {
            info!(expired, "Expired stale web sessions");
        }
        Ok(expired)
    }
}
