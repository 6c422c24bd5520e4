//! Mobile login orchestration: login, refresh, device renew, logout and
//! the device binding operations exposed to the app.

use agrinova_core::error::{AgrinovaError, AgrinovaResult};
use agrinova_core::models::assignment::Assignment;
use agrinova_core::models::device::{DeviceBinding, DeviceInfo, Platform};
use agrinova_core::models::scope::AuthorizedScope;
use agrinova_core::models::security_event::{NewSecurityEvent, SecurityEventKind, Severity};
use agrinova_core::models::token::TokenRecord;
use agrinova_core::models::user::User;
use agrinova_core::repository::{
    AssignmentRepository, DeviceRepository, SecurityEventRepository, TokenRepository,
    UserRepository, WebSessionRepository,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::{AuthService, ClientContext, rejection};
use crate::credential::Credential;
use crate::device::{BindDeviceInput, DeviceClaim};
use crate::error::AuthError;
use crate::events::SessionEvent;
use crate::scope::ResolvedAssignments;
use crate::token::{TokenClaims, TokenSubject};
use crate::token_service::{TokenPair, ensure_live};

const PLATFORM_MOBILE: &str = "MOBILE";

#[derive(Debug, Clone)]
pub struct MobileLoginInput {
    /// Username or email.
    pub identifier: String,
    pub credential: Credential,
    pub platform: Platform,
    pub device_id: Option<String>,
    pub device_fingerprint: Option<String>,
    pub device_info: Option<DeviceInfo>,
    pub client: ClientContext,
}

#[derive(Debug, Clone)]
pub struct MobileLoginOutput {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub offline_token: String,
    pub offline_expires_at: DateTime<Utc>,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub user: User,
    pub assignments: Vec<Assignment>,
    pub scope: AuthorizedScope,
    pub device: DeviceBinding,
}

#[derive(Debug, Clone)]
pub struct RefreshInput {
    pub refresh_token: String,
    /// Cross-checked against the token's device claim when present.
    pub device_id: Option<String>,
    pub device_fingerprint: Option<String>,
    pub client: ClientContext,
}

#[derive(Debug, Clone)]
pub struct RefreshOutput {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub expires_in: u64,
    pub user: User,
    pub assignments: Vec<Assignment>,
    pub scope: AuthorizedScope,
}

#[derive(Debug, Clone)]
pub struct DeviceRenewInput {
    pub offline_token: String,
    pub device_id: String,
    pub device_fingerprint: Option<String>,
    pub client: ClientContext,
}

/// A new access/refresh pair. The offline token is returned exactly as
/// presented; it is never reissued here.
#[derive(Debug, Clone)]
pub struct DeviceRenewOutput {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub offline_token: String,
    pub offline_expires_at: DateTime<Utc>,
    pub expires_in: u64,
    pub user: User,
    pub assignments: Vec<Assignment>,
    pub scope: AuthorizedScope,
}

/// Result of an offline-token check.
#[derive(Debug, Clone)]
pub struct OfflineAccess {
    pub user: User,
    pub device_id: String,
    pub expires_at: DateTime<Utc>,
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
    /// Authenticate from the field app and issue a token triad bound to
    /// the device. Any tokens the device held before are revoked.
    pub async fn mobile_login(&self, input: MobileLoginInput) -> AgrinovaResult<MobileLoginOutput> {
        let device_id = match input.device_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(AgrinovaError::Validation {
                    message: "device_id is required for mobile login".into(),
                });
            }
        };

        let user = match self
            .verify_login(
                &input.identifier,
                &input.credential,
                PLATFORM_MOBILE,
                &input.client,
            )
            .await?
        {
            Ok(user) => user,
            Err(reason) => return Err(rejection(reason)),
        };

        if !self.config.allows_mobile(user.role) {
            self.audit_login_failure(
                "mobile_access_denied",
                Some(user.id),
                PLATFORM_MOBILE,
                &input.client,
            )
            .await;
            return Err(AuthError::MobileAccessDenied.into());
        }

        let device = self
            .devices
            .ensure_binding(
                user.id,
                &DeviceClaim {
                    device_id: device_id.clone(),
                    fingerprint: input.device_fingerprint.unwrap_or_default(),
                    platform: input.platform,
                    info: input.device_info,
                },
            )
            .await?;

        let resolved = self.assignments.resolve(user.id, user.role).await?;
        let company_id = resolved.require_home_company()?;

        let subject = TokenSubject {
            user_id: user.id,
            device_id: Some(device_id.clone()),
            role: user.role,
            company_id: Some(company_id),
        };
        let triad = self.tokens.issue_login_tokens(&subject).await?;
        self.devices.touch(&device).await;

        info!(user_id = %user.id, device_id = %device_id, role = %user.role, "Mobile login succeeded");
        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::LoginSuccess)
                    .user(user.id)
                    .client(input.client.ip_address, input.client.user_agent)
                    .detail("platform", input.platform.as_str())
                    .detail("device_id", device_id.as_str()),
            )
            .await;

        Ok(MobileLoginOutput {
            access_token: triad.access.token,
            access_expires_at: triad.access.expires_at,
            refresh_token: triad.refresh.token,
            refresh_expires_at: triad.refresh.expires_at,
            offline_token: triad.offline.token,
            offline_expires_at: triad.offline.expires_at,
            expires_in: self.tokens.access_token_lifetime_secs(),
            user,
            assignments: resolved.assignments,
            scope: resolved.scope,
            device,
        })
    }

    /// Rotate a refresh token. The presented token is consumed, so a
    /// retry with the same input fails with `InvalidToken`.
    pub async fn refresh_token(&self, input: RefreshInput) -> AgrinovaResult<RefreshOutput> {
        let (claims, record) = self
            .tokens
            .lookup_refresh_token(&input.refresh_token)
            .await?;
        let user_id = claims.user_id()?;
        let device_id = token_device(&record, claims.device_id.as_deref())?;

        if let Some(presented) = input.device_id.as_deref() {
            self.check_device_claim(user_id, &device_id, presented, "refresh", &input.client)
                .await?;
        }
        // An unbound device reports as such even though its tokens were
        // revoked along with it.
        self.devices.require_authorized(user_id, &device_id).await?;
        ensure_live(&record)?;

        let (user, resolved, subject) = self
            .revalidate(
                user_id,
                &device_id,
                input.device_fingerprint.as_deref(),
                "refresh",
            )
            .await?;

        let TokenPair { access, refresh } = self.tokens.rotate_pair(record.id, &subject).await?;
        info!(%user_id, device_id = %device_id, "Refresh token rotated");
        self.audit_token_renewal(user_id, &device_id, "refresh", &input.client)
            .await;

        Ok(RefreshOutput {
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
            expires_in: self.tokens.access_token_lifetime_secs(),
            user,
            assignments: resolved.assignments,
            scope: resolved.scope,
        })
    }

    /// Offline-to-online recovery. The offline record backing the token
    /// is consumed in the same transaction that issues the new pair.
    pub async fn device_renew(&self, input: DeviceRenewInput) -> AgrinovaResult<DeviceRenewOutput> {
        let record = self.tokens.lookup_offline_token(&input.offline_token).await?;
        let device_id = token_device(&record, None)?;

        self.check_device_claim(
            record.user_id,
            &device_id,
            &input.device_id,
            "device_renew",
            &input.client,
        )
        .await?;
        self.devices
            .require_authorized(record.user_id, &device_id)
            .await?;
        ensure_live(&record)?;

        let (user, resolved, subject) = self
            .revalidate(
                record.user_id,
                &device_id,
                input.device_fingerprint.as_deref(),
                "device_renew",
            )
            .await?;

        let TokenPair { access, refresh } = self.tokens.rotate_pair(record.id, &subject).await?;
        info!(user_id = %user.id, device_id = %device_id, "Device renewed from offline token");
        self.audit_token_renewal(user.id, &device_id, "device_renew", &input.client)
            .await;

        Ok(DeviceRenewOutput {
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
            offline_token: input.offline_token,
            offline_expires_at: record.expires_at,
            expires_in: self.tokens.access_token_lifetime_secs(),
            user,
            assignments: resolved.assignments,
            scope: resolved.scope,
        })
    }

    /// Refresh and renew count as sign-ins on the device.
    async fn audit_token_renewal(
        &self,
        user_id: Uuid,
        device_id: &str,
        method: &str,
        client: &ClientContext,
    ) {
        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::LoginSuccess)
                    .user(user_id)
                    .client(client.ip_address.clone(), client.user_agent.clone())
                    .detail("platform", PLATFORM_MOBILE)
                    .detail("device_id", device_id)
                    .detail("method", method),
            )
            .await;
    }

    /// Server-side check of an offline token for air-gapped
    /// authorization decisions. Nothing is consumed.
    pub async fn validate_offline_access(&self, offline_token: &str) -> AgrinovaResult<OfflineAccess> {
        let record = self.tokens.lookup_offline_token(offline_token).await?;
        let device_id = token_device(&record, None)?;

        self.devices
            .require_authorized(record.user_id, &device_id)
            .await?;
        ensure_live(&record)?;
        let user = self.active_user(record.user_id).await?;

        Ok(OfflineAccess {
            user,
            device_id,
            expires_at: record.expires_at,
        })
    }

    /// Stateless access-token check.
    pub fn validate_access_token(&self, access_token: &str) -> AgrinovaResult<TokenClaims> {
        self.tokens.validate_access_token(access_token)
    }

    /// Revoke every token of one device. The binding stays.
    pub async fn logout(
        &self,
        user_id: Uuid,
        device_id: &str,
        client: &ClientContext,
    ) -> AgrinovaResult<()> {
        self.devices.require(user_id, device_id).await?;
        let revoked = self.tokens.revoke_device_tokens(user_id, device_id).await?;

        info!(%user_id, device_id, revoked, "Mobile logout");
        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::Logout)
                    .user(user_id)
                    .client(client.ip_address.clone(), client.user_agent.clone())
                    .detail("platform", PLATFORM_MOBILE)
                    .detail("device_id", device_id),
            )
            .await;
        self.events.publish(SessionEvent::DeviceLoggedOut {
            user_id,
            device_id: device_id.to_string(),
        });
        Ok(())
    }

    pub async fn bind_device(
        &self,
        user_id: Uuid,
        input: BindDeviceInput,
    ) -> AgrinovaResult<DeviceBinding> {
        self.devices.bind(user_id, input).await
    }

    /// Revoke the binding and every token scoped to it.
    pub async fn unbind_device(&self, user_id: Uuid, device_id: &str) -> AgrinovaResult<()> {
        self.devices.unbind(user_id, device_id).await?;
        let revoked = self.tokens.revoke_device_tokens(user_id, device_id).await?;

        info!(%user_id, device_id, revoked, "Device unbound");
        self.events.publish(SessionEvent::DeviceUnbound {
            user_id,
            device_id: device_id.to_string(),
        });
        Ok(())
    }

    pub async fn trust_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        trusted_by: Uuid,
    ) -> AgrinovaResult<DeviceBinding> {
        self.devices.trust(user_id, device_id, trusted_by).await
    }

    pub async fn list_devices(&self, user_id: Uuid) -> AgrinovaResult<Vec<DeviceBinding>> {
        self.devices.list(user_id).await
    }

    /// A device id presented alongside a token must name the device the
    /// token was issued to.
    async fn check_device_claim(
        &self,
        user_id: Uuid,
        token_device_id: &str,
        presented: &str,
        stage: &'static str,
        client: &ClientContext,
    ) -> AgrinovaResult<()> {
        if presented == token_device_id {
            return Ok(());
        }
        warn!(%user_id, token_device_id, presented, stage, "Device id does not match token");
        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::SuspiciousActivity)
                    .severity(Severity::Warning)
                    .user(user_id)
                    .client(client.ip_address.clone(), client.user_agent.clone())
                    .detail("reason", "device_id_mismatch")
                    .detail("stage", stage)
                    .detail("device_id", token_device_id)
                    .detail("presented_device_id", presented),
            )
            .await;
        Err(AuthError::DeviceNotAuthorized.into())
    }

    /// Checks shared by refresh and renew: the user is still active, the
    /// device still authorized (and its fingerprint unchanged when one is
    /// presented), and the company claim reflects current assignments.
    async fn revalidate(
        &self,
        user_id: Uuid,
        device_id: &str,
        fingerprint: Option<&str>,
        stage: &'static str,
    ) -> AgrinovaResult<(User, ResolvedAssignments, TokenSubject)> {
        let user = self.active_user(user_id).await?;
        let device = self.devices.require_authorized(user_id, device_id).await?;
        if let Some(fingerprint) = fingerprint {
            self.devices
                .check_fingerprint(&device, fingerprint, stage)
                .await?;
        }
        self.devices.touch(&device).await;

        let resolved = self.assignments.resolve(user.id, user.role).await?;
        let subject = TokenSubject {
            user_id: user.id,
            device_id: Some(device_id.to_string()),
            role: user.role,
            company_id: resolved.home_company_id,
        };
        Ok((user, resolved, subject))
    }
}

/// The device a persisted token is bound to, preferring the record over
/// the claim.
fn token_device(record: &TokenRecord, claimed: Option<&str>) -> Result<String, AuthError> {
    record
        .device_id
        .as_deref()
        .or(claimed)
        .map(str::to_string)
        .ok_or_else(|| AuthError::TokenInvalid("token is not bound to a device".into()))
}
