//! Device binding lifecycle: `UNBOUND -> BOUND -> [TRUSTED] -> REVOKED`.
//!
//! A stored fingerprint is never rewritten by a login. The only way to
//! change it is an explicit re-bind after the binding was revoked.

use agrinova_core::error::{AgrinovaError, AgrinovaResult};
use agrinova_core::models::device::{
    CreateDeviceBinding, DeviceBinding, DeviceInfo, Platform,
};
use agrinova_core::models::security_event::{NewSecurityEvent, SecurityEventKind, Severity};
use agrinova_core::repository::{DeviceRepository, SecurityEventRepository};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::SecurityAuditSink;
use crate::error::AuthError;

/// What the client reports about the device it is logging in from.
#[derive(Debug, Clone)]
pub struct DeviceClaim {
    pub device_id: String,
    pub fingerprint: String,
    pub platform: Platform,
    pub info: Option<DeviceInfo>,
}

/// Input for an explicit bind.
#[derive(Debug, Clone)]
pub struct BindDeviceInput {
    pub device_id: String,
    pub fingerprint: String,
    pub platform: Platform,
    pub info: DeviceInfo,
    pub biometric_hash: Option<String>,
}

#[derive(Clone)]
pub struct DeviceBindingManager<D, E>
where
    D: DeviceRepository,
    E: SecurityEventRepository,
{
    devices: D,
    audit: SecurityAuditSink<E>,
}

impl<D, E> DeviceBindingManager<D, E>
where
    D: DeviceRepository,
    E: SecurityEventRepository,
{
    pub fn new(devices: D, audit: SecurityAuditSink<E>) -> Self {
        Self { devices, audit }
    }

    async fn find(&self, user_id: Uuid, device_id: &str) -> AgrinovaResult<Option<DeviceBinding>> {
        match self.devices.get(user_id, device_id).await {
            Ok(binding) => Ok(Some(binding)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Login-time binding: auto-bind an unknown device (untrusted), or
    /// check an existing binding's fingerprint and authorization.
    pub async fn ensure_binding(
        &self,
        user_id: Uuid,
        claim: &DeviceClaim,
    ) -> AgrinovaResult<DeviceBinding> {
        let Some(binding) = self.find(user_id, &claim.device_id).await? else {
            let binding = self
                .create(CreateDeviceBinding {
                    user_id,
                    device_id: claim.device_id.clone(),
                    device_fingerprint: claim.fingerprint.clone(),
                    platform: claim.platform,
                    device_info: claim.info.clone().unwrap_or_else(DeviceInfo::unknown),
                    biometric_hash: None,
                    is_trusted: false,
                })
                .await?;
            info!(%user_id, device_id = %binding.device_id, "Device auto-bound on first login");
            return Ok(binding);
        };

        self.check_fingerprint(&binding, &claim.fingerprint, "login")
            .await?;
        if !binding.can_issue_tokens() {
            return Err(AuthError::DeviceNotAuthorized.into());
        }
        Ok(binding)
    }

    /// Explicit bind. A revoked binding is reactivated with the new
    /// fingerprint; a live one is `DeviceAlreadyBound`.
    pub async fn bind(&self, user_id: Uuid, input: BindDeviceInput) -> AgrinovaResult<DeviceBinding> {
        let create = CreateDeviceBinding {
            user_id,
            device_id: input.device_id,
            device_fingerprint: input.fingerprint,
            platform: input.platform,
            device_info: input.info,
            biometric_hash: input.biometric_hash,
            is_trusted: false,
        };

        match self.find(user_id, &create.device_id).await? {
            None => self.create(create).await,
            Some(existing) if existing.can_issue_tokens() => {
                Err(AuthError::DeviceAlreadyBound.into())
            }
            Some(existing) => {
                let binding = self.devices.reactivate(existing.id, create).await?;
                self.audit
                    .record(
                        NewSecurityEvent::new(SecurityEventKind::DeviceBind)
                            .user(user_id)
                            .detail("device_id", binding.device_id.as_str())
                            .detail("platform", binding.platform.as_str())
                            .detail("rebind", true),
                    )
                    .await;
                Ok(binding)
            }
        }
    }

    async fn create(&self, input: CreateDeviceBinding) -> AgrinovaResult<DeviceBinding> {
        let binding = match self.devices.create(input).await {
            Ok(binding) => binding,
            // Lost a race with a concurrent bind of the same pair.
            Err(AgrinovaError::AlreadyExists { .. }) => {
                return Err(AuthError::DeviceAlreadyBound.into());
            }
            Err(e) => return Err(e),
        };
        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::DeviceBind)
                    .user(binding.user_id)
                    .detail("device_id", binding.device_id.as_str())
                    .detail("platform", binding.platform.as_str())
                    .detail("is_trusted", binding.is_trusted),
            )
            .await;
        Ok(binding)
    }

    /// Revoke the binding. Token revocation is the caller's follow-up.
    pub async fn unbind(&self, user_id: Uuid, device_id: &str) -> AgrinovaResult<DeviceBinding> {
        let binding = match self.devices.revoke(user_id, device_id).await {
            Ok(binding) => binding,
            Err(e) if e.is_not_found() => return Err(AuthError::DeviceNotFound.into()),
            Err(e) => return Err(e),
        };
        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::DeviceUnbind)
                    .user(user_id)
                    .detail("device_id", device_id),
            )
            .await;
        Ok(binding)
    }

    /// Explicit trust promotion. Only a live binding can be trusted.
    pub async fn trust(
        &self,
        user_id: Uuid,
        device_id: &str,
        trusted_by: Uuid,
    ) -> AgrinovaResult<DeviceBinding> {
        let binding = self.require(user_id, device_id).await?;
        if !binding.can_issue_tokens() {
            return Err(AuthError::DeviceNotAuthorized.into());
        }
        let binding = self.devices.set_trusted(user_id, device_id, trusted_by).await?;
        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::DeviceTrust)
                    .user(user_id)
                    .detail("device_id", device_id)
                    .detail("trusted_by", trusted_by.to_string()),
            )
            .await;
        Ok(binding)
    }

    pub async fn list(&self, user_id: Uuid) -> AgrinovaResult<Vec<DeviceBinding>> {
        self.devices.list_for_user(user_id).await
    }

    /// The binding, or `DeviceNotFound`.
    pub async fn require(&self, user_id: Uuid, device_id: &str) -> AgrinovaResult<DeviceBinding> {
        self.find(user_id, device_id)
            .await?
            .ok_or_else(|| AuthError::DeviceNotFound.into())
    }

    /// The binding, provided it may still back token operations.
    pub async fn require_authorized(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> AgrinovaResult<DeviceBinding> {
        match self.find(user_id, device_id).await? {
            Some(binding) if binding.can_issue_tokens() => Ok(binding),
            _ => Err(AuthError::DeviceNotAuthorized.into()),
        }
    }

    /// Exact comparison; a mismatch is audited as CRITICAL and the stored
    /// fingerprint stays as it is.
    pub async fn check_fingerprint(
        &self,
        binding: &DeviceBinding,
        presented: &str,
        stage: &'static str,
    ) -> AgrinovaResult<()> {
        if binding.fingerprint_matches(presented) {
            return Ok(());
        }
        warn!(
            user_id = %binding.user_id,
            device_id = %binding.device_id,
            stage,
            "Device fingerprint mismatch"
        );
        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventKind::SuspiciousActivity)
                    .severity(Severity::Critical)
                    .user(binding.user_id)
                    .detail("reason", "device_fingerprint_mismatch")
                    .detail("stage", stage)
                    .detail("device_id", binding.device_id.as_str()),
            )
            .await;
        Err(AuthError::DeviceFingerprintMismatch.into())
    }

    pub async fn touch(&self, binding: &DeviceBinding) {
        if let Err(e) = self.devices.touch_last_seen(binding.id).await {
            warn!(error = %e, device_id = %binding.device_id, "Failed to update device last-seen");
        }
    }
}
