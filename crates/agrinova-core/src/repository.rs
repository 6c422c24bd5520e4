//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. The auth crate is generic
//! over these traits and never depends on a concrete store.

use uuid::Uuid;

use crate::error::AgrinovaResult;
use crate::models::{
    assignment::{Assignment, CreateAssignment},
    device::{CreateDeviceBinding, DeviceBinding},
    security_event::{NewSecurityEvent, SecurityEvent, SecurityEventKind},
    token::{CreateTokenRecord, TokenKind, TokenRecord},
    user::{CreateUser, UpdateUser, User},
    web_session::{CreateWebSession, SessionRevocation, WebSession},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Identity & scope (read-mostly)
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = AgrinovaResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = AgrinovaResult<User>> + Send;
    /// Case-insensitive match on username or email.
    fn get_by_identifier(
        &self,
        identifier: &str,
    ) -> impl Future<Output = AgrinovaResult<User>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateUser,
    ) -> impl Future<Output = AgrinovaResult<User>> + Send;
    /// Hash and store a new password.
    fn set_password(
        &self,
        id: Uuid,
        password: &str,
    ) -> impl Future<Output = AgrinovaResult<()>> + Send;
}

pub trait AssignmentRepository: Send + Sync {
    fn create(
        &self,
        input: CreateAssignment,
    ) -> impl Future<Output = AgrinovaResult<Assignment>> + Send;
    /// All assignments of a user (active or not), in persisted order.
    fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = AgrinovaResult<Vec<Assignment>>> + Send;
    fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> impl Future<Output = AgrinovaResult<Assignment>> + Send;
}

// ---------------------------------------------------------------------------
// Device bindings
// ---------------------------------------------------------------------------

pub trait DeviceRepository: Send + Sync {
    /// Fails with `AlreadyExists` when the (user, device) pair is taken.
    fn create(
        &self,
        input: CreateDeviceBinding,
    ) -> impl Future<Output = AgrinovaResult<DeviceBinding>> + Send;
    fn get(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> impl Future<Output = AgrinovaResult<DeviceBinding>> + Send;
    fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = AgrinovaResult<Vec<DeviceBinding>>> + Send;
    /// Re-authorize a revoked binding with fresh fingerprint and info.
    fn reactivate(
        &self,
        id: Uuid,
        input: CreateDeviceBinding,
    ) -> impl Future<Output = AgrinovaResult<DeviceBinding>> + Send;
    fn touch_last_seen(&self, id: Uuid) -> impl Future<Output = AgrinovaResult<()>> + Send;
    /// Clear the authorization flag and stamp `revoked_at`.
    fn revoke(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> impl Future<Output = AgrinovaResult<DeviceBinding>> + Send;
    fn set_trusted(
        &self,
        user_id: Uuid,
        device_id: &str,
        trusted_by: Uuid,
    ) -> impl Future<Output = AgrinovaResult<DeviceBinding>> + Send;
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

pub trait TokenRepository: Send + Sync {
    fn create(
        &self,
        input: CreateTokenRecord,
    ) -> impl Future<Output = AgrinovaResult<TokenRecord>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = AgrinovaResult<TokenRecord>> + Send;
    /// Record of the given kind with this hash, whatever its state.
    fn find_by_hash(
        &self,
        kind: TokenKind,
        token_hash: &str,
    ) -> impl Future<Output = AgrinovaResult<TokenRecord>> + Send;
    /// Non-revoked, unexpired record of the given kind with this hash.
    fn find_live_by_hash(
        &self,
        kind: TokenKind,
        token_hash: &str,
    ) -> impl Future<Output = AgrinovaResult<TokenRecord>> + Send;
    /// Idempotent. Returns whether a live record was revoked.
    fn revoke(&self, id: Uuid) -> impl Future<Output = AgrinovaResult<bool>> + Send;
    /// Idempotent. Returns the number of records revoked.
    fn revoke_for_device(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> impl Future<Output = AgrinovaResult<u64>> + Send;
    fn revoke_for_user(&self, user_id: Uuid) -> impl Future<Output = AgrinovaResult<u64>> + Send;
    /// Atomically revoke every token of the device, then persist
    /// `records`.
    fn replace_device_tokens(
        &self,
        user_id: Uuid,
        device_id: &str,
        records: Vec<CreateTokenRecord>,
    ) -> impl Future<Output = AgrinovaResult<Vec<TokenRecord>>> + Send;
    /// Atomically consume `consumed_id` and make `replacement` the only
    /// live refresh token of its device.
    ///
    /// Fails with `Conflict` (and persists nothing) when the consumed
    /// record was already revoked.
    fn rotate(
        &self,
        consumed_id: Uuid,
        replacement: CreateTokenRecord,
    ) -> impl Future<Output = AgrinovaResult<TokenRecord>> + Send;
}

// ---------------------------------------------------------------------------
// Web sessions
// ---------------------------------------------------------------------------

pub trait WebSessionRepository: Send + Sync {
    fn create(
        &self,
        input: CreateWebSession,
    ) -> impl Future<Output = AgrinovaResult<WebSession>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = AgrinovaResult<WebSession>> + Send;
    fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = AgrinovaResult<WebSession>> + Send;
    fn touch(&self, id: Uuid) -> impl Future<Output = AgrinovaResult<()>> + Send;
    /// Soft revoke; the row is kept.
    fn revoke(
        &self,
        id: Uuid,
        revocation: SessionRevocation,
    ) -> impl Future<Output = AgrinovaResult<WebSession>> + Send;
    fn revoke_for_user(
        &self,
        user_id: Uuid,
        revocation: SessionRevocation,
    ) -> impl Future<Output = AgrinovaResult<u64>> + Send;
    fn list_active_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = AgrinovaResult<Vec<WebSession>>> + Send;
    /// Mark expired sessions that are still flagged active as inactive.
    fn expire_stale(&self) -> impl Future<Output = AgrinovaResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Security events (append-only)
// ---------------------------------------------------------------------------

/// Filters for querying security events.
#[derive(Debug, Clone, Default)]
pub struct SecurityEventFilter {
    pub user_id: Option<Uuid>,
    pub kind: Option<SecurityEventKind>,
}

pub trait SecurityEventRepository: Send + Sync {
    /// Append a new event. No update or delete operations exist.
    fn append(
        &self,
        input: NewSecurityEvent,
    ) -> impl Future<Output = AgrinovaResult<SecurityEvent>> + Send;
    /// Newest first.
    fn list(
        &self,
        filter: SecurityEventFilter,
        pagination: Pagination,
    ) -> impl Future<Output = AgrinovaResult<PaginatedResult<SecurityEvent>>> + Send;
}
