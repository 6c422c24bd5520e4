//! SurrealDB implementation of [`DeviceRepository`].

use agrinova_core::error::AgrinovaResult;
use agrinova_core::models::device::{CreateDeviceBinding, DeviceBinding, DeviceInfo, Platform};
use agrinova_core::repository::DeviceRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{parse_opt_uuid, parse_uuid, statement_error};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct DeviceRow {
    record_id: String,
    user_id: String,
    device_id: String,
    device_fingerprint: String,
    platform: String,
    device_info: serde_json::Value,
    biometric_hash: Option<String>,
    is_trusted: bool,
    is_authorized: bool,
    last_seen_at: DateTime<Utc>,
    authorized_by: Option<String>,
    authorized_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DeviceRow {
    fn try_into_binding(self) -> Result<DeviceBinding, DbError> {
        let platform: Platform = self.platform.parse().map_err(DbError::Decode)?;
        let device_info: DeviceInfo = serde_json::from_value(self.device_info)
            .map_err(|e| DbError::Decode(format!("device_info: {e}")))?;
        Ok(DeviceBinding {
            id: parse_uuid("device_binding", &self.record_id)?,
            user_id: parse_uuid("user", &self.user_id)?,
            device_id: self.device_id,
            device_fingerprint: self.device_fingerprint,
            platform,
            device_info,
            biometric_hash: self.biometric_hash,
            is_trusted: self.is_trusted,
            is_authorized: self.is_authorized,
            last_seen_at: self.last_seen_at,
            authorized_by: parse_opt_uuid("authorized_by", self.authorized_by)?,
            authorized_at: self.authorized_at,
            revoked_at: self.revoked_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn device_info_value(info: &DeviceInfo) -> Result<serde_json::Value, DbError> {
    serde_json::to_value(info).map_err(|e| DbError::Decode(format!("device_info: {e}")))
}

/// SurrealDB implementation of the device binding repository.
#[derive(Clone)]
pub struct SurrealDeviceRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealDeviceRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn fetch(&self, id: Uuid) -> Result<DeviceBinding, DbError> {
        let id_str = id.to_string();
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('device_binding', $id)",
            )
            .bind(("id", id_str.clone()))
            .await?;

        let rows: Vec<DeviceRow> = result.take(0)?;
        rows.into_iter()
            .next()
            .ok_or(DbError::NotFound {
                entity: "device_binding".into(),
                id: id_str,
            })?
            .try_into_binding()
    }

    /// Run an update against the binding of (user, device) and return
    /// the updated record.
    async fn update_pair(
        &self,
        user_id: Uuid,
        device_id: &str,
        set_clause: &str,
        trusted_by: Option<Uuid>,
    ) -> Result<DeviceBinding, DbError> {
        let query = format!(
            "UPDATE device_binding SET {set_clause}, updated_at = time::now() \
             WHERE user_id = $user_id AND device_id = $device_id \
             RETURN meta::id(id) AS record_id, *"
        );
        let mut result = self
            .db
            .query(query)
            .bind(("user_id", user_id.to_string()))
            .bind(("device_id", device_id.to_string()))
            .bind(("trusted_by", trusted_by.map(|t| t.to_string())))
            .await?;

        let rows: Vec<DeviceRow> = result.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound {
                entity: "device_binding".into(),
                id: format!("user={user_id} device={device_id}"),
            })?
            .try_into_binding()
    }
}

impl<C: Connection> DeviceRepository for SurrealDeviceRepository<C> {
    async fn create(&self, input: CreateDeviceBinding) -> AgrinovaResult<DeviceBinding> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('device_binding', $id) SET \
                 user_id = $user_id, device_id = $device_id, \
                 device_fingerprint = $device_fingerprint, \
                 platform = $platform, device_info = $device_info, \
                 biometric_hash = $biometric_hash, \
                 is_trusted = $is_trusted, is_authorized = true, \
                 last_seen_at = time::now(), revoked_at = NONE",
            )
            .bind(("id", id.to_string()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("device_id", input.device_id))
            .bind(("device_fingerprint", input.device_fingerprint))
            .bind(("platform", input.platform.as_str().to_string()))
            .bind(("device_info", device_info_value(&input.device_info)?))
            .bind(("biometric_hash", input.biometric_hash))
            .bind(("is_trusted", input.is_trusted))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| statement_error("device_binding", e))?;

        Ok(self.fetch(id).await?)
    }

    async fn get(&self, user_id: Uuid, device_id: &str) -> AgrinovaResult<DeviceBinding> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM device_binding \
                 WHERE user_id = $user_id AND device_id = $device_id",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("device_id", device_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DeviceRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "device_binding".into(),
            id: format!("user={user_id} device={device_id}"),
        })?;

        Ok(row.try_into_binding()?)
    }

    async fn list_for_user(&self, user_id: Uuid) -> AgrinovaResult<Vec<DeviceBinding>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM device_binding \
                 WHERE user_id = $user_id ORDER BY last_seen_at DESC",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DeviceRow> = result.take(0).map_err(DbError::from)?;
        let bindings = rows
            .into_iter()
            .map(DeviceRow::try_into_binding)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(bindings)
    }

    async fn reactivate(
        &self,
        id: Uuid,
        input: CreateDeviceBinding,
    ) -> AgrinovaResult<DeviceBinding> {
        self.db
            .query(
                "UPDATE type::record('device_binding', $id) SET \
                 device_fingerprint = $device_fingerprint, \
                 platform = $platform, device_info = $device_info, \
                 biometric_hash = $biometric_hash, \
                 is_trusted = $is_trusted, is_authorized = true, \
                 authorized_by = NONE, authorized_at = NONE, \
                 revoked_at = NONE, last_seen_at = time::now(), \
                 updated_at = time::now() \
                 WHERE user_id = $user_id AND device_id = $device_id \
                 RETURN NONE",
            )
            .bind(("id", id.to_string()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("device_id", input.device_id))
            .bind(("device_fingerprint", input.device_fingerprint))
            .bind(("platform", input.platform.as_str().to_string()))
            .bind(("device_info", device_info_value(&input.device_info)?))
            .bind(("biometric_hash", input.biometric_hash))
            .bind(("is_trusted", input.is_trusted))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| statement_error("device_binding", e))?;

        Ok(self.fetch(id).await?)
    }

    async fn touch_last_seen(&self, id: Uuid) -> AgrinovaResult<()> {
        self.db
            .query(
                "UPDATE type::record('device_binding', $id) SET \
                 last_seen_at = time::now(), updated_at = time::now() \
                 RETURN NONE",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| statement_error("device_binding", e))?;
        Ok(())
    }

    async fn revoke(&self, user_id: Uuid, device_id: &str) -> AgrinovaResult<DeviceBinding> {
        Ok(self
            .update_pair(
                user_id,
                device_id,
                "is_authorized = false, revoked_at = time::now()",
                None,
            )
            .await?)
    }

    async fn set_trusted(
        &self,
        user_id: Uuid,
        device_id: &str,
        trusted_by: Uuid,
    ) -> AgrinovaResult<DeviceBinding> {
        Ok(self
            .update_pair(
                user_id,
                device_id,
                "is_trusted = true, authorized_by = $trusted_by, \
                 authorized_at = time::now()",
                Some(trusted_by),
            )
            .await?)
    }
}
