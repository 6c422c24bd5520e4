//! SurrealDB implementation of [`WebSessionRepository`].

use agrinova_core::error::AgrinovaResult;
use agrinova_core::models::web_session::{CreateWebSession, SessionRevocation, WebSession};
use agrinova_core::repository::WebSessionRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{IdRow, parse_opt_uuid, parse_uuid, statement_error};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct WebSessionRow {
    record_id: String,
    user_id: String,
    token_hash: String,
    csrf_token_hash: String,
    device_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    login_method: String,
    last_activity: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_active: bool,
    revoked: bool,
    revoked_by: Option<String>,
    revoked_reason: Option<String>,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl WebSessionRow {
    fn try_into_session(self) -> Result<WebSession, DbError> {
        Ok(WebSession {
            id: parse_uuid("web_session", &self.record_id)?,
            user_id: parse_uuid("user", &self.user_id)?,
            token_hash: self.token_hash,
            csrf_token_hash: self.csrf_token_hash,
            device_id: self.device_id,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            login_method: self.login_method,
            last_activity: self.last_activity,
            expires_at: self.expires_at,
            is_active: self.is_active,
            revoked: self.revoked,
            revoked_by: parse_opt_uuid("revoked_by", self.revoked_by)?,
            revoked_reason: self.revoked_reason,
            revoked_at: self.revoked_at,
            created_at: self.created_at,
        })
    }
}

const SELECT_SESSION: &str = "SELECT meta::id(id) AS record_id, * FROM web_session";

const REVOKE_SET: &str = "SET is_active = false, revoked = true, \
     revoked_by = $revoked_by, revoked_reason = $reason, revoked_at = time::now()";

#[derive(Clone)]
pub struct SurrealWebSessionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealWebSessionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select_rows(
        &self,
        filter: &str,
        key: &'static str,
        value: String,
    ) -> Result<Vec<WebSession>, DbError> {
        let mut result = self
            .db
            .query(format!("{SELECT_SESSION} {filter}"))
            .bind((key, value))
            .await?;

        let rows: Vec<WebSessionRow> = result.take(0)?;
        rows.into_iter()
            .map(WebSessionRow::try_into_session)
            .collect()
    }
}

impl<C: Connection> WebSessionRepository for SurrealWebSessionRepository<C> {
    async fn create(&self, input: CreateWebSession) -> AgrinovaResult<WebSession> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('web_session', $id) SET \
                 user_id = $user_id, token_hash = $token_hash, \
                 csrf_token_hash = $csrf_token_hash, device_id = $device_id, \
                 ip_address = $ip_address, user_agent = $user_agent, \
                 login_method = $login_method, expires_at = $expires_at, \
                 last_activity = time::now(), is_active = true, revoked = false \
                 RETURN NONE",
            )
            .bind(("id", id.to_string()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("token_hash", input.token_hash))
            .bind(("csrf_token_hash", input.csrf_token_hash))
            .bind(("device_id", input.device_id))
            .bind(("ip_address", input.ip_address))
            .bind(("user_agent", input.user_agent))
            .bind(("login_method", input.login_method))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| statement_error("web_session", e))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> AgrinovaResult<WebSession> {
        let id_str = id.to_string();
        let sessions = self
            .select_rows(
                "WHERE id = type::record('web_session', $id)",
                "id",
                id_str.clone(),
            )
            .await?;

        Ok(sessions.into_iter().next().ok_or(DbError::NotFound {
            entity: "web_session".into(),
            id: id_str,
        })?)
    }

    async fn get_by_token_hash(&self, token_hash: &str) -> AgrinovaResult<WebSession> {
        let sessions = self
            .select_rows(
                "WHERE token_hash = $token_hash",
                "token_hash",
                token_hash.to_string(),
            )
            .await?;

        Ok(sessions
            .into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound {
                entity: "web_session".into(),
                id: "token_hash=<redacted>".into(),
            })?)
    }

    async fn touch(&self, id: Uuid) -> AgrinovaResult<()> {
        self.db
            .query(
                "UPDATE type::record('web_session', $id) \
                 SET last_activity = time::now() RETURN NONE",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| statement_error("web_session", e))?;
        Ok(())
    }

    async fn revoke(&self, id: Uuid, revocation: SessionRevocation) -> AgrinovaResult<WebSession> {
        self.db
            .query(format!(
                "UPDATE type::record('web_session', $id) {REVOKE_SET} \
                 WHERE revoked = false RETURN NONE"
            ))
            .bind(("id", id.to_string()))
            .bind(("revoked_by", revocation.revoked_by.map(|u| u.to_string())))
            .bind(("reason", revocation.reason))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| statement_error("web_session", e))?;

        self.get_by_id(id).await
    }

    async fn revoke_for_user(
        &self,
        user_id: Uuid,
        revocation: SessionRevocation,
    ) -> AgrinovaResult<u64> {
        let mut result = self
            .db
            .query(format!(
                "UPDATE web_session {REVOKE_SET} \
                 WHERE user_id = $user_id AND revoked = false \
                 RETURN meta::id(id) AS record_id"
            ))
            .bind(("user_id", user_id.to_string()))
            .bind(("revoked_by", revocation.revoked_by.map(|u| u.to_string())))
            .bind(("reason", revocation.reason))
            .await
            .map_err(DbError::from)?;

        let revoked: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        Ok(revoked.len() as u64)
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> AgrinovaResult<Vec<WebSession>> {
        Ok(self
            .select_rows(
                "WHERE user_id = $user_id AND is_active = true AND revoked = false \
                 AND expires_at > time::now() ORDER BY last_activity DESC",
                "user_id",
                user_id.to_string(),
            )
            .await?)
    }

    async fn expire_stale(&self) -> AgrinovaResult<u64> {
        let mut result = self
            .db
            .query(
                "UPDATE web_session SET is_active = false \
                 WHERE is_active = true AND expires_at <= time::now() \
                 RETURN meta::id(id) AS record_id",
            )
            .await
            .map_err(DbError::from)?;

        let expired: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        Ok(expired.len() as u64)
    }
}
