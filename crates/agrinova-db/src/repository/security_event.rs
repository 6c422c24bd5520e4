//! SurrealDB implementation of [`SecurityEventRepository`].
//!
//! The table is append-only: the schema denies update and delete, and
//! this repository exposes neither.

use agrinova_core::error::AgrinovaResult;
use agrinova_core::models::security_event::{
    NewSecurityEvent, SecurityEvent, SecurityEventKind, Severity,
};
use agrinova_core::repository::{
    PaginatedResult, Pagination, SecurityEventFilter, SecurityEventRepository,
};
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, parse_opt_uuid, parse_uuid, statement_error};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct SecurityEventRow {
    record_id: String,
    kind: String,
    severity: String,
    user_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl SecurityEventRow {
    fn try_into_event(self) -> Result<SecurityEvent, DbError> {
        let kind = SecurityEventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == self.kind)
            .ok_or_else(|| DbError::Decode(format!("unknown event kind: {}", self.kind)))?;
        let severity = Severity::ALL
            .into_iter()
            .find(|s| s.as_str() == self.severity)
            .ok_or_else(|| DbError::Decode(format!("unknown severity: {}", self.severity)))?;

        Ok(SecurityEvent {
            id: parse_uuid("security_event", &self.record_id)?,
            kind,
            severity,
            user_id: parse_opt_uuid("user", self.user_id)?,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            details: self.details,
            created_at: self.created_at,
        })
    }
}

fn where_clause(filter: &SecurityEventFilter) -> String {
    let mut conditions = Vec::new();
    if filter.user_id.is_some() {
        conditions.push("user_id = $user_id");
    }
    if filter.kind.is_some() {
        conditions.push("kind = $kind");
    }
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

#[derive(Clone)]
pub struct SurrealSecurityEventRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSecurityEventRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SecurityEventRepository for SurrealSecurityEventRepository<C> {
    async fn append(&self, input: NewSecurityEvent) -> AgrinovaResult<SecurityEvent> {
        let id = Uuid::new_v4();

        let mut result = self
            .db
            .query(
                "CREATE type::record('security_event', $id) SET \
                 kind = $kind, severity = $severity, user_id = $user_id, \
                 ip_address = $ip_address, user_agent = $user_agent, \
                 details = $details \
                 RETURN meta::id(id) AS record_id, *",
            )
            .bind(("id", id.to_string()))
            .bind(("kind", input.kind.as_str().to_string()))
            .bind(("severity", input.severity.as_str().to_string()))
            .bind(("user_id", input.user_id.map(|u| u.to_string())))
            .bind(("ip_address", input.ip_address))
            .bind(("user_agent", input.user_agent))
            .bind(("details", input.details))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| statement_error("security_event", e))?;

        let rows: Vec<SecurityEventRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| {
            DbError::Query("security event create returned no record".into())
        })?;
        Ok(row.try_into_event()?)
    }

    async fn list(
        &self,
        filter: SecurityEventFilter,
        pagination: Pagination,
    ) -> AgrinovaResult<PaginatedResult<SecurityEvent>> {
        let clause = where_clause(&filter);
        let user_id = filter.user_id.map(|u| u.to_string());
        let kind = filter.kind.map(|k| k.as_str().to_string());

        let mut count_result = self
            .db
            .query(format!(
                "SELECT count() AS total FROM security_event {clause} GROUP ALL"
            ))
            .bind(("user_id", user_id.clone()))
            .bind(("kind", kind.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(format!(
                "SELECT meta::id(id) AS record_id, * FROM security_event {clause} \
                 ORDER BY created_at DESC \
                 LIMIT $limit START $offset"
            ))
            .bind(("user_id", user_id))
            .bind(("kind", kind))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SecurityEventRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(SecurityEventRow::try_into_event)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
