//! SurrealDB implementation of [`AssignmentRepository`].

use agrinova_core::error::AgrinovaResult;
use agrinova_core::models::assignment::{Assignment, CreateAssignment};
use agrinova_core::repository::AssignmentRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{parse_opt_uuid, parse_uuid, statement_error};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AssignmentRow {
    record_id: String,
    user_id: String,
    company_id: String,
    estate_id: Option<String>,
    division_id: Option<String>,
    is_active: bool,
    assigned_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl AssignmentRow {
    fn try_into_assignment(self) -> Result<Assignment, DbError> {
        Ok(Assignment {
            id: parse_uuid("assignment", &self.record_id)?,
            user_id: parse_uuid("user", &self.user_id)?,
            company_id: parse_uuid("company", &self.company_id)?,
            estate_id: parse_opt_uuid("estate", self.estate_id)?,
            division_id: parse_opt_uuid("division", self.division_id)?,
            is_active: self.is_active,
            assigned_by: parse_opt_uuid("assigned_by", self.assigned_by)?,
            created_at: self.created_at,
        })
    }
}

#[derive(Clone)]
pub struct SurrealAssignmentRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAssignmentRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn fetch(&self, id: Uuid) -> Result<Assignment, DbError> {
        let id_str = id.to_string();
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('assignment', $id)")
            .bind(("id", id_str.clone()))
            .await?;

        let rows: Vec<AssignmentRow> = result.take(0)?;
        rows.into_iter()
            .next()
            .ok_or(DbError::NotFound {
                entity: "assignment".into(),
                id: id_str,
            })?
            .try_into_assignment()
    }
}

impl<C: Connection> AssignmentRepository for SurrealAssignmentRepository<C> {
    async fn create(&self, input: CreateAssignment) -> AgrinovaResult<Assignment> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('assignment', $id) SET \
                 user_id = $user_id, company_id = $company_id, \
                 estate_id = $estate_id, division_id = $division_id, \
                 is_active = true, assigned_by = $assigned_by",
            )
            .bind(("id", id.to_string()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("company_id", input.company_id.to_string()))
            .bind(("estate_id", input.estate_id.map(|e| e.to_string())))
            .bind(("division_id", input.division_id.map(|d| d.to_string())))
            .bind(("assigned_by", input.assigned_by.map(|a| a.to_string())))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| statement_error("assignment", e))?;

        Ok(self.fetch(id).await?)
    }

    async fn list_for_user(&self, user_id: Uuid) -> AgrinovaResult<Vec<Assignment>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM assignment \
                 WHERE user_id = $user_id \
                 ORDER BY created_at ASC",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AssignmentRow> = result.take(0).map_err(DbError::from)?;
        let assignments = rows
            .into_iter()
            .map(AssignmentRow::try_into_assignment)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(assignments)
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> AgrinovaResult<Assignment> {
        self.db
            .query("UPDATE type::record('assignment', $id) SET is_active = $is_active RETURN NONE")
            .bind(("id", id.to_string()))
            .bind(("is_active", is_active))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| statement_error("assignment", e))?;

        Ok(self.fetch(id).await?)
    }
}
