//! Assignment resolution: role + assignment rows -> authorized scope.
//!
//! Only active rows count. Ids keep first-seen order and are deduped.

use agrinova_core::error::AgrinovaResult;
use agrinova_core::models::assignment::{Assignment, home_company};
use agrinova_core::models::scope::{AuthorizedScope, ScopeLevel};
use agrinova_core::models::user::Role;
use agrinova_core::repository::AssignmentRepository;
use uuid::Uuid;

use crate::error::AuthError;

/// A user's assignments and everything derived from them.
#[derive(Debug, Clone)]
pub struct ResolvedAssignments {
    /// Active assignments in persisted order.
    pub assignments: Vec<Assignment>,
    /// Whether any row exists at all, active or not.
    pub has_any_rows: bool,
    /// Company of the first active assignment; goes into token claims.
    pub home_company_id: Option<Uuid>,
    /// Distinct companies over active assignments.
    pub company_ids: Vec<Uuid>,
    pub scope: AuthorizedScope,
}

impl ResolvedAssignments {
    /// Operational scope is mandatory for mobile logins.
    pub fn require_home_company(&self) -> Result<Uuid, AuthError> {
        if !self.has_any_rows {
            return Err(AuthError::NoAssignments);
        }
        self.home_company_id.ok_or(AuthError::NoCompany)
    }
}

#[derive(Clone)]
pub struct AssignmentResolver<A: AssignmentRepository> {
    assignments: A,
}

impl<A: AssignmentRepository> AssignmentResolver<A> {
    pub fn new(assignments: A) -> Self {
        Self { assignments }
    }

    pub async fn resolve(&self, user_id: Uuid, role: Role) -> AgrinovaResult<ResolvedAssignments> {
        let rows = self.assignments.list_for_user(user_id).await?;
        Ok(resolve_rows(role, rows))
    }
}

/// Pure half of [`AssignmentResolver::resolve`].
pub fn resolve_rows(role: Role, rows: Vec<Assignment>) -> ResolvedAssignments {
    let has_any_rows = !rows.is_empty();
    let home_company_id = home_company(&rows);
    let active: Vec<Assignment> = rows.into_iter().filter(|a| a.is_active).collect();
    let company_ids = distinct(active.iter().map(|a| Some(a.company_id)));
    let scope = resolve_scope(role, &active);

    ResolvedAssignments {
        assignments: active,
        has_any_rows,
        home_company_id,
        company_ids,
        scope,
    }
}

/// Role-specific aggregation over active assignments.
pub fn resolve_scope(role: Role, assignments: &[Assignment]) -> AuthorizedScope {
    let active: Vec<&Assignment> = assignments.iter().filter(|a| a.is_active).collect();
    let home = active.first().map(|a| a.company_id);
    let at_home: Vec<&Assignment> = active
        .iter()
        .copied()
        .filter(|a| Some(a.company_id) == home)
        .collect();
    let home_only = ScopeLevel::Listed(home.into_iter().collect());

    match role {
        Role::SuperAdmin => AuthorizedScope::unrestricted(),
        Role::CompanyAdmin => AuthorizedScope {
            companies: home_only,
            estates: ScopeLevel::All,
            divisions: ScopeLevel::All,
        },
        Role::AreaManager => AuthorizedScope {
            companies: ScopeLevel::Listed(distinct(active.iter().map(|a| Some(a.company_id)))),
            estates: ScopeLevel::Listed(distinct(active.iter().map(|a| a.estate_id))),
            divisions: ScopeLevel::All,
        },
        Role::Manager => AuthorizedScope {
            companies: home_only,
            estates: ScopeLevel::Listed(distinct(at_home.iter().map(|a| a.estate_id))),
            divisions: ScopeLevel::All,
        },
        Role::Asisten | Role::Mandor => AuthorizedScope {
            companies: home_only,
            estates: ScopeLevel::Listed(distinct(at_home.iter().map(|a| a.estate_id))),
            divisions: ScopeLevel::Listed(distinct(at_home.iter().map(|a| a.division_id))),
        },
        Role::Satpam | Role::Timbangan | Role::Grading => AuthorizedScope {
            companies: home_only,
            estates: ScopeLevel::none(),
            divisions: ScopeLevel::none(),
        },
    }
}

fn distinct(ids: impl Iterator<Item = Option<Uuid>>) -> Vec<Uuid> {
    let mut out: Vec<Uuid> = Vec::new();
    for id in ids.flatten() {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
