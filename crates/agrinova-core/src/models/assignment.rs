//! Assignment domain model.
//!
//! An assignment grants a user operational scope within a company,
//! optionally narrowed to an estate and a division. Assignments are
//! managed by admin operations; the auth core only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub estate_id: Option<Uuid>,
    pub division_id: Option<Uuid>,
    pub is_active: bool,
    pub assigned_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAssignment {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub estate_id: Option<Uuid>,
    pub division_id: Option<Uuid>,
    pub assigned_by: Option<Uuid>,
}

/// Company of the first active assignment, in persisted order.
pub fn home_company(assignments: &[Assignment]) -> Option<Uuid> {
    assignments
        .iter()
        .find(|a| a.is_active)
        .map(|a| a.company_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(company_id: Uuid, is_active: bool) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            company_id,
            estate_id: None,
            division_id: None,
            is_active,
            assigned_by: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn home_company_skips_inactive_rows() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();
        let rows = vec![
            assignment(first, false),
            assignment(second, true),
            assignment(third, true),
        ];
        assert_eq!(home_company(&rows), Some(second));
    }

    #[test]
    fn no_active_assignment_means_no_home_company() {
        let rows = vec![assignment(Uuid::new_v4(), false)];
        assert_eq!(home_company(&rows), None);
        assert_eq!(home_company(&[]), None);
    }
}
