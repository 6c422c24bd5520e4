//! User domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operational role of a user. Stored and serialized in
/// SCREAMING_SNAKE_CASE (`SUPER_ADMIN`, `MANDOR`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    CompanyAdmin,
    AreaManager,
    Manager,
    Asisten,
    Mandor,
    Satpam,
    Timbangan,
    Grading,
}

impl Role {
    pub const ALL: [Role; 9] = [
        Role::SuperAdmin,
        Role::CompanyAdmin,
        Role::AreaManager,
        Role::Manager,
        Role::Asisten,
        Role::Mandor,
        Role::Satpam,
        Role::Timbangan,
        Role::Grading,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::CompanyAdmin => "COMPANY_ADMIN",
            Role::AreaManager => "AREA_MANAGER",
            Role::Manager => "MANAGER",
            Role::Asisten => "ASISTEN",
            Role::Mandor => "MANDOR",
            Role::Satpam => "SATPAM",
            Role::Timbangan => "TIMBANGAN",
            Role::Grading => "GRADING",
        }
    }

    /// Whether the business designates this role as dashboard-capable.
    ///
    /// Not the mirror image of [`Role::has_mobile_access`]: admins are
    /// web-only, field clerks are mobile-only, and SATPAM has both.
    pub fn has_web_access(self) -> bool {
        matches!(
            self,
            Role::SuperAdmin
                | Role::CompanyAdmin
                | Role::AreaManager
                | Role::Manager
                | Role::Asisten
                | Role::Satpam
        )
    }

    /// Whether this role may sign in from the mobile field app.
    pub fn has_mobile_access(self) -> bool {
        matches!(
            self,
            Role::AreaManager
                | Role::Manager
                | Role::Asisten
                | Role::Mandor
                | Role::Satpam
                | Role::Timbangan
                | Role::Grading
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown role: {s}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    /// Reporting line (self-referential).
    pub manager_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Raw password (hashed with Argon2id before storage).
    pub password: String,
    pub role: Role,
    pub manager_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    pub name: Option<String>,
    /// `Some(Some(v))` = set, `Some(None)` = clear, `None` = no change.
    pub email: Option<Option<String>>,
    pub phone_number: Option<Option<String>>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub manager_id: Option<Option<Uuid>>,
}
