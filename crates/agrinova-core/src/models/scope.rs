//! Authorized operational scope derived from role + assignments.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coverage at one level of the company/estate/division hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "ids", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeLevel {
    /// Everything at this level (within the enclosing levels).
    All,
    /// Only the listed ids; empty means nothing.
    Listed(Vec<Uuid>),
}

impl ScopeLevel {
    pub fn none() -> Self {
        ScopeLevel::Listed(Vec::new())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        match self {
            ScopeLevel::All => true,
            ScopeLevel::Listed(ids) => ids.contains(&id),
        }
    }

    /// Listed ids, or `None` for unrestricted coverage.
    pub fn ids(&self) -> Option<&[Uuid]> {
        match self {
            ScopeLevel::All => None,
            ScopeLevel::Listed(ids) => Some(ids),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedScope {
    pub companies: ScopeLevel,
    pub estates: ScopeLevel,
    pub divisions: ScopeLevel,
}

impl AuthorizedScope {
    pub fn unrestricted() -> Self {
        Self {
            companies: ScopeLevel::All,
            estates: ScopeLevel::All,
            divisions: ScopeLevel::All,
        }
    }

    pub fn empty() -> Self {
        Self {
            companies: ScopeLevel::none(),
            estates: ScopeLevel::none(),
            divisions: ScopeLevel::none(),
        }
    }
}
