//! Database-specific error types and conversions.

use agrinova_core::error::AgrinovaError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Corrupt row: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Record already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

impl From<DbError> for AgrinovaError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => AgrinovaError::NotFound { entity, id },
            DbError::AlreadyExists { entity } => AgrinovaError::AlreadyExists { entity },
            DbError::Conflict(message) => AgrinovaError::Conflict { message },
            DbError::Hashing(msg) => AgrinovaError::Crypto(msg),
            other => AgrinovaError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_keeps_its_shape() {
        let err: AgrinovaError = DbError::NotFound {
            entity: "device_binding".into(),
            id: "dev-1".into(),
        }
        .into();
        assert!(err.is_not_found());
    }

    #[test]
    fn conflict_maps_to_core_conflict() {
        let err: AgrinovaError = DbError::Conflict("token already consumed".into()).into();
        assert!(matches!(err, AgrinovaError::Conflict { .. }));
    }

    #[test]
    fn decode_errors_become_database_errors() {
        let err: AgrinovaError = DbError::Decode("invalid UUID".into()).into();
        assert!(matches!(err, AgrinovaError::Database(_)));
    }
}
