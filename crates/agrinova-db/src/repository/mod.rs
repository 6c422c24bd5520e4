//! SurrealDB repository implementations.

mod assignment;
mod device;
mod security_event;
mod token;
mod user;
mod web_session;

pub use assignment::SurrealAssignmentRepository;
pub use device::SurrealDeviceRepository;
pub use security_event::SurrealSecurityEventRepository;
pub use token::SurrealTokenRepository;
pub use user::{SurrealUserRepository, hash_password};
pub use web_session::SurrealWebSessionRepository;

use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// Row struct for statements that only report which records they hit.
#[derive(Debug, SurrealValue)]
struct IdRow {
    #[allow(dead_code)]
    record_id: String,
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::Decode(format!("invalid {field} UUID: {e}")))
}

fn parse_opt_uuid(field: &str, raw: Option<String>) -> Result<Option<Uuid>, DbError> {
    raw.map(|s| parse_uuid(field, &s)).transpose()
}

/// Placeholder SurrealDB reports for statements skipped because their
/// transaction was cancelled.
const CANCELLED_STATEMENT: &str = "failed transaction";

/// Map a failed statement to a typed error, recognising unique-index
/// violations and transaction write conflicts.
fn statement_error(entity: &str, err: impl std::fmt::Display) -> DbError {
    let message = err.to_string();
    if message.contains("already contains") {
        DbError::AlreadyExists {
            entity: entity.to_string(),
        }
    } else if message.contains("read or write conflict")
        || message.contains("transaction conflict")
        || message.contains(CANCELLED_STATEMENT)
    {
        DbError::Conflict(format!("{entity}: concurrent write"))
    } else {
        DbError::Query(message)
    }
}

/// Classify the errors of a multi-statement transaction by its root
/// cause. When every statement only reports the cancellation, the
/// transaction lost a race at commit and the result is `Conflict`.
fn transaction_error<E: std::fmt::Display>(
    entity: &str,
    errors: impl IntoIterator<Item = (usize, E)>,
) -> DbError {
    let mut errors: Vec<(usize, String)> = errors
        .into_iter()
        .map(|(index, e)| (index, e.to_string()))
        .collect();
    errors.sort_by_key(|(index, _)| *index);

    match errors
        .iter()
        .find(|(_, message)| !message.contains(CANCELLED_STATEMENT))
    {
        Some((_, root)) => statement_error(entity, root),
        None => DbError::Conflict(format!("{entity}: transaction cancelled")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANCELLED: &str = "The query was not executed due to a failed transaction";

    #[test]
    fn cancelled_transaction_is_a_conflict() {
        let err = transaction_error("auth_token", vec![(0, CANCELLED), (1, CANCELLED)]);
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn root_cause_wins_over_cancellation_placeholders() {
        let err = transaction_error(
            "auth_token",
            vec![
                (2, CANCELLED),
                (1, "Found 'x' for field `kind`, but expected a string"),
                (0, CANCELLED),
            ],
        );
        match err {
            DbError::Query(message) => assert!(message.contains("field `kind`")),
            other => panic!("expected a query error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_inside_transaction_stays_a_duplicate() {
        let err = transaction_error(
            "auth_token",
            vec![(0, CANCELLED), (1, "Database index `token_hash` already contains 'abc'")],
        );
        assert!(matches!(err, DbError::AlreadyExists { .. }));
    }
}
