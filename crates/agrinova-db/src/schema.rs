//! Schema definitions and migration runner for SurrealDB.
//!
//! Every table is SCHEMAFULL. UUIDs are stored as strings and enums as
//! strings guarded by ASSERT constraints.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct AppliedMigration {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "auth_core",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1: identity, device bindings, tokens, sessions, audit
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Users
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD username ON TABLE user TYPE string;
DEFINE FIELD name ON TABLE user TYPE string;
DEFINE FIELD email ON TABLE user TYPE option<string>;
DEFINE FIELD phone_number ON TABLE user TYPE option<string>;
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD role ON TABLE user TYPE string \
    ASSERT $value IN ['SUPER_ADMIN', 'COMPANY_ADMIN', 'AREA_MANAGER', \
    'MANAGER', 'ASISTEN', 'MANDOR', 'SATPAM', 'TIMBANGAN', 'GRADING'];
DEFINE FIELD is_active ON TABLE user TYPE bool DEFAULT true;
DEFINE FIELD manager_id ON TABLE user TYPE option<string>;
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_username ON TABLE user COLUMNS username UNIQUE;
DEFINE INDEX idx_user_email ON TABLE user COLUMNS email;

-- =======================================================================
-- Assignments (company / estate / division scope grants)
-- =======================================================================
DEFINE TABLE assignment SCHEMAFULL;
DEFINE FIELD user_id ON TABLE assignment TYPE string;
DEFINE FIELD company_id ON TABLE assignment TYPE string;
DEFINE FIELD estate_id ON TABLE assignment TYPE option<string>;
DEFINE FIELD division_id ON TABLE assignment TYPE option<string>;
DEFINE FIELD is_active ON TABLE assignment TYPE bool DEFAULT true;
DEFINE FIELD assigned_by ON TABLE assignment TYPE option<string>;
DEFINE FIELD created_at ON TABLE assignment TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_assignment_user ON TABLE assignment \
    COLUMNS user_id, created_at;

-- =======================================================================
-- Device bindings (one per user + device)
-- =======================================================================
DEFINE TABLE device_binding SCHEMAFULL;
DEFINE FIELD user_id ON TABLE device_binding TYPE string;
DEFINE FIELD device_id ON TABLE device_binding TYPE string;
DEFINE FIELD device_fingerprint ON TABLE device_binding TYPE string;
DEFINE FIELD platform ON TABLE device_binding TYPE string \
    ASSERT $value IN ['WEB', 'ANDROID', 'IOS'];
DEFINE FIELD device_info ON TABLE device_binding TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD biometric_hash ON TABLE device_binding TYPE option<string>;
DEFINE FIELD is_trusted ON TABLE device_binding TYPE bool DEFAULT false;
DEFINE FIELD is_authorized ON TABLE device_binding TYPE bool DEFAULT true;
DEFINE FIELD last_seen_at ON TABLE device_binding TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD authorized_by ON TABLE device_binding TYPE option<string>;
DEFINE FIELD authorized_at ON TABLE device_binding TYPE option<datetime>;
DEFINE FIELD revoked_at ON TABLE device_binding TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE device_binding TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE device_binding TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_device_binding_user_device ON TABLE device_binding \
    COLUMNS user_id, device_id UNIQUE;

-- =======================================================================
-- Persisted tokens (refresh + offline; stored as SHA-256 digests)
-- =======================================================================
DEFINE TABLE auth_token SCHEMAFULL;
DEFINE FIELD user_id ON TABLE auth_token TYPE string;
DEFINE FIELD device_id ON TABLE auth_token TYPE option<string>;
DEFINE FIELD kind ON TABLE auth_token TYPE string \
    ASSERT $value IN ['Refresh', 'Offline'];
DEFINE FIELD token_hash ON TABLE auth_token TYPE string;
DEFINE FIELD expires_at ON TABLE auth_token TYPE datetime;
DEFINE FIELD is_revoked ON TABLE auth_token TYPE bool DEFAULT false;
DEFINE FIELD revoked_at ON TABLE auth_token TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE auth_token TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_auth_token_hash ON TABLE auth_token \
    COLUMNS token_hash UNIQUE;
DEFINE INDEX idx_auth_token_device ON TABLE auth_token \
    COLUMNS user_id, device_id;

-- =======================================================================
-- Web sessions (cookie auth; revoked softly, never deleted)
-- =======================================================================
DEFINE TABLE web_session SCHEMAFULL;
DEFINE FIELD user_id ON TABLE web_session TYPE string;
DEFINE FIELD token_hash ON TABLE web_session TYPE string;
DEFINE FIELD csrf_token_hash ON TABLE web_session TYPE string;
DEFINE FIELD device_id ON TABLE web_session TYPE option<string>;
DEFINE FIELD ip_address ON TABLE web_session TYPE option<string>;
DEFINE FIELD user_agent ON TABLE web_session TYPE option<string>;
DEFINE FIELD login_method ON TABLE web_session TYPE string \
    DEFAULT 'PASSWORD';
DEFINE FIELD last_activity ON TABLE web_session TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD expires_at ON TABLE web_session TYPE datetime;
DEFINE FIELD is_active ON TABLE web_session TYPE bool DEFAULT true;
DEFINE FIELD revoked ON TABLE web_session TYPE bool DEFAULT false;
DEFINE FIELD revoked_by ON TABLE web_session TYPE option<string>;
DEFINE FIELD revoked_reason ON TABLE web_session TYPE option<string>;
DEFINE FIELD revoked_at ON TABLE web_session TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE web_session TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_web_session_token ON TABLE web_session \
    COLUMNS token_hash UNIQUE;
DEFINE INDEX idx_web_session_user ON TABLE web_session \
    COLUMNS user_id;

-- =======================================================================
-- Security events (append-only)
-- =======================================================================
DEFINE TABLE security_event SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD kind ON TABLE security_event TYPE string \
    ASSERT $value IN ['LOGIN_SUCCESS', 'LOGIN_FAILURE', 'LOGOUT', \
    'PASSWORD_CHANGE', 'DEVICE_BIND', 'DEVICE_UNBIND', 'DEVICE_TRUST', \
    'SESSION_REVOKED', 'SUSPICIOUS_ACTIVITY'];
DEFINE FIELD severity ON TABLE security_event TYPE string \
    ASSERT $value IN ['INFO', 'WARNING', 'CRITICAL'];
DEFINE FIELD user_id ON TABLE security_event TYPE option<string>;
DEFINE FIELD ip_address ON TABLE security_event TYPE option<string>;
DEFINE FIELD user_agent ON TABLE security_event TYPE option<string>;
DEFINE FIELD details ON TABLE security_event TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD created_at ON TABLE security_event TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_security_event_time ON TABLE security_event \
    COLUMNS created_at;
DEFINE INDEX idx_security_event_user ON TABLE security_event \
    COLUMNS user_id, created_at;
";

/// Run all pending migrations against the given database.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the recorded maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let applied: Vec<AppliedMigration> = result.take(0)?;
    let current_version = applied.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "could not record v{}: {}",
                    migration.version, e,
                ))
            })?;
    }

    Ok(())
}

/// Raw DDL of schema version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
