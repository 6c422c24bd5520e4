//! SurrealDB implementation of [`TokenRepository`].
//!
//! Only SHA-256 digests are stored. Multi-record changes (login token
//! replacement and refresh rotation) run inside a single SurrealQL
//! transaction so no reader observes a device with two live refresh
//! tokens.

use agrinova_core::error::AgrinovaResult;
use agrinova_core::models::token::{CreateTokenRecord, TokenKind, TokenRecord};
use agrinova_core::repository::TokenRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{IdRow, parse_uuid, statement_error, transaction_error};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct TokenRow {
    record_id: String,
    user_id: String,
    device_id: Option<String>,
    kind: String,
    token_hash: String,
    expires_at: DateTime<Utc>,
    is_revoked: bool,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TokenRow {
    fn try_into_record(self) -> Result<TokenRecord, DbError> {
        let kind = match self.kind.as_str() {
            "Refresh" => TokenKind::Refresh,
            "Offline" => TokenKind::Offline,
            other => return Err(DbError::Decode(format!("unknown token kind: {other}"))),
        };
        Ok(TokenRecord {
            id: parse_uuid("auth_token", &self.record_id)?,
            user_id: parse_uuid("user", &self.user_id)?,
            device_id: self.device_id,
            kind,
            token_hash: self.token_hash,
            expires_at: self.expires_at,
            is_revoked: self.is_revoked,
            revoked_at: self.revoked_at,
            created_at: self.created_at,
        })
    }
}

const SELECT_TOKEN: &str = "SELECT meta::id(id) AS record_id, * FROM auth_token";

const CREATE_TOKEN_FIELDS: &str = "user_id = $user_id{i}, device_id = $device_id{i}, \
     kind = $kind{i}, token_hash = $token_hash{i}, \
     expires_at = $expires_at{i}, is_revoked = false";

fn create_statement(index: usize) -> String {
    format!(
        "CREATE type::record('auth_token', $id{index}) SET {} RETURN NONE;",
        CREATE_TOKEN_FIELDS.replace("{i}", &index.to_string())
    )
}

#[derive(Clone)]
pub struct SurrealTokenRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTokenRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<TokenRecord>, DbError> {
        let mut result = self
            .db
            .query(format!("{SELECT_TOKEN} WHERE id = type::record('auth_token', $id)"))
            .bind(("id", id.to_string()))
            .await?;

        let rows: Vec<TokenRow> = result.take(0)?;
        rows.into_iter()
            .next()
            .map(TokenRow::try_into_record)
            .transpose()
    }

    async fn select_by_hash(
        &self,
        kind: TokenKind,
        token_hash: &str,
        extra: &str,
    ) -> Result<TokenRecord, DbError> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_TOKEN} WHERE token_hash = $token_hash AND kind = $kind{extra} \
                 ORDER BY created_at DESC LIMIT 1"
            ))
            .bind(("token_hash", token_hash.to_string()))
            .bind(("kind", kind.as_str().to_string()))
            .await?;

        let rows: Vec<TokenRow> = result.take(0)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "auth_token".into(),
            id: format!("{kind} token"),
        })?;
        row.try_into_record()
    }

    async fn revoke_where(
        &self,
        condition: &str,
        user_id: Uuid,
        device_id: Option<&str>,
    ) -> Result<u64, DbError> {
        let mut result = self
            .db
            .query(format!(
                "UPDATE auth_token SET is_revoked = true, revoked_at = time::now() \
                 WHERE {condition} AND is_revoked = false \
                 RETURN meta::id(id) AS record_id"
            ))
            .bind(("user_id", user_id.to_string()))
            .bind(("device_id", device_id.map(str::to_string)))
            .await?;

        let revoked: Vec<IdRow> = result.take(0)?;
        Ok(revoked.len() as u64)
    }
}

impl<C: Connection> TokenRepository for SurrealTokenRepository<C> {
    async fn create(&self, input: CreateTokenRecord) -> AgrinovaResult<TokenRecord> {
        let id = input.id;

        self.db
            .query(create_statement(0))
            .bind(("id0", id.to_string()))
            .bind(("user_id0", input.user_id.to_string()))
            .bind(("device_id0", input.device_id))
            .bind(("kind0", input.kind.as_str().to_string()))
            .bind(("token_hash0", input.token_hash))
            .bind(("expires_at0", input.expires_at))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| statement_error("auth_token", e))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> AgrinovaResult<TokenRecord> {
        Ok(self.fetch(id).await?.ok_or_else(|| DbError::NotFound {
            entity: "auth_token".into(),
            id: id.to_string(),
        })?)
    }

    async fn find_by_hash(&self, kind: TokenKind, token_hash: &str) -> AgrinovaResult<TokenRecord> {
        Ok(self.select_by_hash(kind, token_hash, "").await?)
    }

    async fn find_live_by_hash(
        &self,
        kind: TokenKind,
        token_hash: &str,
    ) -> AgrinovaResult<TokenRecord> {
        Ok(self
            .select_by_hash(
                kind,
                token_hash,
                " AND is_revoked = false AND expires_at > time::now()",
            )
            .await?)
    }

    async fn revoke(&self, id: Uuid) -> AgrinovaResult<bool> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('auth_token', $id) \
                 SET is_revoked = true, revoked_at = time::now() \
                 WHERE is_revoked = false \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let revoked: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        Ok(!revoked.is_empty())
    }

    async fn revoke_for_device(&self, user_id: Uuid, device_id: &str) -> AgrinovaResult<u64> {
        Ok(self
            .revoke_where(
                "user_id = $user_id AND device_id = $device_id",
                user_id,
                Some(device_id),
            )
            .await?)
    }

    async fn revoke_for_user(&self, user_id: Uuid) -> AgrinovaResult<u64> {
        Ok(self.revoke_where("user_id = $user_id", user_id, None).await?)
    }

    async fn replace_device_tokens(
        &self,
        user_id: Uuid,
        device_id: &str,
        records: Vec<CreateTokenRecord>,
    ) -> AgrinovaResult<Vec<TokenRecord>> {
        let mut sql = String::from(
            "BEGIN TRANSACTION;\n\
             UPDATE auth_token SET is_revoked = true, revoked_at = time::now() \
             WHERE user_id = $user_id AND device_id = $device_id \
             AND is_revoked = false RETURN NONE;\n",
        );
        for index in 0..records.len() {
            sql.push_str(&create_statement(index));
            sql.push('\n');
        }
        sql.push_str("COMMIT TRANSACTION;");

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let mut builder = self
            .db
            .query(sql)
            .bind(("user_id", user_id.to_string()))
            .bind(("device_id", device_id.to_string()));
        for (index, record) in records.into_iter().enumerate() {
            builder = builder
                .bind((format!("id{index}"), record.id.to_string()))
                .bind((format!("user_id{index}"), record.user_id.to_string()))
                .bind((format!("device_id{index}"), record.device_id))
                .bind((format!("kind{index}"), record.kind.as_str().to_string()))
                .bind((format!("token_hash{index}"), record.token_hash))
                .bind((format!("expires_at{index}"), record.expires_at));
        }

        let mut response = builder.await.map_err(DbError::from)?;
        let errors = response.take_errors();
        if !errors.is_empty() {
            return Err(transaction_error("auth_token", errors).into());
        }

        debug!(%user_id, device_id, issued = ids.len(), "Replaced device tokens");

        let mut issued = Vec::with_capacity(ids.len());
        for id in ids {
            issued.push(self.get_by_id(id).await?);
        }
        Ok(issued)
    }

    async fn rotate(
        &self,
        consumed_id: Uuid,
        replacement: CreateTokenRecord,
    ) -> AgrinovaResult<TokenRecord> {
        let new_id = replacement.id;
        let sql = format!(
            "BEGIN TRANSACTION;\n\
             LET $consumed = (UPDATE type::record('auth_token', $consumed_id) \
             SET is_revoked = true, revoked_at = time::now() \
             WHERE is_revoked = false AND user_id = $user_id0 \
             RETURN meta::id(id) AS record_id);\n\
             IF array::len($consumed) > 0 {{\n\
             UPDATE auth_token SET is_revoked = true, revoked_at = time::now() \
             WHERE user_id = $user_id0 AND device_id = $device_id0 \
             AND kind = 'Refresh' AND is_revoked = false RETURN NONE;\n\
             {}\n\
             }};\n\
             COMMIT TRANSACTION;",
            create_statement(0)
        );

        let mut response = self
            .db
            .query(sql)
            .bind(("consumed_id", consumed_id.to_string()))
            .bind(("id0", new_id.to_string()))
            .bind(("user_id0", replacement.user_id.to_string()))
            .bind(("device_id0", replacement.device_id))
            .bind(("kind0", replacement.kind.as_str().to_string()))
            .bind(("token_hash0", replacement.token_hash))
            .bind(("expires_at0", replacement.expires_at))
            .await
            .map_err(DbError::from)?;
        // A concurrent spend of the same record cancels this transaction.
        let errors = response.take_errors();
        if !errors.is_empty() {
            let err = transaction_error("auth_token", errors);
            debug!(%consumed_id, error = %err, "Rotation aborted");
            return Err(err.into());
        }

        match self.fetch(new_id).await? {
            Some(record) => Ok(record),
            None => {
                debug!(%consumed_id, "Rotation lost: token already consumed");
                Err(DbError::Conflict(format!("auth_token {consumed_id} already consumed")).into())
            }
        }
    }
}
