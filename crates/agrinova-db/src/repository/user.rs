//! SurrealDB implementation of [`UserRepository`].
//!
//! Password hashing uses Argon2id with OWASP-recommended parameters
//! (memory: 19 MiB, iterations: 2, parallelism: 1) and a random salt
//! per hash. An optional pepper (server-side secret) can be provided
//! at construction time; it must match the auth layer's pepper.

use agrinova_core::error::AgrinovaResult;
use agrinova_core::models::user::{CreateUser, Role, UpdateUser, User};
use agrinova_core::repository::UserRepository;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{IdRow, parse_opt_uuid, parse_uuid, statement_error};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct UserRow {
    record_id: String,
    username: String,
    name: String,
    email: Option<String>,
    phone_number: Option<String>,
    password_hash: String,
    role: String,
    is_active: bool,
    manager_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_user(self) -> Result<User, DbError> {
        let role: Role = self.role.parse().map_err(DbError::Decode)?;
        Ok(User {
            id: parse_uuid("user", &self.record_id)?,
            username: self.username,
            name: self.name,
            email: self.email,
            phone_number: self.phone_number,
            password_hash: self.password_hash,
            role,
            is_active: self.is_active,
            manager_id: parse_opt_uuid("manager", self.manager_id)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Hash a password with Argon2id using OWASP-recommended parameters.
///
/// If a pepper is provided, it is prepended to the password before
/// hashing.
pub fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, DbError> {
    // OWASP ASVS recommended: m=19456 (19 MiB), t=2, p=1
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| DbError::Hashing(format!("argon2 params: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let peppered: String;
    let input = match pepper {
        Some(p) => {
            peppered = format!("{p}{password}");
            peppered.as_bytes()
        }
        None => password.as_bytes(),
    };

    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| DbError::Hashing(format!("salt: {e}")))?;
    let hash = argon2
        .hash_password(input, &salt)
        .map_err(|e| DbError::Hashing(e.to_string()))?;

    Ok(hash.to_string())
}

const SELECT_USER: &str = "SELECT meta::id(id) AS record_id, * FROM user";

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
    pepper: Option<String>,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db, pepper: None }
    }

    pub fn with_pepper(db: Surreal<C>, pepper: String) -> Self {
        Self {
            db,
            pepper: Some(pepper),
        }
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> AgrinovaResult<User> {
        let id = Uuid::new_v4();
        let password_hash = hash_password(&input.password, self.pepper.as_deref())?;

        self.db
            .query(
                "CREATE type::record('user', $id) SET \
                 username = $username, name = $name, \
                 email = $email, phone_number = $phone_number, \
                 password_hash = $password_hash, role = $role, \
                 is_active = true, manager_id = $manager_id",
            )
            .bind(("id", id.to_string()))
            .bind(("username", input.username))
            .bind(("name", input.name))
            .bind(("email", input.email))
            .bind(("phone_number", input.phone_number))
            .bind(("password_hash", password_hash))
            .bind(("role", input.role.as_str().to_string()))
            .bind(("manager_id", input.manager_id.map(|m| m.to_string())))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| statement_error("user", e))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> AgrinovaResult<User> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('user', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.try_into_user()?)
    }

    async fn get_by_identifier(&self, identifier: &str) -> AgrinovaResult<User> {
        let needle = identifier.trim().to_lowercase();

        let mut result = self
            .db
            .query(format!(
                "{SELECT_USER} WHERE string::lowercase(username) = $needle \
                 OR (email != NONE AND string::lowercase(email) = $needle) \
                 ORDER BY created_at ASC LIMIT 1"
            ))
            .bind(("needle", needle))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: format!("identifier={identifier}"),
        })?;

        Ok(row.try_into_user()?)
    }

    async fn update(&self, id: Uuid, input: UpdateUser) -> AgrinovaResult<User> {
        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.email.is_some() {
            sets.push("email = $email");
        }
        if input.phone_number.is_some() {
            sets.push("phone_number = $phone_number");
        }
        if input.role.is_some() {
            sets.push("role = $role");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        if input.manager_id.is_some() {
            sets.push("manager_id = $manager_id");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('user', $id) SET {} RETURN NONE",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id.to_string()));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(email) = input.email {
            builder = builder.bind(("email", email));
        }
        if let Some(phone_number) = input.phone_number {
            builder = builder.bind(("phone_number", phone_number));
        }
        if let Some(role) = input.role {
            builder = builder.bind(("role", role.as_str().to_string()));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }
        if let Some(manager_id) = input.manager_id {
            builder = builder.bind(("manager_id", manager_id.map(|m| m.to_string())));
        }

        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| statement_error("user", e))?;

        self.get_by_id(id).await
    }

    async fn set_password(&self, id: Uuid, password: &str) -> AgrinovaResult<()> {
        let password_hash = hash_password(password, self.pepper.as_deref())?;

        let mut result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 password_hash = $password_hash, updated_at = time::now() \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id.to_string()))
            .bind(("password_hash", password_hash))
            .await
            .map_err(DbError::from)?;

        let updated: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        if updated.is_empty() {
            return Err(DbError::NotFound {
                entity: "user".into(),
                id: id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}
