//! Environment-driven configuration for the server binary.

use std::env;
use std::fs;
use std::str::FromStr;

use agrinova_auth::AuthConfig;
use agrinova_core::models::user::Role;
use agrinova_db::DbConfig;

use crate::ServerError;

/// Everything the composition root needs.
pub struct ServerConfig {
    pub auth: AuthConfig,
    pub db: DbConfig,
    /// Seconds between housekeeping passes (stale sessions, limiter
    /// entries). Zero disables the task.
    pub housekeeping_interval_secs: u64,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServerError> {
        let mut auth = AuthConfig {
            jwt_private_key_pem: read_pem("JWT_PRIVATE_KEY_PATH")?,
            jwt_public_key_pem: read_pem("JWT_PUBLIC_KEY_PATH")?,
            ..AuthConfig::default()
        };

        if let Some(issuer) = optional("JWT_ISSUER") {
            auth.jwt_issuer = issuer;
        }
        override_parsed("MOBILE_ACCESS_TOKEN_SECS", &mut auth.access_token_lifetime_secs)?;
        override_parsed("MOBILE_REFRESH_TOKEN_SECS", &mut auth.refresh_token_lifetime_secs)?;
        override_parsed("MOBILE_OFFLINE_TOKEN_SECS", &mut auth.offline_token_lifetime_secs)?;
        override_parsed("WEB_SESSION_SECS", &mut auth.session_lifetime_secs)?;
        override_parsed("WEB_REMEMBER_ME_SECS", &mut auth.remember_me_lifetime_secs)?;
        override_parsed("WEB_CSRF_SECS", &mut auth.csrf_lifetime_secs)?;
        override_parsed("WEB_QR_LOGIN_SECS", &mut auth.qr_login_lifetime_secs)?;
        override_parsed("MIN_PASSWORD_LENGTH", &mut auth.min_password_length)?;
        override_parsed("LOGIN_MAX_FAILURES", &mut auth.rate_limit.max_failures)?;
        override_parsed("LOGIN_WINDOW_SECS", &mut auth.rate_limit.window_secs)?;
        override_parsed("LOGIN_BLOCK_SECS", &mut auth.rate_limit.block_secs)?;
        override_parsed("COOKIE_SECURE", &mut auth.cookies.secure)?;
        auth.pepper = optional("PASSWORD_PEPPER");
        auth.cookies.domain = optional("COOKIE_DOMAIN");
        if let Some(roles) = optional("WEB_ROLES") {
            auth.web_roles = parse_roles("WEB_ROLES", &roles)?;
        }
        if let Some(roles) = optional("MOBILE_ROLES") {
            auth.mobile_roles = parse_roles("MOBILE_ROLES", &roles)?;
        }

        let mut db = DbConfig::default();
        if let Some(url) = optional("SURREAL_URL") {
            db.url = url;
        }
        if let Some(namespace) = optional("SURREAL_NAMESPACE") {
            db.namespace = namespace;
        }
        if let Some(database) = optional("SURREAL_DATABASE") {
            db.database = database;
        }
        if let Some(username) = optional("SURREAL_USERNAME") {
            db.username = username;
        }
        if let Some(password) = optional("SURREAL_PASSWORD") {
            db.password = password;
        }

        let mut housekeeping_interval_secs = 300;
        override_parsed("HOUSEKEEPING_INTERVAL_SECS", &mut housekeeping_interval_secs)?;

        Ok(Self {
            auth,
            db,
            housekeeping_interval_secs,
        })
    }
}

/// Set and non-blank, trimmed.
fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn override_parsed<T: FromStr>(key: &str, target: &mut T) -> Result<(), ServerError> {
    if let Some(raw) = optional(key) {
        *target = raw.parse().map_err(|_| ServerError::Config {
            key: key.to_string(),
            message: format!("cannot parse {raw:?}"),
        })?;
    }
    Ok(())
}

fn read_pem(key: &str) -> Result<String, ServerError> {
    let path = optional(key).ok_or_else(|| ServerError::Config {
        key: key.to_string(),
        message: "required but not set".into(),
    })?;
    fs::read_to_string(&path).map_err(|e| ServerError::Config {
        key: key.to_string(),
        message: format!("cannot read {path}: {e}"),
    })
}

/// Comma-separated role names, e.g. `MANAGER,ASISTEN`.
fn parse_roles(key: &str, raw: &str) -> Result<Vec<Role>, ServerError> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            name.parse::<Role>().map_err(|_| ServerError::Config {
                key: key.to_string(),
                message: format!("unknown role {name:?}"),
            })
        })
        .collect()
}
