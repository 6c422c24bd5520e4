//! Cookie-backed web sessions with a paired CSRF token.

use std::fmt;
use std::sync::Arc;

use agrinova_core::error::AgrinovaResult;
use agrinova_core::models::web_session::{CreateWebSession, SessionRevocation, WebSession};
use agrinova_core::repository::WebSessionRepository;
use chrono::Utc;
use subtle::ConstantTimeEq;
use tracing::warn;
use uuid::Uuid;

use crate::config::{AuthConfig, CookieConfig};
use crate::error::AuthError;
use crate::token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
        }
    }
}

/// A cookie the transport layer should set (or clear).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    pub max_age_secs: u64,
    pub same_site: SameSite,
    pub http_only: bool,
    pub secure: bool,
    pub path: String,
    pub domain: Option<String>,
}

impl CookieSpec {
    fn new(config: &CookieConfig, name: &str, value: String, max_age_secs: u64, same_site: SameSite) -> Self {
        Self {
            name: name.to_string(),
            value,
            max_age_secs,
            same_site,
            http_only: true,
            secure: config.secure,
            path: config.path.clone(),
            domain: config.domain.clone(),
        }
    }

    pub fn session(config: &CookieConfig, value: String, max_age_secs: u64) -> Self {
        Self::new(config, &config.session_cookie_name, value, max_age_secs, SameSite::Lax)
    }

    pub fn csrf(config: &CookieConfig, value: String, max_age_secs: u64) -> Self {
        Self::new(config, &config.csrf_cookie_name, value, max_age_secs, SameSite::Strict)
    }

    /// The pair of cookies that removes a session from the browser.
    pub fn clearing(config: &CookieConfig) -> [CookieSpec; 2] {
        [
            Self::session(config, String::new(), 0),
            Self::csrf(config, String::new(), 0),
        ]
    }
}

/// `Set-Cookie` header value.
impl fmt::Display for CookieSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path={}", self.name, self.value, self.path)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        write!(f, "; Max-Age={}", self.max_age_secs)?;
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        write!(f, "; SameSite={}", self.same_site.as_str())
    }
}

/// A freshly created session with its raw secrets. The raw values are
/// never stored.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: WebSession,
    pub session_token: String,
    pub csrf_token: String,
    pub cookies: [CookieSpec; 2],
}

/// Client details recorded on a new session.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub fingerprint: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct WebSessionManager<W: WebSessionRepository> {
    sessions: W,
    config: Arc<AuthConfig>,
}

impl<W: WebSessionRepository> WebSessionManager<W> {
    pub fn new(sessions: W, config: Arc<AuthConfig>) -> Self {
        Self { sessions, config }
    }

    /// `login_method` is recorded on the session (`PASSWORD`, `QR_CODE`).
    pub async fn create_session(
        &self,
        user_id: Uuid,
        login_method: &str,
        remember_me: bool,
        client: ClientInfo,
    ) -> AgrinovaResult<IssuedSession> {
        let lifetime_secs = if remember_me {
            self.config.remember_me_lifetime_secs
        } else {
            self.config.session_lifetime_secs
        };
        let expires_at = token::expiry_after(Utc::now(), lifetime_secs)?;

        let session_token = token::generate_opaque_token();
        let csrf_token = token::generate_opaque_token();

        let session = self
            .sessions
            .create(CreateWebSession {
                user_id,
                token_hash: token::hash_token(&session_token),
                csrf_token_hash: token::hash_token(&csrf_token),
                device_id: client.fingerprint,
                ip_address: client.ip_address,
                user_agent: client.user_agent,
                login_method: login_method.to_string(),
                expires_at,
            })
            .await?;

        let cookies = [
            CookieSpec::session(&self.config.cookies, session_token.clone(), lifetime_secs),
            CookieSpec::csrf(
                &self.config.cookies,
                csrf_token.clone(),
                self.config.csrf_lifetime_secs,
            ),
        ];

        Ok(IssuedSession {
            session,
            session_token,
            csrf_token,
            cookies,
        })
    }

    /// Resolve a session cookie to a live session and bump its activity.
    pub async fn validate_session(&self, session_token: &str) -> AgrinovaResult<WebSession> {
        let session = match self
            .sessions
            .get_by_token_hash(&token::hash_token(session_token))
            .await
        {
            Ok(session) => session,
            Err(e) if e.is_not_found() => return Err(AuthError::InvalidSession.into()),
            Err(e) => return Err(e),
        };
        if !session.is_valid(Utc::now()) {
            return Err(AuthError::InvalidSession.into());
        }

        if let Err(e) = self.sessions.touch(session.id).await {
            warn!(error = %e, session_id = %session.id, "Failed to update session activity");
        }
        Ok(session)
    }

    pub fn validate_csrf(&self, session: &WebSession, csrf_token: &str) -> Result<(), AuthError> {
        let presented = token::hash_token(csrf_token);
        if bool::from(
            presented
                .as_bytes()
                .ct_eq(session.csrf_token_hash.as_bytes()),
        ) {
            Ok(())
        } else {
            Err(AuthError::InvalidSession)
        }
    }

    pub async fn get(&self, session_id: Uuid) -> AgrinovaResult<WebSession> {
        match self.sessions.get_by_id(session_id).await {
            Err(e) if e.is_not_found() => Err(AuthError::InvalidSession.into()),
            other => other,
        }
    }

    /// Soft revoke; the row stays for the audit trail.
    pub async fn revoke(
        &self,
        session_id: Uuid,
        revoked_by: Option<Uuid>,
        reason: &str,
    ) -> AgrinovaResult<WebSession> {
        let revocation = SessionRevocation {
            revoked_by,
            reason: reason.to_string(),
        };
        match self.sessions.revoke(session_id, revocation).await {
            Err(e) if e.is_not_found() => Err(AuthError::InvalidSession.into()),
            other => other,
        }
    }

    pub async fn revoke_for_user(
        &self,
        user_id: Uuid,
        revoked_by: Option<Uuid>,
        reason: &str,
    ) -> AgrinovaResult<u64> {
        self.sessions
            .revoke_for_user(
                user_id,
                SessionRevocation {
                    revoked_by,
                    reason: reason.to_string(),
                },
            )
            .await
    }

    pub async fn list_active(&self, user_id: Uuid) -> AgrinovaResult<Vec<WebSession>> {
        self.sessions.list_active_for_user(user_id).await
    }

    pub async fn expire_stale(&self) -> AgrinovaResult<u64> {
        self.sessions.expire_stale().await
    }

    pub fn clearing_cookies(&self) -> [CookieSpec; 2] {
        CookieSpec::clearing(&self.config.cookies)
    }
}
