//! Authentication configuration.

use agrinova_core::models::user::Role;

use crate::error::AuthError;

/// Upper bound for every configured lifetime (ten years).
pub const MAX_LIFETIME_SECS: u64 = 10 * 365 * 86_400;

/// Configuration for the authentication core.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// PEM-encoded Ed25519 private key for JWT signing.
    pub jwt_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for JWT verification.
    pub jwt_public_key_pem: String,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Mobile access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
    /// Mobile refresh token lifetime in seconds (default: 604_800 = 7 days).
    pub refresh_token_lifetime_secs: u64,
    /// Offline token lifetime in seconds (default: 2_592_000 = 30 days).
    pub offline_token_lifetime_secs: u64,
    /// Web session lifetime in seconds (default: 86_400 = 24 hours).
    pub session_lifetime_secs: u64,
    /// Web session lifetime when "remember me" is ticked (default: 7 days).
    pub remember_me_lifetime_secs: u64,
    /// CSRF cookie lifetime in seconds (default: 86_400 = 24 hours).
    pub csrf_lifetime_secs: u64,
    /// Lifetime of an unconsumed QR login challenge (default: 120 seconds).
    pub qr_login_lifetime_secs: u64,
    /// Optional pepper prepended to passwords before Argon2id verification.
    pub pepper: Option<String>,
    /// Minimum password length for policy enforcement.
    pub min_password_length: usize,
    /// Roles allowed to obtain a web session.
    pub web_roles: Vec<Role>,
    /// Roles allowed to log in from the mobile app.
    pub mobile_roles: Vec<Role>,
    pub cookies: CookieConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            jwt_issuer: "agrinova".into(),
            access_token_lifetime_secs: 900,
            refresh_token_lifetime_secs: 604_800,
            offline_token_lifetime_secs: 2_592_000,
            session_lifetime_secs: 86_400,
            remember_me_lifetime_secs: 604_800,
            csrf_lifetime_secs: 86_400,
            qr_login_lifetime_secs: 120,
            pepper: None,
            min_password_length: 8,
            web_roles: Role::ALL
                .into_iter()
                .filter(|r| r.has_web_access())
                .collect(),
            mobile_roles: Role::ALL
                .into_iter()
                .filter(|r| r.has_mobile_access())
                .collect(),
            cookies: CookieConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Reject configurations that would issue unusable or unsafe
    /// credentials.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.jwt_private_key_pem.trim().is_empty() || self.jwt_public_key_pem.trim().is_empty()
        {
            return Err(AuthError::Config("JWT signing keys are required".into()));
        }
        if self.jwt_issuer.trim().is_empty() {
            return Err(AuthError::Config("JWT issuer must not be empty".into()));
        }
        let lifetimes = [
            ("access", self.access_token_lifetime_secs),
            ("refresh", self.refresh_token_lifetime_secs),
            ("offline", self.offline_token_lifetime_secs),
            ("session", self.session_lifetime_secs),
            ("remember-me", self.remember_me_lifetime_secs),
            ("csrf", self.csrf_lifetime_secs),
            ("qr-login", self.qr_login_lifetime_secs),
        ];
        if let Some((name, _)) = lifetimes.iter().find(|(_, secs)| *secs == 0) {
            return Err(AuthError::Config(format!("{name} lifetime must be positive")));
        }
        if let Some((name, _)) = lifetimes
            .iter()
            .find(|(_, secs)| *secs > MAX_LIFETIME_SECS)
        {
            return Err(AuthError::Config(format!(
                "{name} lifetime must not exceed {MAX_LIFETIME_SECS}s"
            )));
        }
        if self.refresh_token_lifetime_secs <= self.access_token_lifetime_secs {
            return Err(AuthError::Config(
                "refresh lifetime must exceed access lifetime".into(),
            ));
        }
        if self.offline_token_lifetime_secs <= self.refresh_token_lifetime_secs {
            return Err(AuthError::Config(
                "offline lifetime must exceed refresh lifetime".into(),
            ));
        }
        if self.remember_me_lifetime_secs <= self.session_lifetime_secs {
            return Err(AuthError::Config(
                "remember-me lifetime must exceed session lifetime".into(),
            ));
        }
        if self.min_password_length < 8 {
            return Err(AuthError::Config(
                "minimum password length must be at least 8".into(),
            ));
        }
        Ok(())
    }

    pub fn allows_web(&self, role: Role) -> bool {
        self.web_roles.contains(&role)
    }

    pub fn allows_mobile(&self, role: Role) -> bool {
        self.mobile_roles.contains(&role)
    }
}

/// Attributes of the session and CSRF cookies.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub session_cookie_name: String,
    pub csrf_cookie_name: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub path: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            session_cookie_name: "session_id".into(),
            csrf_cookie_name: "csrf_token".into(),
            domain: None,
            secure: true,
            path: "/".into(),
        }
    }
}

/// Failed web-login throttling per client address.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Failures tolerated inside one window before the client is blocked.
    pub max_failures: u32,
    pub window_secs: u64,
    pub block_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window_secs: 900,
            block_secs: 900,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed() -> AuthConfig {
        AuthConfig {
            jwt_private_key_pem: "private".into(),
            jwt_public_key_pem: "public".into(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_follow_platform_table() {
        let config = AuthConfig::default();
        assert!(config.allows_web(Role::SuperAdmin));
        assert!(!config.allows_mobile(Role::SuperAdmin));
        assert!(config.allows_mobile(Role::Mandor));
        assert!(!config.allows_web(Role::Mandor));
        assert!(config.allows_web(Role::Satpam) && config.allows_mobile(Role::Satpam));
        assert_eq!(config.access_token_lifetime_secs, 900);
        assert_eq!(config.refresh_token_lifetime_secs, 7 * 86_400);
        assert_eq!(config.offline_token_lifetime_secs, 30 * 86_400);
    }

    #[test]
    fn keyed_defaults_validate() {
        keyed().validate().unwrap();
    }

    #[test]
    fn missing_keys_are_rejected() {
        assert!(matches!(
            AuthConfig::default().validate(),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn lifetimes_must_be_ordered() {
        let config = AuthConfig {
            refresh_token_lifetime_secs: 600,
            ..keyed()
        };
        assert!(config.validate().is_err());

        let config = AuthConfig {
            offline_token_lifetime_secs: 604_800,
            ..keyed()
        };
        assert!(config.validate().is_err());

        let config = AuthConfig {
            session_lifetime_secs: 0,
            ..keyed()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn absurd_lifetimes_are_rejected() {
        let config = AuthConfig {
            offline_token_lifetime_secs: 100_000_000_000_000_000,
            ..keyed()
        };
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));

        let config = AuthConfig {
            remember_me_lifetime_secs: MAX_LIFETIME_SECS,
            ..keyed()
        };
        config.validate().unwrap();
    }

    #[test]
    fn short_password_minimum_is_rejected() {
        let config = AuthConfig {
            min_password_length: 4,
            ..keyed()
        };
        assert!(config.validate().is_err());
    }
}
