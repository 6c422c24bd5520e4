//! Agrinova Auth: credential verification, mobile token triads, device
//! binding, web sessions and scope resolution.

pub mod audit;
pub mod config;
pub mod credential;
pub mod device;
pub mod error;
pub mod events;
pub mod password;
pub mod qr_login;
pub mod rate_limit;
pub mod scope;
pub mod service;
pub mod token;
pub mod token_service;
pub mod web_session;

pub use config::{AuthConfig, CookieConfig, RateLimitConfig};
pub use credential::Credential;
pub use device::BindDeviceInput;
pub use error::AuthError;
pub use events::SessionEvent;
pub use qr_login::{QrLoginSession, QrLoginStatus};
pub use service::{AuthService, AuthStores, ClientContext};
pub use token::TokenClaims;
pub use web_session::CookieSpec;
