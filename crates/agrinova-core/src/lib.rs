//! Agrinova Core: domain models, error types and repository traits
//! shared by the auth, persistence and server crates.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{AgrinovaError, AgrinovaResult, AuthErrorKind};
