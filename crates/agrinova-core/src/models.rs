//! Domain models for the Agrinova auth core.
//!
//! These are the types shared across all crates.

pub mod assignment;
pub mod device;
pub mod scope;
pub mod security_event;
pub mod token;
pub mod user;
pub mod web_session;
