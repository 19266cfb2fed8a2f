//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Credential store seam for the session manager

mod database;
mod models;
mod store;

pub use database::{Database, hash_session_token};
pub use models::*;
pub use store::CredentialStore;
