//! SQLite backend for Homestead.
//!
//! [`SqliteStore`] implements both [`RemoteClient`] (the `favorites` and
//! `user_roles` collections) and [`AuthBackend`] (accounts and session tokens)
//! over one database file. It wraps [`tokio_rusqlite`] so all database access
//! runs on a dedicated thread without blocking the async runtime.
//!
//! [`RemoteClient`]: homestead_core::remote::RemoteClient
//! [`AuthBackend`]: homestead_core::auth::AuthBackend

mod auth;
mod encode;
mod schema;
mod store;

pub mod error;

pub use auth::AuthSettings;
pub use error::{Error, Result};
pub use store::SqliteStore;
