//! Core types and session-state components for Homestead.
//!
//! This crate is deliberately free of database and terminal dependencies.
//! Storage reaches it through the [`remote::RemoteClient`] and
//! [`auth::AuthBackend`] traits; everything else builds on them.

// Native `async fn` in traits; the trait definitions spell out `Send` bounds
// explicitly where they matter.
#![allow(async_fn_in_trait)]

pub mod auth;
pub mod context;
pub mod error;
pub mod favorite;
pub mod favorites;
pub mod identity;
pub mod memory;
pub mod remote;
pub mod role;
pub mod roles;
pub mod session;

pub use context::AppContext;
pub use error::{AuthError, FavoritesError, RemoteError};
pub use favorites::FavoritesManager;
pub use roles::RoleCheck;
pub use session::SessionProvider;
