//! Error types for `homestead-core`.
//!
//! Each component surfaces its own enum: the remote data client fails with
//! [`RemoteError`], the identity provider with [`AuthError`], and the
//! favorites manager with [`FavoritesError`].

use thiserror::Error;

use crate::remote::Collection;

/// A failure reported by a [`RemoteClient`](crate::remote::RemoteClient).
#[derive(Debug, Error)]
pub enum RemoteError {
  /// A uniqueness constraint on the collection rejected the write.
  #[error("uniqueness conflict on {collection}: {detail}")]
  Conflict {
    collection: Collection,
    detail:     String,
  },

  #[error("unknown column {column:?} for {collection}")]
  UnknownColumn {
    collection: Collection,
    column:     String,
  },

  #[error("malformed row from {collection}: {source}")]
  MalformedRow {
    collection: Collection,
    #[source]
    source:     serde_json::Error,
  },

  #[error("backend error: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RemoteError {
  pub fn is_conflict(&self) -> bool { matches!(self, Self::Conflict { .. }) }
}

/// A failure of a sign-in, sign-up or credential operation.
#[derive(Debug, Error)]
pub enum AuthError {
  #[error("invalid email or password")]
  InvalidCredentials,

  #[error("an account with email {0:?} already exists")]
  EmailTaken(String),

  #[error("invalid email address: {0:?}")]
  InvalidEmail(String),

  #[error("password must be at least {min_length} characters long")]
  WeakPassword { min_length: usize },

  #[error("not signed in")]
  NotSignedIn,

  #[error("token storage error: {0}")]
  Storage(#[from] std::io::Error),

  #[error("auth backend error: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A failure of a [`FavoritesManager`](crate::favorites::FavoritesManager)
/// command.
#[derive(Debug, Error)]
pub enum FavoritesError {
  #[error("sign in to manage favorites")]
  AuthRequired,

  #[error("property {0:?} is already in favorites")]
  DuplicateFavorite(String),

  #[error("{field} must not be empty")]
  InvalidInput { field: &'static str },

  #[error(transparent)]
  Remote(#[from] RemoteError),
}
