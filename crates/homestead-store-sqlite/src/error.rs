//! Error type for `homestead-store-sqlite`.
//!
//! Trait methods convert into the core [`RemoteError`] and [`AuthError`];
//! this type covers the plumbing underneath.

use homestead_core::{AuthError, RemoteError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("password hashing error: {0}")]
  PasswordHash(String),

  #[error("session lifetime {0} does not fit the calendar")]
  SessionTtl(chrono::Duration),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for RemoteError {
  fn from(e: Error) -> Self { RemoteError::Backend(Box::new(e)) }
}

impl From<Error> for AuthError {
  fn from(e: Error) -> Self { AuthError::Backend(Box::new(e)) }
}
