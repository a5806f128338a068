//! Authentication backend and session-token storage abstractions.

use std::{
  future::Future,
  io,
  sync::{Mutex, PoisonError},
};

use crate::{error::AuthError, identity::Session};

// ─── Backend ─────────────────────────────────────────────────────────────────

/// The server side of authentication: credential checks and token issue.
///
/// Implementations report bad credentials as [`AuthError::InvalidCredentials`]
/// without saying whether the email or the password was wrong.
pub trait AuthBackend: Send + Sync {
  /// Register a new account and open a session for it.
  fn sign_up<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<Session, AuthError>> + Send + 'a;

  /// Check credentials and open a session.
  fn sign_in<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<Session, AuthError>> + Send + 'a;

  /// Look up the session behind `token`. Returns `None` when the token is
  /// unknown or expired.
  fn resume<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<Option<Session>, AuthError>> + Send + 'a;

  /// Revoke `token`. Revoking an unknown token succeeds.
  fn sign_out<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<(), AuthError>> + Send + 'a;

  /// Replace the password of the account that owns `token`.
  fn update_password<'a>(
    &'a self,
    token: &'a str,
    new_password: &'a str,
  ) -> impl Future<Output = Result<(), AuthError>> + Send + 'a;
}

// ─── Credential policy ───────────────────────────────────────────────────────

/// Rules a new password must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
  pub min_length: usize,
}

impl Default for PasswordPolicy {
  fn default() -> Self { Self { min_length: 6 } }
}

impl PasswordPolicy {
  pub fn check(&self, password: &str) -> Result<(), AuthError> {
    if password.chars().count() < self.min_length {
      return Err(AuthError::WeakPassword { min_length: self.min_length });
    }
    Ok(())
  }
}

/// Trim and lowercase an email address for storage and comparison.
pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

/// Minimal shape check: `local@domain.tld`, no whitespace.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
  let invalid = || AuthError::InvalidEmail(email.to_owned());
  if email.chars().any(char::is_whitespace) {
    return Err(invalid());
  }
  let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
  if local.is_empty() || domain.contains('@') {
    return Err(invalid());
  }
  match domain.rsplit_once('.') {
    Some((host, tld)) if !host.is_empty() && !tld.is_empty() => Ok(()),
    _ => Err(invalid()),
  }
}

// ─── Token storage ───────────────────────────────────────────────────────────

/// Where the current session token is kept between runs.
///
/// Each call is a complete acquire/use/release of the underlying storage;
/// nothing is held open between calls.
pub trait TokenStorage: Send + Sync {
  fn load(&self) -> io::Result<Option<String>>;
  fn save(&self, token: &str) -> io::Result<()>;
  fn clear(&self) -> io::Result<()>;
}

/// Process-local token storage; forgets everything on exit.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
  token: Mutex<Option<String>>,
}

impl TokenStorage for MemoryTokenStorage {
  fn load(&self) -> io::Result<Option<String>> {
    Ok(self.token.lock().unwrap_or_else(PoisonError::into_inner).clone())
  }

  fn save(&self, token: &str) -> io::Result<()> {
    *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_owned());
    Ok(())
  }

  fn clear(&self) -> io::Result<()> {
    *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    Ok(())
  }
}
