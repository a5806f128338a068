//! [`AuthBackend`] for [`SqliteStore`]: argon2id password hashes and opaque
//! bearer tokens of which only a SHA-256 digest is stored.

use argon2::{
  Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
  password_hash::SaltString,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use rusqlite::OptionalExtension as _;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use homestead_core::{
  AuthError,
  auth::{AuthBackend, PasswordPolicy, normalize_email, validate_email},
  identity::{Identity, Session},
};

use crate::{
  Error, Result, SqliteStore,
  encode::{decode_dt, decode_uuid, encode_dt, encode_uuid},
  store::is_unique_violation,
};

/// Credential rules and costs applied by the store's auth backend.
#[derive(Debug, Clone)]
pub struct AuthSettings {
  pub policy:      PasswordPolicy,
  pub session_ttl: Duration,
  /// Argon2id cost parameters for new hashes. Existing hashes verify with
  /// the parameters recorded in their PHC string.
  pub hashing:     Params,
}

impl Default for AuthSettings {
  fn default() -> Self {
    Self {
      policy:      PasswordPolicy::default(),
      session_ttl: Duration::hours(168),
      hashing:     Params::default(),
    }
  }
}

// ─── Primitives ──────────────────────────────────────────────────────────────

fn hash_password(params: &Params, password: &str) -> Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| Error::PasswordHash(e.to_string()))
}

fn verify_password(phc: &str, password: &str) -> Result<bool> {
  let parsed = PasswordHash::new(phc).map_err(|e| Error::PasswordHash(e.to_string()))?;
  Ok(
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed)
      .is_ok(),
  )
}

/// 32 random bytes, base64url without padding.
fn new_token() -> String {
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  URL_SAFE_NO_PAD.encode(bytes)
}

fn token_digest(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

// ─── Store helpers ───────────────────────────────────────────────────────────

impl SqliteStore {
  /// When a session opened at `now` expires.
  fn session_expiry(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    now
      .checked_add_signed(self.auth.session_ttl)
      .ok_or(Error::SessionTtl(self.auth.session_ttl))
  }

  /// Record a new session for `identity` and hand back its token.
  async fn open_session(&self, identity: Identity) -> Result<Session> {
    let token = new_token();
    let now = Utc::now();
    let expires_at = self.session_expiry(now)?;

    let digest = token_digest(&token);
    let user_id = encode_uuid(identity.user_id);
    let created = encode_dt(now);
    let expires = encode_dt(expires_at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO auth_sessions (token_hash, user_id, created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![digest, user_id, created, expires],
        )?;
        Ok(())
      })
      .await?;

    debug!(user_id = %identity.user_id, %expires_at, "session opened");
    Ok(Session { identity, token, expires_at })
  }

  /// `(user_id, email, password_hash)` for a normalized email.
  async fn credentials(&self, email: String) -> Result<Option<(Uuid, String, String)>> {
    let row: Option<(String, String, String)> = self
      .conn
      .call(move |conn| {
        let found = conn
          .query_row(
            "SELECT user_id, email, password_hash FROM auth_users WHERE email = ?1",
            [email],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
          )
          .optional()?;
        Ok(found)
      })
      .await?;

    row
      .map(|(id, email, hash)| Ok((decode_uuid(&id)?, email, hash)))
      .transpose()
  }

  async fn lookup_session(&self, token: &str) -> Result<Option<Session>> {
    let digest = token_digest(token);
    let row: Option<(String, String, String)> = self
      .conn
      .call(move |conn| {
        let found = conn
          .query_row(
            "SELECT s.user_id, u.email, s.expires_at
               FROM auth_sessions s
               JOIN auth_users u ON u.user_id = s.user_id
              WHERE s.token_hash = ?1",
            [digest],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
          )
          .optional()?;
        Ok(found)
      })
      .await?;

    let Some((user_id, email, expires_at)) = row else {
      return Ok(None);
    };
    let session = Session {
      identity:   Identity { user_id: decode_uuid(&user_id)?, email },
      token:      token.to_owned(),
      expires_at: decode_dt(&expires_at)?,
    };
    if session.is_expired_at(Utc::now()) {
      debug!(user_id = %session.identity.user_id, "session expired");
      self.revoke(token).await?;
      return Ok(None);
    }
    Ok(Some(session))
  }

  async fn revoke(&self, token: &str) -> Result<()> {
    let digest = token_digest(token);
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM auth_sessions WHERE token_hash = ?1", [digest])?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── AuthBackend impl ────────────────────────────────────────────────────────

impl AuthBackend for SqliteStore {
  async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError> {
    let email = normalize_email(email);
    validate_email(&email)?;
    self.auth.policy.check(password)?;
    // Checked before the account row is written.
    self.session_expiry(Utc::now())?;

    let identity = Identity { user_id: Uuid::new_v4(), email };
    let hash = hash_password(&self.auth.hashing, password)?;
    let user_id = encode_uuid(identity.user_id);
    let address = identity.email.clone();
    let now = encode_dt(Utc::now());

    let inserted = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO auth_users (user_id, email, password_hash, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)",
          rusqlite::params![user_id, address, hash, now],
        )?;
        Ok(())
      })
      .await;
    match inserted {
      Ok(()) => {}
      Err(e) if is_unique_violation(&e) => return Err(AuthError::EmailTaken(identity.email)),
      Err(e) => return Err(Error::from(e).into()),
    }

    info!(user_id = %identity.user_id, "account created");
    Ok(self.open_session(identity).await?)
  }

  async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
    let Some((user_id, email, hash)) = self.credentials(normalize_email(email)).await? else {
      return Err(AuthError::InvalidCredentials);
    };
    if !verify_password(&hash, password)? {
      return Err(AuthError::InvalidCredentials);
    }
    Ok(self.open_session(Identity { user_id, email }).await?)
  }

  async fn resume(&self, token: &str) -> Result<Option<Session>, AuthError> {
    Ok(self.lookup_session(token).await?)
  }

  async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
    Ok(self.revoke(token).await?)
  }

  async fn update_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
    let Some(session) = self.lookup_session(token).await? else {
      return Err(AuthError::NotSignedIn);
    };
    self.auth.policy.check(new_password)?;

    let hash = hash_password(&self.auth.hashing, new_password)?;
    let user_id = encode_uuid(session.identity.user_id);
    let now = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE auth_users SET password_hash = ?1, updated_at = ?2 WHERE user_id = ?3",
          rusqlite::params![hash, now, user_id],
        )?;
        Ok(())
      })
      .await
      .map_err(Error::from)?;

    info!(user_id = %session.identity.user_id, "password updated");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tokens_are_url_safe_and_unique() {
    let a = new_token();
    let b = new_token();
    assert_ne!(a, b);
    assert_eq!(a.len(), 43);
    assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
  }

  #[test]
  fn digest_is_hex_sha256() {
    let digest = token_digest("token");
    assert_eq!(digest.len(), 64);
    assert_eq!(digest, token_digest("token"));
    assert_ne!(digest, token_digest("other"));
  }

  #[test]
  fn hashes_verify_and_reject() {
    let params = Params::new(8, 1, 1, None).unwrap();
    let hash = hash_password(&params, "hunter22").unwrap();
    assert!(hash.starts_with("$argon2id$"));
    assert!(verify_password(&hash, "hunter22").unwrap());
    assert!(!verify_password(&hash, "hunter23").unwrap());
  }

  #[test]
  fn garbage_hash_is_an_error() {
    assert!(matches!(verify_password("not a phc string", "x"), Err(Error::PasswordHash(_))));
  }
}
