//! Identity and session types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated principal. Issued by the auth backend; everything else
/// only holds copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub user_id: Uuid,
  pub email:   String,
}

/// A live session: the identity plus the bearer token that proves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
  pub identity:   Identity,
  /// Opaque token handed back to the backend to resume or revoke the session.
  pub token:      String,
  pub expires_at: DateTime<Utc>,
}

impl Session {
  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { self.expires_at <= now }
}

/// A transition of the current identity, delivered to every subscriber of a
/// [`SessionProvider`](crate::session::SessionProvider).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
  SignedIn(Identity),
  Restored(Identity),
  SignedOut,
  Expired,
}

impl SessionEvent {
  /// The identity that is current after this transition.
  pub fn identity(&self) -> Option<&Identity> {
    match self {
      Self::SignedIn(identity) | Self::Restored(identity) => Some(identity),
      Self::SignedOut | Self::Expired => None,
    }
  }
}
