//! Permission levels and rows of the `user_roles` collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

/// A permission level. The string forms are the values of the server-side
/// `app_role` enumeration.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AppRole {
  Admin,
  Moderator,
  User,
}

impl AppRole {
  /// Higher wins when an identity holds several roles.
  pub fn precedence(self) -> u8 {
    match self {
      Self::Admin => 2,
      Self::Moderator => 1,
      Self::User => 0,
    }
  }
}

/// A persisted row of the `user_roles` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
  pub id:         Uuid,
  pub user_id:    Uuid,
  pub role:       AppRole,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
}

/// Insert shape for the `user_roles` collection.
#[derive(Debug, Clone, Serialize)]
pub struct NewRole {
  pub user_id: Uuid,
  pub role:    AppRole,
}

/// Outcome of an administrator check that keeps "could not tell" apart from
/// "no".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminStatus {
  Granted,
  Denied,
  /// The roles lookup failed. Treated as not granted.
  Unknown,
}

impl AdminStatus {
  pub fn is_granted(self) -> bool { self == Self::Granted }
}
