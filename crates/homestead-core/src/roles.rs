//! [`RoleCheck`]: role lookups against the `user_roles` collection.
//!
//! An identity may hold several role rows, at most one per role. Where a
//! single role is needed the highest [`AppRole::precedence`] wins.
//!
//! Administrator checks fail closed: when the lookup itself fails the answer
//! is "not an administrator". [`RoleCheck::admin_status`] keeps that case
//! visible as [`AdminStatus::Unknown`] for callers that report it.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  error::RemoteError,
  identity::Identity,
  remote::{Collection, Filter, RemoteClient, from_rows, to_row},
  role::{AdminStatus, AppRole, NewRole, RoleRecord},
};

pub struct RoleCheck<R> {
  remote: Arc<R>,
}

impl<R: RemoteClient> RoleCheck<R> {
  pub fn new(remote: Arc<R>) -> Self { Self { remote } }

  fn filter(user_id: Uuid) -> Filter { Filter::new().eq("user_id", user_id.to_string()) }

  /// Whether `identity` holds the administrator role. One round trip; no
  /// identity means no call. Lookup failures are logged and answer `Unknown`.
  pub async fn admin_status(&self, identity: Option<&Identity>) -> AdminStatus {
    let Some(identity) = identity else {
      return AdminStatus::Denied;
    };
    match self.has_role(identity, AppRole::Admin).await {
      Ok(true) => AdminStatus::Granted,
      Ok(false) => AdminStatus::Denied,
      Err(e) => {
        warn!(user_id = %identity.user_id, error = %e, "role lookup failed; treating as not admin");
        AdminStatus::Unknown
      }
    }
  }

  /// [`admin_status`](Self::admin_status) collapsed to a boolean; never errors.
  pub async fn is_admin(&self, identity: Option<&Identity>) -> bool {
    self.admin_status(identity).await.is_granted()
  }

  pub async fn has_role(&self, identity: &Identity, role: AppRole) -> Result<bool, RemoteError> {
    let filter = Self::filter(identity.user_id).eq("role", role.to_string());
    let rows = self
      .remote
      .select(Collection::UserRoles, &filter, None)
      .await?;
    Ok(!rows.is_empty())
  }

  /// Every role row held by `identity`.
  pub async fn roles(&self, identity: &Identity) -> Result<Vec<RoleRecord>, RemoteError> {
    let rows = self
      .remote
      .select(Collection::UserRoles, &Self::filter(identity.user_id), None)
      .await?;
    from_rows(Collection::UserRoles, rows)
  }

  /// The highest-precedence role held by `identity`, if any.
  pub async fn effective_role(&self, identity: &Identity) -> Result<Option<AppRole>, RemoteError> {
    Ok(
      self
        .roles(identity)
        .await?
        .into_iter()
        .map(|record| record.role)
        .max_by_key(|role| role.precedence()),
    )
  }

  /// Give `user_id` the `role`. Returns `false` if it already held it.
  pub async fn grant(&self, user_id: Uuid, role: AppRole) -> Result<bool, RemoteError> {
    let row = to_row(Collection::UserRoles, &NewRole { user_id, role })?;
    match self.remote.insert(Collection::UserRoles, row).await {
      Ok(_) => {
        info!(%user_id, %role, "role granted");
        Ok(true)
      }
      Err(e) if e.is_conflict() => {
        debug!(%user_id, %role, "role already held");
        Ok(false)
      }
      Err(e) => Err(e),
    }
  }

  /// Take `role` away from `user_id`. Returns `false` if it was not held.
  pub async fn revoke(&self, user_id: Uuid, role: AppRole) -> Result<bool, RemoteError> {
    let filter = Self::filter(user_id).eq("role", role.to_string());
    let deleted = self.remote.delete(Collection::UserRoles, &filter).await?;
    if deleted > 0 {
      info!(%user_id, %role, "role revoked");
    }
    Ok(deleted > 0)
  }
}
