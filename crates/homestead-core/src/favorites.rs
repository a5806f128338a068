//! [`FavoritesManager`]: the per-identity favorites cache.
//!
//! The cache is only ever replaced wholesale by a fetch from the remote
//! collection: after every successful write the manager reloads instead of
//! patching entries locally, so the cache cannot drift from the server.
//!
//! Two counters keep late responses from landing in the wrong place:
//!
//! - `epoch` is bumped on every identity change. Any response stamped with an
//!   older epoch is dropped.
//! - `issued`/`applied` order loads within one epoch. A load response older
//!   than the last applied one is dropped, so overlapping reloads cannot move
//!   the cache backwards.
//!
//! The state mutex is never held across an await point.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::{
  error::{FavoritesError, RemoteError},
  favorite::{FavoriteEntry, NewFavorite, PropertySummary},
  identity::{Identity, SessionEvent},
  remote::{Collection, Filter, Order, RemoteClient, from_rows, to_row},
  session::Subscription,
};

/// An immutable view of the cache, newest entry first.
pub type Snapshot = Arc<[FavoriteEntry]>;

/// Where the manager is in its per-identity lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// No identity.
  Uninitialized,
  /// The first fetch for the current identity is in flight.
  Loading,
  /// The cache reflects the last successful fetch.
  Ready,
  /// At least one add or remove is in flight.
  Mutating,
  /// The last fetch or write failed; the cache holds the last good fetch.
  Error,
}

struct State {
  identity:   Option<Identity>,
  epoch:      u64,
  issued:     u64,
  applied:    u64,
  /// Phase of the cache itself; `Mutating` is derived from `mutations`.
  phase:      Phase,
  mutations:  usize,
  entries:    Snapshot,
  last_error: Option<String>,
}

/// Captured at request time and checked when the response arrives.
#[derive(Debug, Clone, Copy)]
struct Ticket {
  epoch: u64,
  seq:   u64,
}

/// Caches the current identity's favorites and writes changes through to the
/// remote `favorites` collection.
pub struct FavoritesManager<R> {
  remote: Arc<R>,
  state:  Mutex<State>,
}

impl<R: RemoteClient> FavoritesManager<R> {
  pub fn new(remote: Arc<R>) -> Self {
    Self {
      remote,
      state: Mutex::new(State {
        identity:   None,
        epoch:      0,
        issued:     0,
        applied:    0,
        phase:      Phase::Uninitialized,
        mutations:  0,
        entries:    Arc::from(Vec::new()),
        last_error: None,
      }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub fn identity(&self) -> Option<Identity> { self.lock().identity.clone() }

  pub fn phase(&self) -> Phase {
    let state = self.lock();
    if state.mutations > 0 { Phase::Mutating } else { state.phase }
  }

  /// `true` until the first fetch for the current identity has resolved.
  pub fn is_loading(&self) -> bool { self.lock().phase == Phase::Loading }

  pub fn last_error(&self) -> Option<String> { self.lock().last_error.clone() }

  /// The cached entries, newest first. Empty until the cache has loaded and
  /// whenever no identity is present.
  pub fn list(&self) -> Snapshot { Arc::clone(&self.lock().entries) }

  /// Whether `property_id` is in the cache. Never touches the network, so a
  /// favorite whose reload is still in flight may briefly read `false`.
  pub fn is_favorite(&self, property_id: &str) -> bool {
    self
      .lock()
      .entries
      .iter()
      .any(|entry| entry.property_id == property_id)
  }

  // ── Identity changes ──────────────────────────────────────────────────────

  /// Switch to `identity`, dropping the cache immediately. Returns `false`
  /// when the identity is unchanged, in which case nothing happens.
  ///
  /// The caller is expected to follow a change to a present identity with
  /// [`load`](Self::load).
  pub fn set_identity(&self, identity: Option<Identity>) -> bool {
    let mut state = self.lock();
    let unchanged = match (&state.identity, &identity) {
      (Some(a), Some(b)) => a.user_id == b.user_id,
      (None, None) => true,
      _ => false,
    };
    if unchanged {
      return false;
    }

    state.epoch += 1;
    state.mutations = 0;
    state.entries = Arc::from(Vec::new());
    state.last_error = None;
    state.phase = if identity.is_some() { Phase::Loading } else { Phase::Uninitialized };
    debug!(
      epoch = state.epoch,
      user_id = ?identity.as_ref().map(|i| i.user_id),
      "favorites identity changed"
    );
    state.identity = identity;
    true
  }

  /// Apply a session transition and load the new identity's favorites.
  pub async fn apply(&self, event: &SessionEvent) -> Result<(), FavoritesError> {
    if self.set_identity(event.identity().cloned()) && event.identity().is_some() {
      self.load().await?;
    }
    Ok(())
  }

  /// Follow session transitions until the provider goes away.
  ///
  /// Identity changes are applied in order as they arrive; each load runs in
  /// its own task so a slow fetch for one identity never delays the switch to
  /// the next. Load failures are logged and left in [`last_error`].
  ///
  /// The load tasks belong to this future: dropping or aborting it aborts
  /// any load still in flight.
  ///
  /// [`last_error`]: Self::last_error
  pub async fn track(self: Arc<Self>, mut events: Subscription)
  where
    R: 'static,
  {
    let mut loads = JoinSet::new();
    while let Some(event) = events.next().await {
      while loads.try_join_next().is_some() {}
      let changed = self.set_identity(event.identity().cloned());
      if changed && event.identity().is_some() {
        let manager = Arc::clone(&self);
        loads.spawn(async move {
          if let Err(e) = manager.load().await {
            warn!(error = %e, "failed to load favorites after sign-in");
          }
        });
      }
    }
    debug!("session provider closed; favorites tracking stopped");
    while loads.join_next().await.is_some() {}
  }

  // ── Loading ───────────────────────────────────────────────────────────────

  /// Fetch the current identity's favorites and replace the cache.
  ///
  /// Without an identity this is a no-op. A response that arrives after the
  /// identity changed, or after a newer load was applied, is discarded and
  /// reported as success.
  pub async fn load(&self) -> Result<(), FavoritesError> {
    let (identity, ticket) = {
      let mut state = self.lock();
      let Some(identity) = state.identity.clone() else {
        return Ok(());
      };
      state.issued += 1;
      (identity, Ticket { epoch: state.epoch, seq: state.issued })
    };

    let filter = Filter::new().eq("user_id", identity.user_id.to_string());
    let order = Order::desc("created_at");
    let fetched = self
      .remote
      .select(Collection::Favorites, &filter, Some(&order))
      .await
      .and_then(|rows| from_rows::<FavoriteEntry>(Collection::Favorites, rows));

    let mut state = self.lock();
    if ticket.epoch != state.epoch {
      debug!(
        user_id = %identity.user_id,
        "discarding favorites response for a previous identity"
      );
      return Ok(());
    }
    if ticket.seq < state.applied {
      debug!(seq = ticket.seq, applied = state.applied, "discarding superseded favorites response");
      return Ok(());
    }

    match fetched {
      Ok(entries) => {
        debug!(user_id = %identity.user_id, count = entries.len(), "favorites loaded");
        state.applied = ticket.seq;
        state.entries = Arc::from(entries);
        state.phase = Phase::Ready;
        state.last_error = None;
        Ok(())
      }
      Err(e) => {
        warn!(user_id = %identity.user_id, error = %e, "failed to load favorites");
        state.phase = Phase::Error;
        state.last_error = Some(e.to_string());
        Err(e.into())
      }
    }
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Mark a write as in flight for the current identity.
  fn begin_mutation(&self) -> Option<(Identity, u64)> {
    let mut state = self.lock();
    let identity = state.identity.clone()?;
    state.mutations += 1;
    Some((identity, state.epoch))
  }

  /// Mark a write as finished. Returns `false` when the identity changed while
  /// it was in flight, in which case the result must not touch the cache.
  fn end_mutation(&self, epoch: u64, failure: Option<&RemoteError>) -> bool {
    let mut state = self.lock();
    if state.epoch != epoch {
      return false;
    }
    state.mutations = state.mutations.saturating_sub(1);
    if let Some(e) = failure {
      state.phase = Phase::Error;
      state.last_error = Some(e.to_string());
    }
    true
  }

  /// Reload after a successful write. The write is durable either way, so a
  /// failed reload is logged rather than returned.
  async fn reload_after_write(&self) {
    if let Err(e) = self.load().await {
      warn!(error = %e, "favorite saved but the cache could not be refreshed");
    }
  }

  /// Save `summary` for the current identity.
  ///
  /// Fails with [`FavoritesError::AuthRequired`] without an identity and with
  /// [`FavoritesError::DuplicateFavorite`] if the property is already saved;
  /// neither failure changes the cache.
  pub async fn add(&self, summary: &PropertySummary) -> Result<(), FavoritesError> {
    summary.validate()?;
    let (identity, epoch) = self.begin_mutation().ok_or(FavoritesError::AuthRequired)?;

    let inserted = match to_row(Collection::Favorites, &NewFavorite::new(identity.user_id, summary)) {
      Ok(row) => self.remote.insert(Collection::Favorites, row).await,
      Err(e) => Err(e),
    };

    match inserted {
      Ok(_) => {
        info!(user_id = %identity.user_id, property_id = %summary.id, "added to favorites");
        if self.end_mutation(epoch, None) {
          self.reload_after_write().await;
        }
        Ok(())
      }
      Err(e) if e.is_conflict() => {
        debug!(user_id = %identity.user_id, property_id = %summary.id, "property already in favorites");
        self.end_mutation(epoch, None);
        Err(FavoritesError::DuplicateFavorite(summary.id.clone()))
      }
      Err(e) => {
        warn!(user_id = %identity.user_id, property_id = %summary.id, error = %e, "failed to add favorite");
        self.end_mutation(epoch, Some(&e));
        Err(e.into())
      }
    }
  }

  /// Delete `property_id` from the current identity's favorites.
  ///
  /// Returns `Ok(false)` without an identity. Deleting a property that was
  /// never saved matches no rows and succeeds.
  pub async fn remove(&self, property_id: &str) -> Result<bool, FavoritesError> {
    let Some((identity, epoch)) = self.begin_mutation() else {
      return Ok(false);
    };

    let filter = Filter::new()
      .eq("user_id", identity.user_id.to_string())
      .eq("property_id", property_id);

    match self.remote.delete(Collection::Favorites, &filter).await {
      Ok(deleted) => {
        info!(user_id = %identity.user_id, property_id, deleted, "removed from favorites");
        if self.end_mutation(epoch, None) {
          self.reload_after_write().await;
        }
        Ok(true)
      }
      Err(e) => {
        warn!(user_id = %identity.user_id, property_id, error = %e, "failed to remove favorite");
        self.end_mutation(epoch, Some(&e));
        Err(e.into())
      }
    }
  }

  /// Flip the saved state of `summary`, as the heart button on a property
  /// card does. Returns whether the property is saved afterwards.
  pub async fn toggle(&self, summary: &PropertySummary) -> Result<bool, FavoritesError> {
    if self.is_favorite(&summary.id) {
      if !self.remove(&summary.id).await? {
        return Err(FavoritesError::AuthRequired);
      }
      Ok(false)
    } else {
      self.add(summary).await?;
      Ok(true)
    }
  }
}
