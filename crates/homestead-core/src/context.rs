//! [`AppContext`] is the explicitly constructed bundle of session, favorites
//! and roles that an application builds once at startup.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::{
  auth::{AuthBackend, TokenStorage},
  error::{AuthError, FavoritesError},
  favorites::FavoritesManager,
  identity::Identity,
  remote::RemoteClient,
  role::AdminStatus,
  roles::RoleCheck,
  session::SessionProvider,
};

pub struct AppContext<A, T, R> {
  session:   SessionProvider<A, T>,
  favorites: Arc<FavoritesManager<R>>,
  roles:     RoleCheck<R>,
  tracker:   Option<JoinHandle<()>>,
}

impl<A, T, R> AppContext<A, T, R>
where
  A: AuthBackend,
  T: TokenStorage,
  R: RemoteClient + 'static,
{
  pub fn new(auth: A, storage: T, remote: Arc<R>) -> Self {
    Self {
      session:   SessionProvider::new(auth, storage),
      favorites: Arc::new(FavoritesManager::new(Arc::clone(&remote))),
      roles:     RoleCheck::new(remote),
      tracker:   None,
    }
  }

  pub fn session(&self) -> &SessionProvider<A, T> { &self.session }

  pub fn favorites(&self) -> &FavoritesManager<R> { &self.favorites }

  pub fn roles(&self) -> &RoleCheck<R> { &self.roles }

  /// Connect the favorites cache to session changes, then try to resume the
  /// persisted session. Calling it twice has no further effect.
  pub async fn start(&mut self) -> Result<Option<Identity>, AuthError> {
    if self.tracker.is_none() {
      let events = self.session.subscribe();
      self.tracker = Some(tokio::spawn(Arc::clone(&self.favorites).track(events)));
    }
    self.session.restore().await
  }

  /// Point the favorites cache at the current identity and fetch it now,
  /// rather than waiting for the tracking task to catch up.
  pub async fn refresh_favorites(&self) -> Result<(), FavoritesError> {
    self.favorites.set_identity(self.session.current_identity());
    self.favorites.load().await
  }

  /// Fail-closed administrator check for the current identity.
  pub async fn is_admin(&self) -> bool {
    self.roles.is_admin(self.session.current_identity().as_ref()).await
  }

  pub async fn admin_status(&self) -> AdminStatus {
    self
      .roles
      .admin_status(self.session.current_identity().as_ref())
      .await
  }

  /// Stop following session changes. In-flight remote calls are abandoned.
  pub async fn shutdown(mut self) {
    if let Some(tracker) = self.tracker.take() {
      tracker.abort();
      // A cancelled task reports a JoinError; that is the expected outcome.
      let _ = tracker.await;
    }
    debug!("application context shut down");
  }
}
