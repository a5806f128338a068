//! [`SessionProvider`] is the single source of truth for the current identity.
//!
//! The provider is constructed explicitly at startup and handed by reference
//! to whatever needs it. Every identity transition is delivered to every
//! subscriber exactly once and in order: each subscriber owns an unbounded
//! queue, so a slow consumer never causes a transition to be dropped or merged
//! with the next one.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
  auth::{AuthBackend, TokenStorage},
  error::AuthError,
  identity::{Identity, Session, SessionEvent},
};

// ─── Subscription ────────────────────────────────────────────────────────────

/// A subscriber's view of the identity transitions, in the order they happened.
#[derive(Debug)]
pub struct Subscription {
  rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Subscription {
  /// Wait for the next transition. Returns `None` once the provider is gone.
  pub async fn next(&mut self) -> Option<SessionEvent> { self.rx.recv().await }

  /// Take the next transition if one is already queued.
  #[cfg(test)]
  pub(crate) fn try_next(&mut self) -> Option<SessionEvent> { self.rx.try_recv().ok() }
}

// ─── Provider ────────────────────────────────────────────────────────────────

struct State {
  current:     Option<Session>,
  subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

/// Holds the current session and notifies subscribers when it changes.
pub struct SessionProvider<A, T> {
  backend: A,
  storage: T,
  state:   Mutex<State>,
}

impl<A: AuthBackend, T: TokenStorage> SessionProvider<A, T> {
  pub fn new(backend: A, storage: T) -> Self {
    Self {
      backend,
      storage,
      state: Mutex::new(State { current: None, subscribers: Vec::new() }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register for every future transition.
  pub fn subscribe(&self) -> Subscription {
    let (tx, rx) = mpsc::unbounded_channel();
    self.lock().subscribers.push(tx);
    Subscription { rx }
  }

  pub fn current_identity(&self) -> Option<Identity> {
    self.lock().current.as_ref().map(|s| s.identity.clone())
  }

  pub fn current_session(&self) -> Option<Session> { self.lock().current.clone() }

  /// Replace the current session and notify subscribers. The state change and
  /// the fan-out happen under one lock so concurrent transitions reach every
  /// subscriber in the same order.
  fn transition(state: &mut State, next: Option<Session>, event: SessionEvent) {
    state.current = next;
    state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
  }

  /// Persist the token of a freshly opened session and make it current. A
  /// session it replaces is revoked; revocation failures are only logged.
  async fn open(&self, session: Session) -> Identity {
    if let Err(e) = self.storage.save(&session.token) {
      warn!(error = %e, "failed to persist session token; session will not survive a restart");
    }
    let identity = session.identity.clone();
    info!(user_id = %identity.user_id, "signed in");
    let replaced = {
      let mut state = self.lock();
      let replaced = state.current.take();
      Self::transition(
        &mut state,
        Some(session),
        SessionEvent::SignedIn(identity.clone()),
      );
      replaced
    };

    if let Some(replaced) = replaced {
      debug!(user_id = %replaced.identity.user_id, "revoking replaced session");
      if let Err(e) = self.backend.sign_out(&replaced.token).await {
        warn!(error = %e, "failed to revoke replaced session token");
      }
    }
    identity
  }

  /// Check credentials and make the resulting identity current.
  ///
  /// On failure the current session is left untouched.
  pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
    let session = self.backend.sign_in(email, password).await?;
    Ok(self.open(session).await)
  }

  /// Create an account and sign in as it.
  pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
    let session = self.backend.sign_up(email, password).await?;
    Ok(self.open(session).await)
  }

  /// Drop the current session. Always succeeds locally: the identity is
  /// cleared before the backend is asked to revoke the token, and revocation
  /// failures are only logged.
  pub async fn sign_out(&self) {
    let previous = {
      let mut state = self.lock();
      let previous = state.current.take();
      if previous.is_some() {
        Self::transition(&mut state, None, SessionEvent::SignedOut);
      }
      previous
    };

    if let Err(e) = self.storage.clear() {
      warn!(error = %e, "failed to clear stored session token");
    }

    let Some(previous) = previous else {
      debug!("sign-out requested with no active session");
      return;
    };
    info!(user_id = %previous.identity.user_id, "signed out");

    if let Err(e) = self.backend.sign_out(&previous.token).await {
      warn!(error = %e, "failed to revoke session token");
    }
  }

  /// Resume the session whose token was persisted by a previous run.
  ///
  /// A token the backend no longer recognises is deleted and reported as
  /// `Ok(None)`; it does not count as a transition.
  pub async fn restore(&self) -> Result<Option<Identity>, AuthError> {
    let Some(token) = self.storage.load()? else {
      return Ok(None);
    };

    match self.backend.resume(&token).await? {
      Some(session) => {
        let mut state = self.lock();
        if let Some(current) = &state.current {
          // A sign-in completed while the restore was in flight; it wins.
          return Ok(Some(current.identity.clone()));
        }
        let identity = session.identity.clone();
        info!(user_id = %identity.user_id, "session restored");
        Self::transition(
          &mut state,
          Some(session),
          SessionEvent::Restored(identity.clone()),
        );
        Ok(Some(identity))
      }
      None => {
        info!("stored session is no longer valid");
        self.storage.clear()?;
        Ok(None)
      }
    }
  }

  /// Re-check the current token with the backend, expiring the session if the
  /// backend no longer accepts it.
  pub async fn validate(&self) -> Result<Option<Identity>, AuthError> {
    let Some(session) = self.current_session() else {
      return Ok(None);
    };

    if let Some(live) = self.backend.resume(&session.token).await? {
      return Ok(Some(live.identity));
    }

    {
      let mut state = self.lock();
      let unchanged = state
        .current
        .as_ref()
        .is_some_and(|current| current.token == session.token);
      if unchanged {
        info!(user_id = %session.identity.user_id, "session expired");
        Self::transition(&mut state, None, SessionEvent::Expired);
      }
    }
    if let Err(e) = self.storage.clear() {
      warn!(error = %e, "failed to clear stored session token");
    }
    Ok(None)
  }

  /// Change the password of the signed-in account.
  pub async fn update_password(&self, new_password: &str) -> Result<(), AuthError> {
    let session = self.current_session().ok_or(AuthError::NotSignedIn)?;
    self.backend.update_password(&session.token, new_password).await?;
    info!(user_id = %session.identity.user_id, "password updated");
    Ok(())
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use std::collections::HashMap;

  use chrono::{Duration, Utc};
  use uuid::Uuid;

  use super::*;
  use crate::auth::{MemoryTokenStorage, PasswordPolicy};

  /// Credential store keeping plaintext passwords; enough to drive the
  /// provider's state machine.
  #[derive(Default)]
  pub(crate) struct StubAuth {
    accounts: Mutex<HashMap<String, (Uuid, String)>>,
    sessions: Mutex<HashMap<String, Session>>,
  }

  impl StubAuth {
    fn issue(&self, identity: Identity) -> Session {
      let session = Session {
        identity,
        token: Uuid::new_v4().to_string(),
        expires_at: Utc::now() + Duration::hours(1),
      };
      self
        .sessions
        .lock()
        .unwrap()
        .insert(session.token.clone(), session.clone());
      session
    }

    /// Forget every issued token, as if they had all expired.
    pub(crate) fn expire_all(&self) { self.sessions.lock().unwrap().clear(); }
  }

  impl AuthBackend for StubAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError> {
      PasswordPolicy::default().check(password)?;
      let user_id = {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
          return Err(AuthError::EmailTaken(email.to_owned()));
        }
        let user_id = Uuid::new_v4();
        accounts.insert(email.to_owned(), (user_id, password.to_owned()));
        user_id
      };
      Ok(self.issue(Identity { user_id, email: email.to_owned() }))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
      let user_id = match self.accounts.lock().unwrap().get(email) {
        Some((user_id, stored)) if stored == password => *user_id,
        _ => return Err(AuthError::InvalidCredentials),
      };
      Ok(self.issue(Identity { user_id, email: email.to_owned() }))
    }

    async fn resume(&self, token: &str) -> Result<Option<Session>, AuthError> {
      Ok(self.sessions.lock().unwrap().get(token).cloned())
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
      self.sessions.lock().unwrap().remove(token);
      Ok(())
    }

    async fn update_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
      PasswordPolicy::default().check(new_password)?;
      let email = match self.sessions.lock().unwrap().get(token) {
        Some(session) => session.identity.email.clone(),
        None => return Err(AuthError::NotSignedIn),
      };
      if let Some(account) = self.accounts.lock().unwrap().get_mut(&email) {
        account.1 = new_password.to_owned();
      }
      Ok(())
    }
  }

  fn provider() -> SessionProvider<StubAuth, MemoryTokenStorage> {
    SessionProvider::new(StubAuth::default(), MemoryTokenStorage::default())
  }

  #[tokio::test]
  async fn sign_up_makes_identity_current_and_notifies() {
    let p = provider();
    let mut sub = p.subscribe();

    let identity = p.sign_up("u1@example.com", "secret1").await.unwrap();
    assert_eq!(p.current_identity(), Some(identity.clone()));
    assert_eq!(sub.try_next(), Some(SessionEvent::SignedIn(identity)));
    assert!(p.storage.load().unwrap().is_some());
  }

  #[tokio::test]
  async fn failed_sign_in_leaves_state_unchanged() {
    let p = provider();
    p.sign_up("u1@example.com", "secret1").await.unwrap();
    let before = p.current_identity();
    let mut sub = p.subscribe();

    let err = p.sign_in("u1@example.com", "wrong-password").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    assert_eq!(p.current_identity(), before);
    assert_eq!(sub.try_next(), None);
  }

  #[tokio::test]
  async fn duplicate_sign_up_is_rejected() {
    let p = provider();
    p.sign_up("u1@example.com", "secret1").await.unwrap();
    let err = p.sign_up("u1@example.com", "secret2").await.unwrap_err();
    assert!(matches!(err, AuthError::EmailTaken(_)));
  }

  #[tokio::test]
  async fn every_transition_is_delivered_in_order() {
    let p = provider();
    let mut sub = p.subscribe();

    let a = p.sign_up("a@example.com", "secret1").await.unwrap();
    let b = p.sign_up("b@example.com", "secret2").await.unwrap();
    p.sign_out().await;
    let a_again = p.sign_in("a@example.com", "secret1").await.unwrap();

    assert_eq!(sub.next().await, Some(SessionEvent::SignedIn(a)));
    assert_eq!(sub.next().await, Some(SessionEvent::SignedIn(b)));
    assert_eq!(sub.next().await, Some(SessionEvent::SignedOut));
    assert_eq!(sub.next().await, Some(SessionEvent::SignedIn(a_again)));
    assert_eq!(sub.try_next(), None);
  }

  #[tokio::test]
  async fn sign_out_clears_identity_and_token() {
    let p = provider();
    p.sign_up("u1@example.com", "secret1").await.unwrap();
    let token = p.current_session().unwrap().token;

    p.sign_out().await;
    assert_eq!(p.current_identity(), None);
    assert_eq!(p.storage.load().unwrap(), None);
    assert_eq!(p.backend.resume(&token).await.unwrap(), None);
  }

  #[tokio::test]
  async fn signing_in_again_revokes_the_replaced_token() {
    let p = provider();
    p.sign_up("u1@example.com", "secret1").await.unwrap();
    let first = p.current_session().unwrap().token;

    p.sign_in("u1@example.com", "secret1").await.unwrap();
    let second = p.current_session().unwrap().token;
    assert_ne!(first, second);
    assert_eq!(p.backend.resume(&first).await.unwrap(), None);
    assert!(p.backend.resume(&second).await.unwrap().is_some());
    assert_eq!(p.storage.load().unwrap(), Some(second.clone()));

    p.sign_out().await;
    assert_eq!(p.backend.resume(&second).await.unwrap(), None);
  }

  #[tokio::test]
  async fn sign_out_without_session_emits_nothing() {
    let p = provider();
    let mut sub = p.subscribe();
    p.sign_out().await;
    assert_eq!(sub.try_next(), None);
  }

  #[tokio::test]
  async fn restore_resumes_persisted_session() {
    let p = provider();
    let identity = p.sign_up("u1@example.com", "secret1").await.unwrap();
    let token = p.current_session().unwrap().token;

    // A second provider over the same backend, as after a restart.
    let restarted = SessionProvider::new(p.backend, MemoryTokenStorage::default());
    restarted.storage.save(&token).unwrap();
    let mut sub = restarted.subscribe();

    assert_eq!(restarted.restore().await.unwrap(), Some(identity.clone()));
    assert_eq!(sub.try_next(), Some(SessionEvent::Restored(identity)));
  }

  #[tokio::test]
  async fn restore_discards_dead_token_silently() {
    let p = provider();
    p.storage.save("not-a-real-token").unwrap();
    let mut sub = p.subscribe();

    assert_eq!(p.restore().await.unwrap(), None);
    assert_eq!(p.storage.load().unwrap(), None);
    assert_eq!(sub.try_next(), None);
  }

  #[tokio::test]
  async fn restore_with_nothing_stored_is_a_no_op() {
    let p = provider();
    assert_eq!(p.restore().await.unwrap(), None);
  }

  #[tokio::test]
  async fn validate_expires_rejected_session() {
    let p = provider();
    let identity = p.sign_up("u1@example.com", "secret1").await.unwrap();
    let mut sub = p.subscribe();

    assert_eq!(p.validate().await.unwrap(), Some(identity));
    p.backend.expire_all();
    assert_eq!(p.validate().await.unwrap(), None);

    assert_eq!(p.current_identity(), None);
    assert_eq!(sub.try_next(), Some(SessionEvent::Expired));
    assert_eq!(p.storage.load().unwrap(), None);
  }

  #[tokio::test]
  async fn update_password_requires_a_session() {
    let p = provider();
    let err = p.update_password("new-secret").await.unwrap_err();
    assert!(matches!(err, AuthError::NotSignedIn));

    p.sign_up("u1@example.com", "secret1").await.unwrap();
    p.update_password("new-secret").await.unwrap();
    p.sign_out().await;
    assert!(p.sign_in("u1@example.com", "secret1").await.is_err());
    assert!(p.sign_in("u1@example.com", "new-secret").await.is_ok());
  }

  #[tokio::test]
  async fn dropped_subscribers_are_pruned() {
    let p = provider();
    drop(p.subscribe());
    let mut live = p.subscribe();
    p.sign_up("u1@example.com", "secret1").await.unwrap();
    assert_eq!(p.lock().subscribers.len(), 1);
    assert!(live.try_next().is_some());
  }
}
