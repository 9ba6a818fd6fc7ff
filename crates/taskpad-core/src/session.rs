use std::sync::Arc;

use chrono::{
  DateTime,
  Duration,
  TimeZone,
  Utc
};
use parking_lot::Mutex;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  trace
};
use uuid::Uuid;

/// Sessions closer than this to expiry
/// are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct User {
  pub id:    Uuid,
  #[serde(default)]
  pub email: Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct Session {
  pub access_token:  String,
  pub refresh_token: String,
  #[serde(default = "default_token_type")]
  pub token_type:    String,
  /// Unix seconds.
  pub expires_at:    i64,
  pub user:          User
}

fn default_token_type() -> String {
  "bearer".to_string()
}

impl Session {
  pub fn user_id(&self) -> Uuid {
    self.user.id
  }

  pub fn expires_at_utc(
    &self
  ) -> Option<DateTime<Utc>> {
    Utc
      .timestamp_opt(self.expires_at, 0)
      .single()
  }

  pub fn needs_refresh(
    &self,
    now: DateTime<Utc>
  ) -> bool {
    match self.expires_at_utc() {
      | Some(expires) => {
        expires
          - Duration::seconds(
            REFRESH_MARGIN_SECS
          )
          <= now
      }
      | None => true
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum AuthEvent {
  InitialSession,
  SignedIn,
  SignedOut,
  TokenRefreshed
}

type Listener = Arc<
  dyn Fn(AuthEvent, Option<&Session>)
    + Send
    + Sync
>;

#[derive(Default)]
struct Inner {
  current:   Option<Session>,
  listeners: Vec<(u64, Listener)>,
  next_id:   u64
}

/// Observable holder of the current
/// auth session.
///
/// Listeners run synchronously, in
/// registration order, after the value
/// has been replaced. They may read the
/// store but must not subscribe from
/// inside a callback.
#[derive(Clone, Default)]
pub struct SessionStore {
  inner: Arc<Mutex<Inner>>
}

impl std::fmt::Debug for SessionStore {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    let inner = self.inner.lock();
    f.debug_struct("SessionStore")
      .field(
        "signed_in",
        &inner.current.is_some()
      )
      .field(
        "listeners",
        &inner.listeners.len()
      )
      .finish()
  }
}

impl SessionStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self) -> Option<Session> {
    self.inner.lock().current.clone()
  }

  pub fn is_signed_in(&self) -> bool {
    self.inner.lock().current.is_some()
  }

  #[tracing::instrument(skip(
    self, session
  ))]
  pub fn set(
    &self,
    event: AuthEvent,
    session: Option<Session>
  ) {
    let listeners = {
      let mut inner = self.inner.lock();
      inner.current = session.clone();
      inner
        .listeners
        .iter()
        .map(|(_, listener)| {
          listener.clone()
        })
        .collect::<Vec<_>>()
    };

    debug!(
      ?event,
      signed_in = session.is_some(),
      listeners = listeners.len(),
      "session changed"
    );

    for listener in listeners {
      listener(event, session.as_ref());
    }
  }

  pub fn subscribe<F>(
    &self,
    listener: F
  ) -> Subscription
  where
    F: Fn(AuthEvent, Option<&Session>)
      + Send
      + Sync
      + 'static
  {
    let mut inner = self.inner.lock();
    let id = inner.next_id;
    inner.next_id += 1;
    inner
      .listeners
      .push((id, Arc::new(listener)));
    trace!(id, "session listener registered");

    Subscription {
      store: self.clone(),
      id,
      active: true
    }
  }

  pub fn listener_count(&self) -> usize {
    self.inner.lock().listeners.len()
  }

  fn remove_listener(&self, id: u64) {
    let mut inner = self.inner.lock();
    inner
      .listeners
      .retain(|(existing, _)| {
        *existing != id
      });
    trace!(id, "session listener removed");
  }
}

/// Keeps a listener registered until it
/// is dropped or unsubscribed.
#[must_use = "dropping a Subscription \
              unregisters its listener"]
pub struct Subscription {
  store:  SessionStore,
  id:     u64,
  active: bool
}

impl Subscription {
  pub fn unsubscribe(mut self) {
    self.release();
  }

  fn release(&mut self) {
    if self.active {
      self.store.remove_listener(self.id);
      self.active = false;
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.release();
  }
}
