use std::sync::Arc;
use std::sync::atomic::{
  AtomicBool,
  Ordering
};

use chrono::{
  DateTime,
  Utc
};
use tracing::{
  debug,
  error,
  info,
  instrument,
  warn
};

use crate::backend::{
  Backend,
  SignUpOutcome
};
use crate::datastore::DataStore;
use crate::form::{
  AuthForm,
  AuthMode,
  EditForm,
  EditOutcome,
  TaskForm
};
use crate::session::{
  AuthEvent,
  Session,
  SessionStore,
  Subscription
};
use crate::task::{
  NewTask,
  Task
};
use crate::upload::{
  FileChoice,
  MediaFolder,
  upload_file
};

pub const SIGN_UP_NOTICE: &str =
  "Sign-up successful! Check your email \
   to confirm.";

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum NoticeKind {
  Info,
  Error
}

/// A message for the user, shown once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub kind:    NoticeKind,
  pub message: String
}

impl Notice {
  pub fn info(
    message: impl Into<String>
  ) -> Self {
    Self {
      kind:    NoticeKind::Info,
      message: message.into()
    }
  }

  pub fn error(
    message: impl Into<String>
  ) -> Self {
    Self {
      kind:    NoticeKind::Error,
      message: message.into()
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Screen {
  Auth,
  Tasks
}

/// Holds the signed-in user's tasks and
/// the form state, and runs every user
/// action against the backend one
/// request at a time.
pub struct App<B> {
  backend:       B,
  session:       SessionStore,
  tasks:         Vec<Task>,
  pub auth:      AuthForm,
  pub form:      TaskForm,
  notices:       Vec<Notice>,
  stale:         Arc<AtomicBool>,
  // Held so the listeners stay registered.
  _subscriptions: Vec<Subscription>
}

impl<B: Backend> App<B> {
  pub fn new(
    backend: B,
    session: SessionStore
  ) -> Self {
    let stale =
      Arc::new(AtomicBool::new(false));

    let flag = stale.clone();
    let watcher = session.subscribe(
      move |event, _| {
        debug!(?event, "task list marked stale");
        flag.store(true, Ordering::SeqCst);
      }
    );

    Self {
      backend,
      session,
      tasks: Vec::new(),
      auth: AuthForm::default(),
      form: TaskForm::default(),
      notices: Vec::new(),
      stale,
      _subscriptions: vec![watcher]
    }
  }

  /// Mirrors every session change into
  /// the local datastore.
  pub fn persist_sessions(
    &mut self,
    store: DataStore
  ) {
    let subscription =
      self.session.subscribe(
        move |event, session| {
          if let Err(err) =
            store.persist(session)
          {
            error!(?event, error = %err, "failed to persist session");
          }
        }
      );
    self._subscriptions.push(subscription);
  }

  pub fn backend(&self) -> &B {
    &self.backend
  }

  pub fn session(&self) -> &SessionStore {
    &self.session
  }

  pub fn screen(&self) -> Screen {
    if self.session.is_signed_in() {
      Screen::Tasks
    } else {
      Screen::Auth
    }
  }

  pub fn tasks(&self) -> &[Task] {
    &self.tasks
  }

  pub fn find_task(
    &self,
    id: i64
  ) -> Option<&Task> {
    self.tasks.iter().find(|t| t.id == id)
  }

  pub fn notices(&self) -> &[Notice] {
    &self.notices
  }

  pub fn take_notices(
    &mut self
  ) -> Vec<Notice> {
    std::mem::take(&mut self.notices)
  }

  fn notify(&mut self, notice: Notice) {
    debug!(kind = ?notice.kind, message = %notice.message, "notice raised");
    self.notices.push(notice);
  }

  /// Reacts to session changes seen since
  /// the last call: loads the list when a
  /// user is present, empties it otherwise.
  pub async fn sync(&mut self) {
    if !self.stale.swap(false, Ordering::SeqCst)
    {
      return;
    }

    if self.session.is_signed_in() {
      self.fetch_tasks().await;
    } else {
      self.tasks.clear();
    }
  }

  /// Installs the session found at start
  /// up, refreshing it first when it is
  /// about to expire.
  #[instrument(skip(self, stored), fields(stored = stored.is_some()))]
  pub async fn restore_session(
    &mut self,
    stored: Option<Session>,
    now: DateTime<Utc>
  ) {
    match stored {
      | Some(session)
        if session.needs_refresh(now) =>
      {
        match self
          .backend
          .refresh_session(
            &session.refresh_token
          )
          .await
        {
          | Ok(fresh) => {
            info!(user_id = %fresh.user.id, "session refreshed");
            self.session.set(
              AuthEvent::TokenRefreshed,
              Some(fresh)
            );
          }
          | Err(err) => {
            warn!(error = %err, "session refresh failed; signing out");
            self.session.set(
              AuthEvent::SignedOut,
              None
            );
          }
        }
      }
      | other => {
        self.session.set(
          AuthEvent::InitialSession,
          other
        );
      }
    }

    self.sync().await;
  }

  /// Signs up or signs in with the auth
  /// form, depending on its mode.
  #[instrument(skip(self), fields(mode = ?self.auth.mode))]
  pub async fn submit_auth(&mut self) {
    let email = self.auth.email.clone();
    let password =
      self.auth.password.clone();

    match self.auth.mode {
      | AuthMode::SignUp => {
        match self
          .backend
          .sign_up(&email, &password)
          .await
        {
          | Ok(outcome) => {
            self.notify(Notice::info(
              SIGN_UP_NOTICE
            ));
            if let SignUpOutcome::SignedIn(
              session
            ) = outcome
            {
              self.session.set(
                AuthEvent::SignedIn,
                Some(session)
              );
            }
          }
          | Err(err) => {
            self.notify(Notice::error(
              format!("{err:#}")
            ));
          }
        }
      }
      | AuthMode::SignIn => {
        match self
          .backend
          .sign_in_with_password(
            &email, &password
          )
          .await
        {
          | Ok(session) => {
            info!(user_id = %session.user.id, "signed in");
            self.session.set(
              AuthEvent::SignedIn,
              Some(session)
            );
          }
          | Err(err) => {
            self.notify(Notice::error(
              format!("{err:#}")
            ));
          }
        }
      }
    }

    self.sync().await;
  }

  #[instrument(skip(self))]
  pub async fn logout(&mut self) {
    if let Some(session) = self.session.get()
      && let Err(err) =
        self.backend.sign_out(&session).await
    {
      warn!(error = %err, "remote sign-out failed");
    }

    self.session.set(
      AuthEvent::SignedOut,
      None
    );
    self.tasks.clear();
    self.sync().await;
  }

  /// The session to send with the next
  /// request. One close to expiry is
  /// refreshed first; a failed refresh
  /// signs out.
  async fn current_session(
    &mut self,
    now: DateTime<Utc>
  ) -> Option<Session> {
    let session = self.session.get()?;
    if !session.needs_refresh(now) {
      return Some(session);
    }

    match self
      .backend
      .refresh_session(&session.refresh_token)
      .await
    {
      | Ok(fresh) => {
        info!(user_id = %fresh.user.id, "session refreshed");
        self.session.set(
          AuthEvent::TokenRefreshed,
          Some(fresh.clone())
        );
        Some(fresh)
      }
      | Err(err) => {
        warn!(error = %err, "session refresh failed; signing out");
        self.session.set(
          AuthEvent::SignedOut,
          None
        );
        self.tasks.clear();
        None
      }
    }
  }

  /// Reloads the current user's rows.
  /// Failures are logged and the previous
  /// list is kept.
  #[instrument(skip(self))]
  pub async fn fetch_tasks(&mut self) {
    let Some(session) =
      self.current_session(Utc::now()).await
    else {
      debug!("no session; skipping fetch");
      return;
    };

    match self
      .backend
      .select_tasks(
        &session,
        session.user_id()
      )
      .await
    {
      | Ok(rows) => {
        debug!(count = rows.len(), "tasks fetched");
        self.tasks = rows;
      }
      | Err(err) => {
        error!(error = %err, "failed to fetch tasks");
      }
    }
  }

  async fn upload_media(
    &mut self,
    session: &Session,
    choice: Option<FileChoice>,
    folder: MediaFolder,
    now: DateTime<Utc>
  ) -> Option<String> {
    match upload_file(
      &self.backend,
      session,
      choice,
      folder,
      now
    )
    .await
    {
      | Ok(url) => url,
      | Err(err) => {
        self.notify(Notice::error(format!(
          "Upload error: {err:#}"
        )));
        None
      }
    }
  }

  /// Creates a task from the form.
  /// Returns the id of the inserted row.
  #[instrument(skip(self, now))]
  pub async fn add_task(
    &mut self,
    now: DateTime<Utc>
  ) -> Option<i64> {
    let Some(draft) = self.form.submit()
    else {
      debug!("blank title; nothing to add");
      return None;
    };

    let Some(session) =
      self.current_session(now).await
    else {
      self.notify(Notice::error(
        "Not signed in"
      ));
      return None;
    };

    let image_url = self
      .upload_media(
        &session,
        draft.image,
        MediaFolder::Images,
        now
      )
      .await;
    let video_url = self
      .upload_media(
        &session,
        draft.video,
        MediaFolder::Videos,
        now
      )
      .await;

    let row = NewTask {
      title: draft.title,
      description: draft.description,
      image_url,
      video_url,
      user_id: session.user_id()
    };

    match self
      .backend
      .insert_task(&session, &row)
      .await
    {
      | Ok(created) => {
        info!(id = created.id, "task added");
        self.form.reset();
        self.fetch_tasks().await;
        Some(created.id)
      }
      | Err(err) => {
        self.notify(Notice::error(format!(
          "Error adding task: {err:#}"
        )));
        None
      }
    }
  }

  /// Opens the inline editor for a row in
  /// the current list.
  pub fn begin_edit(
    &self,
    id: i64
  ) -> Option<EditForm> {
    self.find_task(id).map(EditForm::for_task)
  }

  /// Validates and saves an edit form.
  pub async fn submit_edit(
    &mut self,
    form: EditForm
  ) -> bool {
    match form.confirm() {
      | Ok(outcome) => {
        self.edit_task(outcome).await
      }
      | Err(err) => {
        self.notify(Notice::error(
          format!("{err:#}")
        ));
        false
      }
    }
  }

  /// Applies a confirmed edit. Both fields
  /// are written together or not at all.
  #[instrument(skip(self))]
  pub async fn edit_task(
    &mut self,
    outcome: EditOutcome
  ) -> bool {
    let EditOutcome::Save(id, patch) =
      outcome
    else {
      debug!("edit cancelled");
      return false;
    };

    let Some(session) =
      self.current_session(Utc::now()).await
    else {
      self.notify(Notice::error(
        "Not signed in"
      ));
      return false;
    };

    match self
      .backend
      .update_task(&session, id, &patch)
      .await
    {
      | Ok(()) => {
        info!(id, "task updated");
        self.fetch_tasks().await;
        true
      }
      | Err(err) => {
        self.notify(Notice::error(
          format!("{err:#}")
        ));
        false
      }
    }
  }

  #[instrument(skip(self))]
  pub async fn delete_task(
    &mut self,
    id: i64
  ) -> bool {
    let Some(session) =
      self.current_session(Utc::now()).await
    else {
      self.notify(Notice::error(
        "Not signed in"
      ));
      return false;
    };

    match self
      .backend
      .delete_task(&session, id)
      .await
    {
      | Ok(()) => {
        info!(id, "task deleted");
        self.fetch_tasks().await;
        true
      }
      | Err(err) => {
        self.notify(Notice::error(
          format!("{err:#}")
        ));
        false
      }
    }
  }
}
