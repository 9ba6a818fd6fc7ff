//! Seam between the application and the
//! hosted platform that stores users,
//! rows and files.

use uuid::Uuid;

use crate::session::Session;
use crate::task::{
  NewTask,
  Task,
  TaskPatch
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
  /// Email confirmation is disabled on
  /// the project; the user is signed in.
  SignedIn(Session),
  ConfirmationRequired
}

/// Auth, table and object storage
/// operations. Every call is one request
/// and response; errors carry the
/// platform's message verbatim.
#[allow(async_fn_in_trait)]
pub trait Backend {
  async fn sign_up(
    &self,
    email: &str,
    password: &str
  ) -> anyhow::Result<SignUpOutcome>;

  async fn sign_in_with_password(
    &self,
    email: &str,
    password: &str
  ) -> anyhow::Result<Session>;

  async fn sign_out(
    &self,
    session: &Session
  ) -> anyhow::Result<()>;

  async fn refresh_session(
    &self,
    refresh_token: &str
  ) -> anyhow::Result<Session>;

  /// Rows owned by `user_id`, highest id
  /// first.
  async fn select_tasks(
    &self,
    session: &Session,
    user_id: Uuid
  ) -> anyhow::Result<Vec<Task>>;

  async fn insert_task(
    &self,
    session: &Session,
    task: &NewTask
  ) -> anyhow::Result<Task>;

  async fn update_task(
    &self,
    session: &Session,
    id: i64,
    patch: &TaskPatch
  ) -> anyhow::Result<()>;

  async fn delete_task(
    &self,
    session: &Session,
    id: i64
  ) -> anyhow::Result<()>;

  /// Stores `bytes` under `key`,
  /// replacing any existing object.
  async fn upload_object(
    &self,
    session: &Session,
    key: &str,
    bytes: Vec<u8>,
    content_type: &str
  ) -> anyhow::Result<()>;

  fn public_url(&self, key: &str) -> String;
}
