#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;

use anyhow::anyhow;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use taskpad_core::app::App;
use taskpad_core::backend::{Backend, SignUpOutcome};
use taskpad_core::session::{Session, SessionStore, User};
use taskpad_core::task::{NewTask, Task, TaskPatch};
use uuid::Uuid;

pub const PUBLIC_BASE: &str = "https://mem.test/storage/v1/object/public/task-files";

pub fn run_async<T>(future: impl Future<Output = T>) -> T {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
        .block_on(future)
}

#[derive(Debug, Clone)]
struct Account {
    id: Uuid,
    email: String,
    password: String,
}

#[derive(Debug, Default)]
struct State {
    accounts: Vec<Account>,
    /// Access token to owner and expiry in unix seconds.
    tokens: BTreeMap<String, (Uuid, i64)>,
    refresh_tokens: BTreeMap<String, Uuid>,
    rows: Vec<Task>,
    next_id: i64,
    objects: BTreeMap<String, (Vec<u8>, String)>,
    calls: Vec<String>,
    require_confirmation: bool,
    fail_uploads: bool,
    fail_select: bool,
    fail_insert: bool,
    fail_refresh: bool,
}

/// Backend double holding users, rows and objects in memory. Every call is
/// recorded so tests can assert on request order.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, email: &str, password: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().accounts.push(Account {
            id,
            email: email.to_string(),
            password: password.to_string(),
        });
        id
    }

    /// Issues a session directly, as if the user had signed in earlier.
    pub fn issue_session(&self, user_id: Uuid, expires_in_secs: i64) -> Session {
        let mut state = self.state.lock();
        let email = state
            .accounts
            .iter()
            .find(|a| a.id == user_id)
            .map(|a| a.email.clone());
        new_session(&mut state, user_id, email, expires_in_secs)
    }

    pub fn seed_task(&self, user_id: Uuid, title: &str) -> Task {
        let mut state = self.state.lock();
        state.next_id += 1;
        let task = Task {
            id: state.next_id,
            title: title.to_string(),
            description: String::new(),
            image_url: None,
            video_url: None,
            created_at: Utc::now(),
            user_id,
        };
        state.rows.push(task.clone());
        task
    }

    pub fn rows(&self) -> Vec<Task> {
        self.state.lock().rows.clone()
    }

    pub fn row(&self, id: i64) -> Option<Task> {
        self.state.lock().rows.iter().find(|t| t.id == id).cloned()
    }

    pub fn object_keys(&self) -> Vec<String> {
        self.state.lock().objects.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn require_confirmation(&self, on: bool) {
        self.state.lock().require_confirmation = on;
    }

    pub fn fail_uploads(&self, on: bool) {
        self.state.lock().fail_uploads = on;
    }

    pub fn fail_select(&self, on: bool) {
        self.state.lock().fail_select = on;
    }

    pub fn fail_insert(&self, on: bool) {
        self.state.lock().fail_insert = on;
    }

    pub fn fail_refresh(&self, on: bool) {
        self.state.lock().fail_refresh = on;
    }
}

fn new_session(
    state: &mut State,
    user_id: Uuid,
    email: Option<String>,
    expires_in_secs: i64,
) -> Session {
    let access_token = format!("access-{}", Uuid::new_v4());
    let refresh_token = format!("refresh-{}", Uuid::new_v4());
    let expires_at = (Utc::now() + Duration::seconds(expires_in_secs)).timestamp();
    state
        .tokens
        .insert(access_token.clone(), (user_id, expires_at));
    state.refresh_tokens.insert(refresh_token.clone(), user_id);

    Session {
        access_token,
        refresh_token,
        token_type: "bearer".to_string(),
        expires_at,
        user: User { id: user_id, email },
    }
}

fn authorize(state: &State, session: &Session) -> anyhow::Result<Uuid> {
    match state.tokens.get(&session.access_token) {
        Some(&(user_id, expires_at)) if expires_at > Utc::now().timestamp() => Ok(user_id),
        Some(_) => Err(anyhow!("JWT expired")),
        None => Err(anyhow!("invalid JWT")),
    }
}

impl Backend for MemoryBackend {
    async fn sign_up(&self, email: &str, password: &str) -> anyhow::Result<SignUpOutcome> {
        let mut state = self.state.lock();
        state.calls.push(format!("sign_up {email}"));
        if state.accounts.iter().any(|a| a.email == email) {
            return Err(anyhow!("User already registered"));
        }
        if password.len() < 6 {
            return Err(anyhow!("Password should be at least 6 characters"));
        }

        let id = Uuid::new_v4();
        state.accounts.push(Account {
            id,
            email: email.to_string(),
            password: password.to_string(),
        });

        if state.require_confirmation {
            Ok(SignUpOutcome::ConfirmationRequired)
        } else {
            let session = new_session(&mut state, id, Some(email.to_string()), 3600);
            Ok(SignUpOutcome::SignedIn(session))
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> anyhow::Result<Session> {
        let mut state = self.state.lock();
        state.calls.push(format!("sign_in {email}"));
        let account = state
            .accounts
            .iter()
            .find(|a| a.email == email && a.password == password)
            .cloned()
            .ok_or_else(|| anyhow!("Invalid login credentials"))?;
        Ok(new_session(&mut state, account.id, Some(account.email), 3600))
    }

    async fn sign_out(&self, session: &Session) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.calls.push("sign_out".to_string());
        state.tokens.remove(&session.access_token);
        state.refresh_tokens.remove(&session.refresh_token);
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> anyhow::Result<Session> {
        let mut state = self.state.lock();
        state.calls.push("refresh".to_string());
        if state.fail_refresh {
            return Err(anyhow!("Refresh Token Not Found"));
        }
        let user_id = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| anyhow!("Refresh Token Not Found"))?;
        let email = state
            .accounts
            .iter()
            .find(|a| a.id == user_id)
            .map(|a| a.email.clone());
        Ok(new_session(&mut state, user_id, email, 3600))
    }

    async fn select_tasks(&self, session: &Session, user_id: Uuid) -> anyhow::Result<Vec<Task>> {
        let mut state = self.state.lock();
        state.calls.push("select".to_string());
        authorize(&state, session)?;
        if state.fail_select {
            return Err(anyhow!("connection reset"));
        }

        let mut rows: Vec<Task> = state
            .rows
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(rows)
    }

    async fn insert_task(&self, session: &Session, task: &NewTask) -> anyhow::Result<Task> {
        let mut state = self.state.lock();
        state.calls.push(format!("insert {}", task.title));
        let caller = authorize(&state, session)?;
        if state.fail_insert || caller != task.user_id {
            return Err(anyhow!("new row violates row-level security policy"));
        }

        state.next_id += 1;
        let row = Task {
            id: state.next_id,
            title: task.title.clone(),
            description: task.description.clone(),
            image_url: task.image_url.clone(),
            video_url: task.video_url.clone(),
            created_at: Utc::now(),
            user_id: task.user_id,
        };
        state.rows.push(row.clone());
        Ok(row)
    }

    async fn update_task(&self, session: &Session, id: i64, patch: &TaskPatch) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("update {id}"));
        let caller = authorize(&state, session)?;
        if let Some(row) = state
            .rows
            .iter_mut()
            .find(|t| t.id == id && t.user_id == caller)
        {
            patch.apply_to(row);
        }
        Ok(())
    }

    async fn delete_task(&self, session: &Session, id: i64) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("delete {id}"));
        let caller = authorize(&state, session)?;
        state.rows.retain(|t| !(t.id == id && t.user_id == caller));
        Ok(())
    }

    async fn upload_object(
        &self,
        session: &Session,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("upload {key}"));
        authorize(&state, session)?;
        if state.fail_uploads {
            return Err(anyhow!("The object exceeded the maximum allowed size"));
        }
        state
            .objects
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{PUBLIC_BASE}/{key}")
    }
}

/// An app signed in as a freshly registered user.
pub fn signed_in_app(backend: MemoryBackend) -> (App<MemoryBackend>, Uuid) {
    let user = backend.register("owner@example.com", "hunter22");
    let session = backend.issue_session(user, 3600);
    let mut app = App::new(backend, SessionStore::new());
    run_async(app.restore_session(Some(session), Utc::now()));
    (app, user)
}
