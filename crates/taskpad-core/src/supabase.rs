use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Utc
};
use reqwest::header::{
  AUTHORIZATION,
  CACHE_CONTROL,
  CONTENT_TYPE,
  HeaderName,
  USER_AGENT
};
use reqwest::{
  Method,
  RequestBuilder,
  Url
};
use serde::Deserialize;
use tracing::{
  debug,
  info,
  instrument,
  warn
};
use uuid::Uuid;

use crate::backend::{
  Backend,
  SignUpOutcome
};
use crate::config::BackendSettings;
use crate::session::{
  Session,
  User
};
use crate::task::{
  NewTask,
  Task,
  TaskPatch
};

const APIKEY: HeaderName =
  HeaderName::from_static("apikey");
const PREFER: HeaderName =
  HeaderName::from_static("prefer");
const X_UPSERT: HeaderName =
  HeaderName::from_static("x-upsert");
const JSON: &str = "application/json";
const UPLOAD_CACHE_SECS: &str =
  "max-age=3600";

/// HTTP client for a Supabase project:
/// GoTrue under `/auth/v1`, PostgREST
/// under `/rest/v1` and Storage under
/// `/storage/v1`.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
  http:     reqwest::Client,
  base:     Url,
  anon_key: String,
  table:    String,
  bucket:   String
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token:  String,
  refresh_token: String,
  #[serde(default)]
  token_type:    Option<String>,
  #[serde(default)]
  expires_in:    Option<i64>,
  #[serde(default)]
  expires_at:    Option<i64>,
  user:          User
}

impl TokenResponse {
  fn into_session(
    self,
    now: DateTime<Utc>
  ) -> Session {
    let expires_at =
      self.expires_at.unwrap_or_else(
        || {
          now.timestamp()
            + self
              .expires_in
              .unwrap_or(3600)
        }
      );

    Session {
      access_token: self.access_token,
      refresh_token: self.refresh_token,
      token_type: self
        .token_type
        .unwrap_or_else(|| {
          "bearer".to_string()
        }),
      expires_at,
      user: self.user
    }
  }
}

impl SupabaseClient {
  pub fn new(
    settings: &BackendSettings
  ) -> anyhow::Result<Self> {
    let base = Url::parse(&settings.url)
      .with_context(|| {
        format!(
          "invalid backend URL: {}",
          settings.url
        )
      })?;
    if base.cannot_be_a_base() {
      anyhow::bail!(
        "backend URL cannot carry a \
         path: {}",
        settings.url
      );
    }

    let http = reqwest::Client::builder()
      .build()
      .context(
        "failed building HTTP client \
         for backend"
      )?;

    info!(
      url = %base,
      table = %settings.table,
      bucket = %settings.bucket,
      "backend client ready"
    );

    Ok(Self {
      http,
      base,
      anon_key: settings.anon_key.clone(),
      table: settings.table.clone(),
      bucket: settings.bucket.clone()
    })
  }

  pub fn endpoint(
    &self,
    segments: &[&str]
  ) -> Url {
    let mut url = self.base.clone();
    if let Ok(mut path) =
      url.path_segments_mut()
    {
      path
        .pop_if_empty()
        .extend(segments);
    }
    url
  }

  pub fn table_url(&self) -> Url {
    self.endpoint(&[
      "rest",
      "v1",
      self.table.as_str()
    ])
  }

  pub fn tasks_for_user_url(
    &self,
    user_id: Uuid
  ) -> Url {
    let mut url = self.table_url();
    url
      .query_pairs_mut()
      .append_pair("select", "*")
      .append_pair(
        "user_id",
        &format!("eq.{user_id}")
      )
      .append_pair("order", "id.desc");
    url
  }

  pub fn task_by_id_url(
    &self,
    id: i64
  ) -> Url {
    let mut url = self.table_url();
    url
      .query_pairs_mut()
      .append_pair("id", &format!("eq.{id}"));
    url
  }

  fn object_url(
    &self,
    visibility: Option<&str>,
    key: &str
  ) -> Url {
    let mut segments = vec![
      "storage", "v1", "object"
    ];
    segments.extend(visibility);
    segments.push(self.bucket.as_str());
    segments.extend(
      key.split('/').filter(|s| !s.is_empty())
    );
    self.endpoint(&segments)
  }

  fn auth_url(
    &self,
    action: &str,
    grant_type: Option<&str>
  ) -> Url {
    let mut url =
      self.endpoint(&["auth", "v1", action]);
    if let Some(grant_type) = grant_type {
      url
        .query_pairs_mut()
        .append_pair(
          "grant_type",
          grant_type
        );
    }
    url
  }

  fn request(
    &self,
    method: Method,
    url: Url,
    bearer: &str
  ) -> RequestBuilder {
    self
      .http
      .request(method, url)
      .header(APIKEY, &self.anon_key)
      .header(
        AUTHORIZATION,
        format!("Bearer {bearer}")
      )
      .header(
        USER_AGENT,
        concat!(
          "taskpad/",
          env!("CARGO_PKG_VERSION")
        )
      )
  }

  fn json_request(
    &self,
    method: Method,
    url: Url,
    bearer: &str,
    payload: &impl serde::Serialize
  ) -> anyhow::Result<RequestBuilder> {
    let body = serde_json::to_vec(payload)
      .context(
        "failed encoding request body"
      )?;
    Ok(
      self
        .request(method, url, bearer)
        .header(CONTENT_TYPE, JSON)
        .body(body)
    )
  }

  async fn send(
    &self,
    request: RequestBuilder,
    action: &'static str
  ) -> anyhow::Result<String> {
    let response = request
      .send()
      .await
      .map_err(anyhow::Error::new)
      .with_context(|| {
        format!("{action} request failed")
      })?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(anyhow::Error::new)
      .with_context(|| {
        format!(
          "failed reading {action} \
           response body"
        )
      })?;

    if status.is_success() {
      debug!(
        action,
        status = %status,
        bytes = body.len(),
        "backend call succeeded"
      );
      return Ok(body);
    }

    let message =
      error_message(status.as_u16(), &body);
    warn!(
      action,
      status = %status,
      message = %message,
      "backend call failed"
    );
    Err(anyhow!(message))
  }

  async fn token_grant(
    &self,
    grant_type: &str,
    payload: serde_json::Value,
    action: &'static str
  ) -> anyhow::Result<Session> {
    let request = self.json_request(
      Method::POST,
      self.auth_url(
        "token",
        Some(grant_type)
      ),
      &self.anon_key,
      &payload
    )?;
    let body =
      self.send(request, action).await?;
    parse_session(&body, Utc::now())
  }
}

impl Backend for SupabaseClient {
  #[instrument(skip(self, password))]
  async fn sign_up(
    &self,
    email: &str,
    password: &str
  ) -> anyhow::Result<SignUpOutcome> {
    let request = self.json_request(
      Method::POST,
      self.auth_url("signup", None),
      &self.anon_key,
      &serde_json::json!({
        "email": email,
        "password": password,
      })
    )?;
    let body =
      self.send(request, "sign-up").await?;
    parse_sign_up(&body, Utc::now())
  }

  #[instrument(skip(self, password))]
  async fn sign_in_with_password(
    &self,
    email: &str,
    password: &str
  ) -> anyhow::Result<Session> {
    self
      .token_grant(
        "password",
        serde_json::json!({
          "email": email,
          "password": password,
        }),
        "sign-in"
      )
      .await
  }

  #[instrument(skip_all, fields(user_id = %session.user.id))]
  async fn sign_out(
    &self,
    session: &Session
  ) -> anyhow::Result<()> {
    let request = self.request(
      Method::POST,
      self.auth_url("logout", None),
      &session.access_token
    );
    self.send(request, "sign-out").await?;
    Ok(())
  }

  #[instrument(skip_all)]
  async fn refresh_session(
    &self,
    refresh_token: &str
  ) -> anyhow::Result<Session> {
    self
      .token_grant(
        "refresh_token",
        serde_json::json!({
          "refresh_token": refresh_token,
        }),
        "token refresh"
      )
      .await
  }

  #[instrument(skip(self, session))]
  async fn select_tasks(
    &self,
    session: &Session,
    user_id: Uuid
  ) -> anyhow::Result<Vec<Task>> {
    let request = self.request(
      Method::GET,
      self.tasks_for_user_url(user_id),
      &session.access_token
    );
    let body =
      self.send(request, "select").await?;
    serde_json::from_str(&body).context(
      "failed parsing task rows"
    )
  }

  #[instrument(skip(self, session, task), fields(title_len = task.title.len()))]
  async fn insert_task(
    &self,
    session: &Session,
    task: &NewTask
  ) -> anyhow::Result<Task> {
    let request = self
      .json_request(
        Method::POST,
        self.table_url(),
        &session.access_token,
        &[task]
      )?
      .header(
        PREFER,
        "return=representation"
      );
    let body =
      self.send(request, "insert").await?;
    let mut rows: Vec<Task> =
      serde_json::from_str(&body)
        .context(
          "failed parsing inserted row"
        )?;
    rows.pop().ok_or_else(|| {
      anyhow!("insert returned no rows")
    })
  }

  #[instrument(skip(self, session, patch))]
  async fn update_task(
    &self,
    session: &Session,
    id: i64,
    patch: &TaskPatch
  ) -> anyhow::Result<()> {
    let request = self
      .json_request(
        Method::PATCH,
        self.task_by_id_url(id),
        &session.access_token,
        patch
      )?
      .header(PREFER, "return=minimal");
    self.send(request, "update").await?;
    Ok(())
  }

  #[instrument(skip(self, session))]
  async fn delete_task(
    &self,
    session: &Session,
    id: i64
  ) -> anyhow::Result<()> {
    let request = self.request(
      Method::DELETE,
      self.task_by_id_url(id),
      &session.access_token
    );
    self.send(request, "delete").await?;
    Ok(())
  }

  #[instrument(skip(self, session, bytes), fields(bytes = bytes.len()))]
  async fn upload_object(
    &self,
    session: &Session,
    key: &str,
    bytes: Vec<u8>,
    content_type: &str
  ) -> anyhow::Result<()> {
    let request = self
      .request(
        Method::POST,
        self.object_url(None, key),
        &session.access_token
      )
      .header(CONTENT_TYPE, content_type)
      .header(
        CACHE_CONTROL,
        UPLOAD_CACHE_SECS
      )
      .header(X_UPSERT, "true")
      .body(bytes);
    self.send(request, "upload").await?;
    Ok(())
  }

  fn public_url(&self, key: &str) -> String {
    self
      .object_url(Some("public"), key)
      .to_string()
  }
}

fn parse_session(
  body: &str,
  now: DateTime<Utc>
) -> anyhow::Result<Session> {
  let token: TokenResponse =
    serde_json::from_str(body).context(
      "failed parsing auth session"
    )?;
  Ok(token.into_session(now))
}

fn parse_sign_up(
  body: &str,
  now: DateTime<Utc>
) -> anyhow::Result<SignUpOutcome> {
  let value: serde_json::Value =
    serde_json::from_str(body).context(
      "failed parsing sign-up response"
    )?;

  if value
    .get("access_token")
    .is_some_and(|token| token.is_string())
  {
    return Ok(SignUpOutcome::SignedIn(
      parse_session(body, now)?
    ));
  }

  Ok(SignUpOutcome::ConfirmationRequired)
}

/// The platform's own wording for a
/// failed call.
pub fn error_message(
  status: u16,
  body: &str
) -> String {
  if let Ok(value) =
    serde_json::from_str::<
      serde_json::Value,
    >(body)
  {
    for field in [
      "msg",
      "message",
      "error_description",
      "error"
    ] {
      if let Some(text) = value
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
      {
        return text.to_string();
      }
    }
  }

  let trimmed = body.trim();
  if trimmed.is_empty() {
    format!("HTTP {status}")
  } else {
    trimmed.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn client() -> SupabaseClient {
    SupabaseClient::new(&BackendSettings {
      url:      "https://demo.supabase.co"
        .to_string(),
      anon_key: "anon".to_string(),
      table:    "task".to_string(),
      bucket:   "task-files".to_string()
    })
    .expect("client")
  }

  #[test]
  fn table_urls_carry_filters_and_order() {
    let client = client();
    let user = Uuid::nil();

    assert_eq!(
      client
        .tasks_for_user_url(user)
        .as_str(),
      "https://demo.supabase.co/rest/v1/task?select=*&user_id=eq.00000000-0000-0000-0000-000000000000&order=id.desc"
    );
    assert_eq!(
      client.task_by_id_url(42).as_str(),
      "https://demo.supabase.co/rest/v1/task?id=eq.42"
    );
  }

  #[test]
  fn public_url_encodes_key_segments() {
    let client = client();
    assert_eq!(
      client.public_url(
        "images/1700000000000-my photo.png"
      ),
      "https://demo.supabase.co/storage/v1/object/public/task-files/images/1700000000000-my%20photo.png"
    );
  }

  #[test]
  fn base_path_is_kept() {
    let client =
      SupabaseClient::new(&BackendSettings {
        url:      "http://localhost:54321/proxy"
          .to_string(),
        anon_key: "anon".to_string(),
        table:    "task".to_string(),
        bucket:   "b".to_string()
      })
      .expect("client");

    assert_eq!(
      client
        .auth_url(
          "token",
          Some("password")
        )
        .as_str(),
      "http://localhost:54321/proxy/auth/v1/token?grant_type=password"
    );
  }

  #[test]
  fn session_expiry_falls_back_to_expires_in()
  {
    let now = Utc
      .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
      .single()
      .expect("valid time");
    let body = r#"{
      "access_token": "at",
      "refresh_token": "rt",
      "token_type": "bearer",
      "expires_in": 3600,
      "user": {"id": "0b6c4a7e-0d2f-4c55-9a51-6f5e3f7f0a11", "email": "a@b.c"}
    }"#;

    let session =
      parse_session(body, now).expect("session");
    assert_eq!(
      session.expires_at,
      now.timestamp() + 3600
    );
    assert_eq!(
      session.user.email.as_deref(),
      Some("a@b.c")
    );
  }

  #[test]
  fn sign_up_without_session_needs_confirmation()
  {
    let now = Utc::now();
    let pending = r#"{"id": "0b6c4a7e-0d2f-4c55-9a51-6f5e3f7f0a11", "email": "a@b.c", "confirmation_sent_at": "2024-01-01T00:00:00Z"}"#;
    assert_eq!(
      parse_sign_up(pending, now)
        .expect("outcome"),
      SignUpOutcome::ConfirmationRequired
    );

    let immediate = r#"{"access_token": "at", "refresh_token": "rt", "expires_at": 1900000000, "user": {"id": "0b6c4a7e-0d2f-4c55-9a51-6f5e3f7f0a11"}}"#;
    match parse_sign_up(immediate, now)
      .expect("outcome")
    {
      | SignUpOutcome::SignedIn(session) => {
        assert_eq!(
          session.expires_at,
          1_900_000_000
        );
      }
      | other => {
        panic!("unexpected outcome {other:?}")
      }
    }
  }

  #[test]
  fn error_message_prefers_platform_wording()
  {
    assert_eq!(
      error_message(
        400,
        r#"{"code":400,"msg":"Invalid login credentials"}"#
      ),
      "Invalid login credentials"
    );
    assert_eq!(
      error_message(
        403,
        r#"{"statusCode":"403","error":"Unauthorized","message":"new row violates row-level security policy"}"#
      ),
      "new row violates row-level security policy"
    );
    assert_eq!(
      error_message(
        400,
        r#"{"error":"invalid_grant","error_description":"Refresh Token Not Found"}"#
      ),
      "Refresh Token Not Found"
    );
    assert_eq!(
      error_message(502, "bad gateway"),
      "bad gateway"
    );
    assert_eq!(
      error_message(500, "  "),
      "HTTP 500"
    );
  }
}
