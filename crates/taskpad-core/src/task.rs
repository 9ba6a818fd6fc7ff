use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// One row of the `task` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: i64,

    pub title: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,

    #[serde(default)]
    pub image_url: Option<String>,

    #[serde(default)]
    pub video_url: Option<String>,

    pub created_at: DateTime<Utc>,

    pub user_id: Uuid,
}

impl Task {
    pub fn has_media(&self) -> bool {
        self.image_url.is_some() || self.video_url.is_some()
    }

    pub fn media_label(&self) -> String {
        match (self.image_url.is_some(), self.video_url.is_some()) {
            (true, true) => "image+video".to_string(),
            (true, false) => "image".to_string(),
            (false, true) => "video".to_string(),
            (false, false) => String::new(),
        }
    }
}

/// Insert payload. `id` and `created_at` are assigned by the server.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub user_id: Uuid,
}

/// Update payload. Media URLs are set at creation only and never patched.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: String,
    pub description: String,
}

impl TaskPatch {
    pub fn apply_to(&self, task: &mut Task) {
        task.title = self.title.clone();
        task.description = self.description.clone();
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
