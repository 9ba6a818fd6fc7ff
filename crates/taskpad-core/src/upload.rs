use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Utc
};
use tracing::{
  debug,
  info,
  warn
};

use crate::backend::Backend;
use crate::session::Session;

const FALLBACK_CONTENT_TYPE: &str =
  "application/octet-stream";

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum MediaFolder {
  Images,
  Videos
}

impl MediaFolder {
  pub fn as_str(self) -> &'static str {
    match self {
      | MediaFolder::Images => "images",
      | MediaFolder::Videos => "videos"
    }
  }
}

/// A file picked from local disk,
/// loaded into memory before upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
  pub name:         String,
  pub bytes:        Vec<u8>,
  pub content_type: String
}

impl LocalFile {
  pub fn new(
    name: impl Into<String>,
    bytes: Vec<u8>
  ) -> Self {
    let name = name.into();
    let content_type =
      content_type_for(&name).to_string();
    Self {
      name,
      bytes,
      content_type
    }
  }

  #[tracing::instrument]
  pub fn read(
    path: &Path
  ) -> anyhow::Result<Self> {
    let name = path
      .file_name()
      .map(|n| {
        n.to_string_lossy().to_string()
      })
      .ok_or_else(|| {
        anyhow!(
          "not a file path: {}",
          path.display()
        )
      })?;
    let bytes = std::fs::read(path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    debug!(
      name = %name,
      bytes = bytes.len(),
      "loaded local file"
    );
    Ok(Self::new(name, bytes))
  }
}

/// A file chosen in a form: the path is
/// remembered, the bytes are read only
/// when the task is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChoice {
  Path(PathBuf),
  Loaded(LocalFile)
}

impl FileChoice {
  pub fn load(
    self
  ) -> anyhow::Result<LocalFile> {
    match self {
      | FileChoice::Path(path) => {
        LocalFile::read(&path)
      }
      | FileChoice::Loaded(file) => Ok(file)
    }
  }
}

/// `<folder>/<unix millis>-<file name>`
pub fn object_key(
  folder: MediaFolder,
  file_name: &str,
  now: DateTime<Utc>
) -> String {
  format!(
    "{}/{}-{}",
    folder.as_str(),
    now.timestamp_millis(),
    file_name
  )
}

pub fn content_type_for(
  file_name: &str
) -> &'static str {
  let ext = file_name
    .rsplit_once('.')
    .map(|(_, ext)| {
      ext.to_ascii_lowercase()
    })
    .unwrap_or_default();

  match ext.as_str() {
    | "png" => "image/png",
    | "jpg" | "jpeg" => "image/jpeg",
    | "gif" => "image/gif",
    | "webp" => "image/webp",
    | "svg" => "image/svg+xml",
    | "bmp" => "image/bmp",
    | "avif" => "image/avif",
    | "mp4" | "m4v" => "video/mp4",
    | "webm" => "video/webm",
    | "mov" => "video/quicktime",
    | "mkv" => "video/x-matroska",
    | "avi" => "video/x-msvideo",
    | "ogv" => "video/ogg",
    | _ => FALLBACK_CONTENT_TYPE
  }
}

/// Uploads the chosen file (if any) and
/// returns its public URL.
///
/// `Ok(None)` means nothing was chosen.
/// An upload failure is returned as an
/// error so the caller can surface it and
/// carry on without the URL.
#[tracing::instrument(skip(
  backend, session, choice
))]
pub async fn upload_file<B: Backend>(
  backend: &B,
  session: &Session,
  choice: Option<FileChoice>,
  folder: MediaFolder,
  now: DateTime<Utc>
) -> anyhow::Result<Option<String>> {
  let Some(choice) = choice else {
    return Ok(None);
  };

  let file = choice.load()?;
  let key =
    object_key(folder, &file.name, now);

  if let Err(err) = backend
    .upload_object(
      session,
      &key,
      file.bytes,
      &file.content_type
    )
    .await
  {
    warn!(key = %key, error = %err, "upload failed");
    return Err(err);
  }

  let url = backend.public_url(&key);
  info!(key = %key, "uploaded file");
  Ok(Some(url))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn key_is_folder_then_millis_then_name()
  {
    let now = Utc
      .timestamp_millis_opt(
        1_700_000_000_123
      )
      .single()
      .expect("valid millis");

    assert_eq!(
      object_key(
        MediaFolder::Images,
        "cat.png",
        now
      ),
      "images/1700000000123-cat.png"
    );
    assert_eq!(
      object_key(
        MediaFolder::Videos,
        "clip.final.MP4",
        now
      ),
      "videos/1700000000123-clip.final.MP4"
    );
  }

  #[test]
  fn content_type_follows_extension() {
    assert_eq!(
      content_type_for("a.JPG"),
      "image/jpeg"
    );
    assert_eq!(
      content_type_for("clip.webm"),
      "video/webm"
    );
    assert_eq!(
      content_type_for("notes"),
      FALLBACK_CONTENT_TYPE
    );
  }

  #[test]
  fn reading_missing_file_fails() {
    let temp =
      tempfile::tempdir().expect("tempdir");
    let err = FileChoice::Path(
      temp.path().join("gone.png")
    )
    .load()
    .expect_err("file is missing");
    assert!(
      err.to_string().contains("gone.png")
    );
  }

  #[test]
  fn reading_file_keeps_name_and_bytes() {
    let temp =
      tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("pic.gif");
    std::fs::write(&path, b"GIF89a")
      .expect("write file");

    let file =
      LocalFile::read(&path).expect("read");
    assert_eq!(file.name, "pic.gif");
    assert_eq!(file.bytes, b"GIF89a");
    assert_eq!(file.content_type, "image/gif");
  }
}
