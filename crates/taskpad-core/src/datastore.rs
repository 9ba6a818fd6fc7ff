use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::session::Session;

/// Local state kept between CLI runs. Tasks themselves live on the backend;
/// only the auth session is stored here.
#[derive(Debug, Clone)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub session_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let session_path = data_dir.join("session.json");

        info!(
            data_dir = %data_dir.display(),
            session = %session_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            session_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_session(&self) -> anyhow::Result<Option<Session>> {
        if !self.session_path.exists() {
            debug!("no stored session");
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.session_path)
            .with_context(|| format!("failed reading {}", self.session_path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let session: Session = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {}", self.session_path.display()))?;
        debug!(user_id = %session.user.id, "loaded stored session");
        Ok(Some(session))
    }

    #[tracing::instrument(skip(self, session), fields(user_id = %session.user.id))]
    pub fn save_session(&self, session: &Session) -> anyhow::Result<()> {
        let serialized = serde_json::to_string_pretty(session)?;
        write_atomic(&self.session_path, serialized.as_bytes())
            .context("failed to save session.json")
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_session(&self) -> anyhow::Result<()> {
        if self.session_path.exists() {
            fs::remove_file(&self.session_path)
                .with_context(|| format!("failed removing {}", self.session_path.display()))?;
            info!("cleared stored session");
        }
        Ok(())
    }

    /// Mirrors a session change onto disk.
    pub fn persist(&self, session: Option<&Session>) -> anyhow::Result<()> {
        match session {
            Some(session) => self.save_session(session),
            None => self.clear_session(),
        }
    }
}

#[tracing::instrument(skip(path, payload))]
fn write_atomic(path: &Path, payload: &[u8]) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = payload.len(), "writing atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(payload)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
