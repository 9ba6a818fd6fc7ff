use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

pub const DEFAULT_TABLE: &str = "task";
pub const DEFAULT_BUCKET: &str =
  "task-files";

/// Environment variables folded into
/// the config after the file.
const ENV_KEYS: [(&str, &str); 3] = [
  ("SUPABASE_URL", "supabase.url"),
  (
    "SUPABASE_ANON_KEY",
    "supabase.anon_key"
  ),
  ("TASKPAD_DATA", "data.location")
];

#[derive(Debug, Clone)]
pub struct Config {
  map:              BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

/// Everything needed to reach the
/// hosted backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
  pub url:      String,
  pub anon_key: String,
  pub table:    String,
  pub bucket:   String
}

impl Config {
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    Self::load_with_env(
      config_override,
      |key| std::env::var(key).ok()
    )
  }

  pub fn load_with_env<F>(
    config_override: Option<&Path>,
    env: F
  ) -> anyhow::Result<Self>
  where
    F: Fn(&str) -> Option<String>
  {
    let mut cfg = Config::defaults();

    let path = resolve_config_path(
      config_override,
      &env
    );
    match path {
      | Some(path) if path.is_file() => {
        info!(config = %path.display(), "loading config");
        cfg.load_file(&path)?;
      }
      | Some(path)
        if config_override.is_some() =>
      {
        return Err(anyhow!(
          "config file not found: {}",
          path.display()
        ));
      }
      | _ => {
        warn!(
          "no config file found; using \
           defaults and environment"
        );
      }
    }

    cfg.apply_env(env);
    Ok(cfg)
  }

  pub fn defaults() -> Self {
    let mut map = BTreeMap::new();
    map.insert(
      "supabase.table".to_string(),
      DEFAULT_TABLE.to_string()
    );
    map.insert(
      "supabase.bucket".to_string(),
      DEFAULT_BUCKET.to_string()
    );
    map.insert(
      "ui.color".to_string(),
      "on".to_string()
    );

    Config {
      map,
      loaded_files: vec![]
    }
  }

  pub fn apply_env<F>(&mut self, env: F)
  where
    F: Fn(&str) -> Option<String>
  {
    for (var, key) in ENV_KEYS {
      if let Some(value) = env(var)
        && !value.trim().is_empty()
      {
        debug!(
          var,
          key, "applying environment value"
        );
        self.map.insert(
          key.to_string(),
          value.trim().to_string()
        );
      }
    }
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      // Values are not logged: the anon
      // key may be overridden here.
      debug!(key = %key, "applying override");
      self.map.insert(key, value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn color(&self) -> bool {
    self.get_bool("ui.color").unwrap_or(true)
  }

  pub fn backend(
    &self
  ) -> anyhow::Result<BackendSettings> {
    let url = self
      .non_empty("supabase.url")
      .ok_or_else(|| {
        anyhow!(
          "backend URL is not configured; \
           set SUPABASE_URL or \
           supabase.url"
        )
      })?;
    let anon_key = self
      .non_empty("supabase.anon_key")
      .ok_or_else(|| {
        anyhow!(
          "backend key is not \
           configured; set \
           SUPABASE_ANON_KEY or \
           supabase.anon_key"
        )
      })?;

    Ok(BackendSettings {
      url: url
        .trim_end_matches('/')
        .to_string(),
      anon_key,
      table: self
        .non_empty("supabase.table")
        .unwrap_or_else(|| {
          DEFAULT_TABLE.to_string()
        }),
      bucket: self
        .non_empty("supabase.bucket")
        .unwrap_or_else(|| {
          DEFAULT_BUCKET.to_string()
        })
    })
  }

  fn non_empty(
    &self,
    key: &str
  ) -> Option<String> {
    self
      .get(key)
      .map(|v| v.trim().to_string())
      .filter(|v| !v.is_empty())
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let text =
      fs::read_to_string(path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    let value = toml::from_str::<
      toml::Table,
    >(&text)
    .with_context(|| {
      format!(
        "failed to parse TOML {}",
        path.display()
      )
    })?;

    self
      .loaded_files
      .push(path.to_path_buf());

    let mut flat = Vec::new();
    flatten_table("", &value, &mut flat);
    for (key, value) in flat {
      trace!(key = %key, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

fn flatten_table(
  prefix: &str,
  table: &toml::Table,
  out: &mut Vec<(String, String)>
) {
  for (key, value) in table {
    let full = if prefix.is_empty() {
      key.clone()
    } else {
      format!("{prefix}.{key}")
    };

    match value {
      | toml::Value::Table(inner) => {
        flatten_table(&full, inner, out);
      }
      | toml::Value::String(text) => {
        out.push((full, text.clone()));
      }
      | other => {
        out.push((full, other.to_string()));
      }
    }
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.non_empty("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn resolve_config_path<F>(
  override_path: Option<&Path>,
  env: &F
) -> Option<PathBuf>
where
  F: Fn(&str) -> Option<String>
{
  if let Some(path) = override_path {
    return Some(expand_tilde(path));
  }

  if let Some(path) =
    env("TASKPAD_CONFIG")
  {
    let trimmed = path.trim();
    if !trimmed.is_empty() {
      return Some(expand_tilde(
        Path::new(trimmed)
      ));
    }
  }

  dirs::config_dir().map(|dir| {
    dir
      .join("taskpad")
      .join("config.toml")
  })
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let base = dirs::data_dir()
    .or_else(dirs::home_dir)
    .ok_or_else(|| {
      anyhow!(
        "cannot determine data \
         directory"
      )
    })?;
  Ok(base.join("taskpad"))
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
