pub mod app;
pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod form;
pub mod render;
pub mod session;
pub mod shell;
pub mod supabase;
pub mod task;
pub mod upload;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info,
  warn
};

use crate::app::App;
use crate::cli::Command;
use crate::session::SessionStore;
use crate::supabase::SupabaseClient;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskpad"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );
  debug!(files = ?cfg.loaded_files, "configuration loaded");

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let client = SupabaseClient::new(
    &cfg.backend()?
  )?;
  let renderer =
    render::Renderer::new(&cfg);
  let command =
    cli.command.unwrap_or(Command::Shell);

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  runtime.block_on(async move {
    let stored = store
      .load_session()
      .unwrap_or_else(|err| {
        warn!(error = %err, "ignoring unreadable stored session");
        None
      });

    let mut app = App::new(
      client,
      SessionStore::new()
    );
    app.persist_sessions(store);
    app
      .restore_session(stored, Utc::now())
      .await;

    commands::dispatch_stdio(
      &mut app, &renderer, command
    )
    .await
  })?;

  info!("done");
  Ok(())
}
