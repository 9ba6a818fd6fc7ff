//! Line-oriented interactive front end:
//! the auth screen while signed out, the
//! task screen while signed in.

use std::io::{
  BufRead,
  Write
};
use std::path::PathBuf;

use chrono::Utc;
use tracing::{
  debug,
  info
};

use crate::app::{
  App,
  Screen
};
use crate::backend::Backend;
use crate::form::{
  EditForm,
  FormEvent
};
use crate::render::Renderer;
use crate::upload::FileChoice;

const TASK_HELP: &str = "commands: add, \
                         edit <id>, \
                         delete <id>, \
                         show <id>, \
                         refresh, \
                         logout, quit";

#[derive(Debug, PartialEq, Eq)]
enum Flow {
  Continue,
  Quit
}

pub async fn run<B, R, W>(
  app: &mut App<B>,
  renderer: &Renderer,
  input: &mut R,
  out: &mut W
) -> anyhow::Result<()>
where
  B: Backend,
  R: BufRead,
  W: Write
{
  info!("interactive shell started");

  loop {
    let notices = app.take_notices();
    renderer.write_notices(out, &notices)?;

    let flow = match app.screen() {
      | Screen::Auth => {
        auth_screen(
          app, renderer, input, out
        )
        .await?
      }
      | Screen::Tasks => {
        task_screen(
          app, renderer, input, out
        )
        .await?
      }
    };

    if flow == Flow::Quit {
      break;
    }
  }

  let notices = app.take_notices();
  renderer.write_notices(out, &notices)?;
  info!("interactive shell finished");
  Ok(())
}

/// `None` on end of input.
fn prompt<R: BufRead, W: Write>(
  input: &mut R,
  out: &mut W,
  label: &str
) -> anyhow::Result<Option<String>> {
  write!(out, "{label}")?;
  out.flush()?;

  let mut line = String::new();
  if input.read_line(&mut line)? == 0 {
    writeln!(out)?;
    return Ok(None);
  }

  let trimmed = line
    .trim_end_matches(['\r', '\n'])
    .to_string();
  Ok(Some(trimmed))
}

async fn auth_screen<B, R, W>(
  app: &mut App<B>,
  renderer: &Renderer,
  input: &mut R,
  out: &mut W
) -> anyhow::Result<Flow>
where
  B: Backend,
  R: BufRead,
  W: Write
{
  renderer.write_auth_screen(
    out, &app.auth
  )?;

  let Some(email) =
    prompt(input, out, "email: ")?
  else {
    return Ok(Flow::Quit);
  };

  match email.trim() {
    | "quit" | "exit" => {
      return Ok(Flow::Quit);
    }
    | "switch" => {
      app.auth.toggle_mode();
      return Ok(Flow::Continue);
    }
    | _ => {}
  }

  let Some(password) =
    prompt(input, out, "password: ")?
  else {
    return Ok(Flow::Quit);
  };

  app.auth.email = email.trim().to_string();
  app.auth.password = password;
  app.submit_auth().await;
  app.auth.password.clear();

  Ok(Flow::Continue)
}

async fn task_screen<B, R, W>(
  app: &mut App<B>,
  renderer: &Renderer,
  input: &mut R,
  out: &mut W
) -> anyhow::Result<Flow>
where
  B: Backend,
  R: BufRead,
  W: Write
{
  writeln!(out)?;
  renderer.write_screen(out, app)?;

  let Some(line) =
    prompt(input, out, "> ")?
  else {
    return Ok(Flow::Quit);
  };

  let mut words = line.split_whitespace();
  let command =
    words.next().unwrap_or_default();
  let arg = words.next();
  debug!(command, ?arg, "shell command");

  match (command, parse_id(arg)) {
    | ("", _) => {}
    | ("quit" | "exit", _) => {
      return Ok(Flow::Quit);
    }
    | ("refresh" | "list", _) => {
      app.fetch_tasks().await;
    }
    | ("logout", _) => {
      app.logout().await;
      writeln!(out, "Signed out.")?;
    }
    | ("add", _) => {
      add_flow(app, input, out).await?;
    }
    | ("edit", Some(id)) => {
      match app.begin_edit(id) {
        | Some(form) => {
          edit_flow(app, form, input, out)
            .await?;
        }
        | None => {
          writeln!(out, "no task with id {id}")?;
        }
      }
    }
    | ("delete", Some(id)) => {
      if app.find_task(id).is_some() {
        app.delete_task(id).await;
      } else {
        writeln!(out, "no task with id {id}")?;
      }
    }
    | ("show", Some(id)) => {
      match app.find_task(id) {
        | Some(task) => {
          renderer.write_task_card(out, task)?;
        }
        | None => {
          writeln!(out, "no task with id {id}")?;
        }
      }
    }
    | _ => {
      writeln!(out, "{TASK_HELP}")?;
    }
  }

  Ok(Flow::Continue)
}

fn parse_id(arg: Option<&str>) -> Option<i64> {
  arg.and_then(|raw| raw.parse().ok())
}

async fn add_flow<B, R, W>(
  app: &mut App<B>,
  input: &mut R,
  out: &mut W
) -> anyhow::Result<()>
where
  B: Backend,
  R: BufRead,
  W: Write
{
  let Some(title) =
    prompt(input, out, "title: ")?
  else {
    return Ok(());
  };
  app.form.apply(FormEvent::SetTitle(title));

  let Some(description) =
    prompt(input, out, "description: ")?
  else {
    return Ok(());
  };
  app
    .form
    .apply(FormEvent::SetDescription(
      description
    ));

  let Some(image) = prompt(
    input,
    out,
    "image file (blank for none): "
  )?
  else {
    return Ok(());
  };
  app.form.apply(FormEvent::SetImage(
    file_choice(&image)
  ));

  let Some(video) = prompt(
    input,
    out,
    "video file (blank for none): "
  )?
  else {
    return Ok(());
  };
  app.form.apply(FormEvent::SetVideo(
    file_choice(&video)
  ));

  if app.form.submit().is_none() {
    writeln!(out, "A title is required.")?;
    return Ok(());
  }

  app.add_task(Utc::now()).await;
  Ok(())
}

fn file_choice(raw: &str) -> Option<FileChoice> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    None
  } else {
    Some(FileChoice::Path(PathBuf::from(
      trimmed
    )))
  }
}

/// Answer that empties the description.
const CLEAR: &str = "-";

/// Inline editor. Blank answers keep the
/// current value; end of input at any
/// prompt cancels the whole edit.
async fn edit_flow<B, R, W>(
  app: &mut App<B>,
  mut form: EditForm,
  input: &mut R,
  out: &mut W
) -> anyhow::Result<()>
where
  B: Backend,
  R: BufRead,
  W: Write
{
  let title_label =
    format!("title [{}]: ", form.title);
  let Some(title) =
    prompt(input, out, &title_label)?
  else {
    app.edit_task(form.cancel()).await;
    writeln!(out, "Edit cancelled.")?;
    return Ok(());
  };

  let description_label = format!(
    "description [{}] ('{CLEAR}' \
     clears): ",
    form.description
  );
  let Some(description) = prompt(
    input,
    out,
    &description_label
  )?
  else {
    app.edit_task(form.cancel()).await;
    writeln!(out, "Edit cancelled.")?;
    return Ok(());
  };

  if !title.trim().is_empty() {
    form.set_title(title);
  }
  match description.trim() {
    | "" => {}
    | CLEAR => form.set_description(""),
    | _ => form.set_description(description)
  }

  let confirmed = matches!(
    prompt(input, out, "Save? [y/N] ")?
      .as_deref()
      .map(str::trim),
    Some("y" | "Y" | "yes")
  );

  if confirmed {
    app.submit_edit(form).await;
  } else {
    app.edit_task(form.cancel()).await;
    writeln!(out, "Edit cancelled.")?;
  }
  Ok(())
}
