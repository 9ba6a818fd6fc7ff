use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::app::{App, Notice, NoticeKind, Screen};
use crate::backend::Backend;
use crate::cli::{Command, Credentials};
use crate::form::{AuthForm, AuthMode, FormEvent};
use crate::render::Renderer;
use crate::shell;
use crate::upload::FileChoice;

/// Runs one CLI command against an app whose session has already been
/// restored. Output goes to `out`; the shell also reads from `input`.
#[instrument(skip_all)]
pub async fn dispatch<B, R, W>(
    app: &mut App<B>,
    renderer: &Renderer,
    command: Command,
    input: &mut R,
    out: &mut W,
) -> anyhow::Result<()>
where
    B: Backend,
    R: BufRead,
    W: Write,
{
    debug!(screen = ?app.screen(), "dispatching command");

    match command {
        Command::Signup(creds) => cmd_auth(app, renderer, AuthMode::SignUp, creds, out).await,
        Command::Login(creds) => cmd_auth(app, renderer, AuthMode::SignIn, creds, out).await,
        Command::Logout => cmd_logout(app, out).await,
        Command::Whoami => renderer.write_session(out, app.session().get().as_ref()),
        Command::List => cmd_list(app, renderer, out),
        Command::Show { id } => cmd_show(app, renderer, id, out),
        Command::Add {
            title,
            description,
            image,
            video,
        } => cmd_add(app, renderer, title, description, image, video, out).await,
        Command::Edit {
            id,
            title,
            description,
        } => cmd_edit(app, renderer, id, title, description, out).await,
        Command::Delete { id } => cmd_delete(app, renderer, id, out).await,
        Command::Shell => shell::run(app, renderer, input, out).await,
    }
}

pub async fn dispatch_stdio<B: Backend>(
    app: &mut App<B>,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout().lock();
    dispatch(app, renderer, command, &mut input, &mut out).await
}

fn require_session<B: Backend>(app: &App<B>) -> anyhow::Result<()> {
    if app.screen() == Screen::Auth {
        return Err(anyhow!("not signed in; run `taskpad login` first"));
    }
    Ok(())
}

/// Prints the notices raised by a command. When the command failed, the error
/// notices become the returned error instead of being printed.
fn finish<B: Backend>(app: &mut App<B>, renderer: &Renderer, ok: bool) -> anyhow::Result<()> {
    let notices = app.take_notices();
    if ok {
        renderer.print_notices(&notices)?;
        return Ok(());
    }

    let (errors, infos): (Vec<Notice>, Vec<Notice>) = notices
        .into_iter()
        .partition(|notice| notice.kind == NoticeKind::Error);
    renderer.print_notices(&infos)?;

    let message = errors
        .into_iter()
        .map(|notice| notice.message)
        .collect::<Vec<_>>()
        .join("; ");
    if message.is_empty() {
        Err(anyhow!("command failed"))
    } else {
        Err(anyhow!(message))
    }
}

#[instrument(skip(app, renderer, creds, out), fields(email = %creds.email))]
async fn cmd_auth<B: Backend, W: Write>(
    app: &mut App<B>,
    renderer: &Renderer,
    mode: AuthMode,
    creds: Credentials,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command {}", mode.label());

    app.auth = AuthForm::new(mode, creds.email, creds.password);
    app.submit_auth().await;

    let ok = !app
        .notices()
        .iter()
        .any(|notice| notice.kind == NoticeKind::Error);
    if ok && app.screen() == Screen::Tasks {
        writeln!(out, "Signed in.")?;
    }
    finish(app, renderer, ok)
}

async fn cmd_logout<B: Backend, W: Write>(app: &mut App<B>, out: &mut W) -> anyhow::Result<()> {
    info!("command logout");
    app.logout().await;
    writeln!(out, "Signed out.")?;
    Ok(())
}

fn cmd_list<B: Backend, W: Write>(
    app: &App<B>,
    renderer: &Renderer,
    out: &mut W,
) -> anyhow::Result<()> {
    require_session(app)?;
    renderer.write_task_table(out, app.tasks())
}

fn cmd_show<B: Backend, W: Write>(
    app: &App<B>,
    renderer: &Renderer,
    id: i64,
    out: &mut W,
) -> anyhow::Result<()> {
    require_session(app)?;
    let task = app
        .find_task(id)
        .ok_or_else(|| anyhow!("no task with id {id}"))?;
    renderer.write_task_card(out, task)
}

async fn cmd_add<B: Backend, W: Write>(
    app: &mut App<B>,
    renderer: &Renderer,
    title: String,
    description: String,
    image: Option<PathBuf>,
    video: Option<PathBuf>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command add");
    require_session(app)?;

    app.form.reset();
    app.form.apply(FormEvent::SetTitle(title));
    app.form.apply(FormEvent::SetDescription(description));
    app.form.apply(FormEvent::SetImage(image.map(FileChoice::Path)));
    app.form.apply(FormEvent::SetVideo(video.map(FileChoice::Path)));

    if app.form.submit().is_none() {
        return Err(anyhow!("task title cannot be empty"));
    }

    let created = app.add_task(Utc::now()).await;
    if let Some(id) = created {
        writeln!(out, "Added task {id}.")?;
    }
    finish(app, renderer, created.is_some())
}

async fn cmd_edit<B: Backend, W: Write>(
    app: &mut App<B>,
    renderer: &Renderer,
    id: i64,
    title: Option<String>,
    description: Option<String>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command edit");
    require_session(app)?;

    let mut form = app
        .begin_edit(id)
        .ok_or_else(|| anyhow!("no task with id {id}"))?;
    if title.is_none() && description.is_none() {
        writeln!(out, "Nothing to change.")?;
        return Ok(());
    }
    if let Some(title) = title {
        form.set_title(title);
    }
    if let Some(description) = description {
        form.set_description(description);
    }

    let saved = app.submit_edit(form).await;
    if saved {
        writeln!(out, "Updated task {id}.")?;
    }
    finish(app, renderer, saved)
}

async fn cmd_delete<B: Backend, W: Write>(
    app: &mut App<B>,
    renderer: &Renderer,
    id: i64,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command delete");
    require_session(app)?;

    if app.find_task(id).is_none() {
        return Err(anyhow!("no task with id {id}"));
    }

    let deleted = app.delete_task(id).await;
    if deleted {
        writeln!(out, "Deleted task {id}.")?;
    }
    finish(app, renderer, deleted)
}
