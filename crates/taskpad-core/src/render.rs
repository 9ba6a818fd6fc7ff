use std::io::{self, IsTerminal, Write};

use chrono::Local;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::{App, Notice, NoticeKind, Screen};
use crate::backend::Backend;
use crate::config::Config;
use crate::form::AuthForm;
use crate::session::Session;
use crate::task::Task;

const DESCRIPTION_WIDTH: usize = 48;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self { color: cfg.color() }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    /// Writes whichever screen the session allows: the auth form when signed
    /// out, the task list when signed in.
    pub fn write_screen<W: Write, B: Backend>(
        &self,
        out: &mut W,
        app: &App<B>,
    ) -> anyhow::Result<()> {
        match app.screen() {
            Screen::Auth => self.write_auth_screen(out, &app.auth),
            Screen::Tasks => {
                let email = app
                    .session()
                    .get()
                    .and_then(|s| s.user.email)
                    .unwrap_or_default();
                writeln!(out, "{}", self.paint("Task Manager", "1"))?;
                if !email.is_empty() {
                    writeln!(out, "signed in as {email}")?;
                }
                writeln!(out)?;
                self.write_task_table(out, app.tasks())
            }
        }
    }

    pub fn write_auth_screen<W: Write>(&self, out: &mut W, form: &AuthForm) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(form.mode.label(), "1"))?;
        writeln!(out, "email     {}", form.email)?;
        writeln!(out, "password  {}", "*".repeat(form.password.chars().count()))?;
        writeln!(out, "(type 'switch' to {})", form.mode.other().label())?;
        Ok(())
    }

    #[tracing::instrument(skip(self, out, tasks), fields(count = tasks.len()))]
    pub fn write_task_table<W: Write>(&self, out: &mut W, tasks: &[Task]) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Title".to_string(),
            "Description".to_string(),
            "Media".to_string(),
            "Created".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = self.paint(&task.id.to_string(), "33");
            let media = self.paint(&task.media_label(), "36");
            rows.push(vec![
                id,
                task.title.clone(),
                truncate(&single_line(&task.description), DESCRIPTION_WIDTH),
                media,
                format_created(task),
            ]);
        }

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, out, task), fields(id = task.id))]
    pub fn write_task_card<W: Write>(&self, out: &mut W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id        {}", self.paint(&task.id.to_string(), "33"))?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "desc      {}", task.description)?;
        if let Some(url) = &task.image_url {
            writeln!(out, "image     {url}")?;
        }
        if let Some(url) = &task.video_url {
            writeln!(out, "video     {url}")?;
        }
        writeln!(out, "created   {}", format_created(task))?;
        Ok(())
    }

    pub fn write_session<W: Write>(
        &self,
        out: &mut W,
        session: Option<&Session>,
    ) -> anyhow::Result<()> {
        match session {
            Some(session) => {
                writeln!(out, "user      {}", session.user.id)?;
                writeln!(
                    out,
                    "email     {}",
                    session.user.email.clone().unwrap_or_default()
                )?;
                if let Some(expires) = session.expires_at_utc() {
                    writeln!(
                        out,
                        "expires   {}",
                        expires.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                    )?;
                }
            }
            None => writeln!(out, "not signed in")?,
        }
        Ok(())
    }

    pub fn write_notices<W: Write>(&self, out: &mut W, notices: &[Notice]) -> anyhow::Result<()> {
        for notice in notices {
            let marker = match notice.kind {
                NoticeKind::Info => self.paint("!", "32"),
                NoticeKind::Error => self.paint("!", "31"),
            };
            writeln!(out, "{marker} {}", notice.message)?;
        }
        Ok(())
    }

    /// Notices go to stderr so task output stays pipeable.
    pub fn print_notices(&self, notices: &[Notice]) -> anyhow::Result<()> {
        let mut err = io::stderr().lock();
        self.write_notices(&mut err, notices)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() || text.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn format_created(task: &Task) -> String {
    task.created_at
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: &str, max: usize) -> String {
    if UnicodeWidthStr::width(text) <= max {
        return text.to_string();
    }

    let mut out = String::new();
    let mut width = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + w + 1 > max {
            break;
        }
        width += w;
        out.push(ch);
    }
    out.push('…');
    out
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
