use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        let key = k.trim();
        if key.is_empty() {
            return Err(anyhow!("empty key in override: {s}"));
        }
        Ok(Self {
            key: key.to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskpad",
    version,
    about = "Taskpad: tasks with image and video attachments on a hosted backend",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Override a config key, e.g. --set supabase.bucket=media
    #[arg(
        long = "set",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
pub struct Credentials {
    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub password: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create an account
    Signup(Credentials),

    /// Sign in with email and password
    Login(Credentials),

    /// Sign out and forget the stored session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List your tasks, newest first
    List,

    /// Show one task with its media links
    Show { id: i64 },

    /// Add a task
    Add {
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        image: Option<PathBuf>,

        #[arg(long)]
        video: Option<PathBuf>,
    },

    /// Change a task's title and/or description
    Edit {
        id: i64,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a task
    Delete { id: i64 },

    /// Interactive session (default)
    Shell,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_val_requires_separator_and_key() {
        let kv: KeyVal = "supabase.bucket = media".parse().expect("parse");
        assert_eq!(
            kv,
            KeyVal {
                key: "supabase.bucket".to_string(),
                value: "media".to_string(),
            }
        );
        assert!("novalue".parse::<KeyVal>().is_err());
        assert!("=x".parse::<KeyVal>().is_err());
    }

    #[test]
    fn parses_add_with_media_and_global_flags() {
        let cli = GlobalCli::parse_from([
            "taskpad",
            "add",
            "--title",
            "T1",
            "--image",
            "cat.png",
            "-vv",
            "--set",
            "ui.color=off",
        ]);

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.overrides.len(), 1);
        match cli.command {
            Some(Command::Add {
                title,
                description,
                image,
                video,
            }) => {
                assert_eq!(title, "T1");
                assert_eq!(description, "");
                assert_eq!(image, Some(PathBuf::from("cat.png")));
                assert_eq!(video, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn no_subcommand_means_shell() {
        let cli = GlobalCli::parse_from(["taskpad"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn edit_fields_are_optional() {
        let cli = GlobalCli::parse_from(["taskpad", "edit", "4", "--title", "T2"]);
        match cli.command {
            Some(Command::Edit {
                id,
                title,
                description,
            }) => {
                assert_eq!(id, 4);
                assert_eq!(title.as_deref(), Some("T2"));
                assert_eq!(description, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
