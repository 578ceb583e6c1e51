use std::{fmt, path::PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::LevelFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Messaging backend URL
    #[arg(
        long,
        env = "TENROPES_URL",
        default_value = "",
        hide_default_value = true,
        global = true
    )]
    pub base_url: String,

    /// Access token sent as a bearer token
    #[arg(
        long,
        env = "TENROPES_TOKEN",
        default_value = "",
        hide_default_value = true,
        hide_env_values = true,
        global = true
    )]
    pub token: String,

    /// Ignore live messages that are already in the feed
    #[arg(long, global = true)]
    pub dedupe: bool,

    /// Never ring the terminal bell for incoming messages
    #[arg(long, global = true)]
    pub no_bell: bool,

    /// Log verbosity
    #[arg(short, long, value_name = "LEVEL", default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Follow a channel. Lines typed on stdin are sent, `/older` loads more history, `/quit` leaves
    Watch {
        /// Channel id or name
        channel: String,
    },
    /// Print the history of a channel
    History {
        /// Channel id or name
        channel: String,

        /// Older pages to load after the first one
        #[arg(short, long, default_value_t = 0)]
        pages: usize,
    },
    /// Send one message. Links ending in an image extension are sent as images
    Send {
        /// Channel id or name
        channel: String,

        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Show the readable palette derived from a channel theme
    Theme {
        /// Channel id or name
        #[arg(long, conflicts_with = "file")]
        channel: Option<String>,

        /// JSON file holding an authored theme
        #[arg(long)]
        file: Option<PathBuf>,

        /// Print the normalized theme as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(long)]
        shell: Shell,
    },
}

impl Command {
    pub fn needs_backend(&self) -> bool {
        match self {
            Command::Watch { .. } | Command::History { .. } | Command::Send { .. } => true,
            Command::Theme { channel, .. } => channel.is_some(),
            Command::Completions { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl From<LogLevel> for LevelFilter {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        };
        write!(f, "{name}")
    }
}
