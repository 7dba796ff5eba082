//! pollster - a command-line client for the polls API.
//!
//! Lists polls, shows results, casts votes and creates polls. Sessions are
//! kept between runs; expired access tokens are refreshed automatically.

mod app;
mod render;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use pollster_core::Config;

/// Log file name inside `--log-dir`
const LOG_FILE: &str = "pollster.log";

#[derive(Debug, Parser)]
#[command(name = "pollster", version, about = "Command-line client for the polls API")]
struct Cli {
    /// API base URL (overrides config and POLLSTER_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Also write logs to a file in this directory
    #[arg(long, global = true, env = "POLLSTER_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List all polls
    List,
    /// Show one poll
    Show { poll_id: i64 },
    /// Vote for a choice in a poll
    Vote { poll_id: i64, choice_id: i64 },
    /// Create a new poll
    Create {
        question: String,
        /// A choice (repeat for each, at least two)
        #[arg(long = "choice", required = true)]
        choices: Vec<String>,
        /// End time, RFC 3339 (e.g. 2025-01-31T18:00:00Z)
        #[arg(long)]
        ends: Option<DateTime<Utc>>,
    },
    /// Sign in and store the session
    Login { username: Option<String> },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Open a route such as '#poll/3' or '#create-poll'
    Open { route: String },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_ref());

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    debug!(command = ?cli.command, "Running command");

    let mut app = App::new(config)?;
    let result = match cli.command {
        Command::List => app.list().await,
        Command::Show { poll_id } => app.show(poll_id).await,
        Command::Vote { poll_id, choice_id } => app.vote(poll_id, choice_id).await,
        Command::Create {
            question,
            choices,
            ends,
        } => app.create(&question, &choices, ends).await,
        Command::Login { username } => app.login(username).await,
        Command::Logout => {
            app.logout();
            Ok(())
        }
        Command::Whoami => {
            app.whoami();
            Ok(())
        }
        Command::Open { route } => app.open(&route).await,
    };

    app.report_session_change();
    info!(ok = result.is_ok(), "Command finished");
    result
}
