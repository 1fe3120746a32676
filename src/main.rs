//! # Chat With It CLI (`cwi`)
//!
//! ## Usage
//!
//! ```bash
//! cwi --config ./config/cwi.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cwi init` | Create the SQLite database and run schema migrations |
//! | `cwi vectorize <path> --bucket <b>` | Run the ingestion pipeline for one stored object |
//! | `cwi chat --user <u> "<prompt>"` | One chat turn; prints the response envelope |
//! | `cwi status <user> [<file>]` | Show processing status |
//! | `cwi sessions create\|list\|delete` | Manage chat sessions |
//! | `cwi serve` | Start the HTTP server |
//! | `cwi completions <shell>` | Print shell completions |
//!
//! Logs go to stderr and are filtered by `RUST_LOG` (default `info`).

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use chat_with_it::chat::ChatRequest;
use chat_with_it::config::{self, Config};
use chat_with_it::models::UploadEvent;
use chat_with_it::services::{Repositories, Services};
use chat_with_it::{migrate, server, sessions};

/// Chat With It: ingest documents into per-user vector stores and chat
/// with them.
#[derive(Parser)]
#[command(name = "cwi", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cwi.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Run the ingestion pipeline for one stored object and print the outcome.
    Vectorize {
        /// Object path, e.g. `user-documents/u1/report.pdf`.
        storage_path: String,

        #[arg(long)]
        bucket: String,
    },

    /// Send one chat prompt and print the response envelope as JSON.
    Chat {
        prompt: String,

        #[arg(long)]
        user: String,

        #[arg(long)]
        session: Option<String>,

        /// Repeating an id returns the stored reply instead of re-asking the model.
        #[arg(long)]
        client_message_id: Option<String>,
    },

    /// Show processing status for a user's files.
    Status {
        user: String,
        file: Option<String>,
    },

    /// Manage chat sessions.
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Print shell completions.
    Completions { shell: Shell },
}

#[derive(Subcommand)]
enum SessionAction {
    Create {
        #[arg(long)]
        user: String,
    },
    List {
        #[arg(long)]
        user: String,
    },
    Delete {
        session_id: String,
        #[arg(long)]
        user: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "cwi", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Vectorize {
            storage_path,
            bucket,
        } => {
            let services = Services::from_config(&cfg).await?;
            let event = UploadEvent::new(storage_path, bucket);
            let outcome = services
                .pipeline
                .run(&event, &CancellationToken::new())
                .await;
            println!("{}", outcome);
        }
        Commands::Chat {
            prompt,
            user,
            session,
            client_message_id,
        } => {
            let services = Services::from_config(&cfg).await?;
            let request =
                ChatRequest::new(prompt, session).with_client_message_id(client_message_id);
            print_json(&services.chat.respond(&user, &request).await)?;
        }
        Commands::Status { user, file } => run_status(&cfg, &user, file.as_deref()).await?,
        Commands::Sessions { action } => {
            let repos = Repositories::sqlite(&cfg).await?;
            let store = repos.sessions.as_ref();
            match action {
                SessionAction::Create { user } => {
                    print_json(&sessions::create_session(store, &user).await)?
                }
                SessionAction::List { user } => {
                    print_json(&sessions::list_sessions(store, &user).await)?
                }
                SessionAction::Delete { session_id, user } => {
                    print_json(&sessions::delete_session(store, &user, &session_id).await)?
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

async fn run_status(cfg: &Config, user: &str, file: Option<&str>) -> Result<()> {
    let repos = Repositories::sqlite(cfg).await?;
    let statuses: Vec<_> = match file {
        Some(file) => repos
            .statuses
            .get_status(user, file)
            .await?
            .into_iter()
            .collect(),
        None => repos.statuses.list_statuses(user).await?,
    };

    if statuses.is_empty() {
        println!("No processing status recorded for {}.", user);
        return Ok(());
    }

    println!("{:<40} {:<12} {:>5}  UPDATED", "FILE", "STATUS", "PCT");
    for s in statuses {
        println!(
            "{:<40} {:<12} {:>4}%  {}",
            s.file_name,
            s.status.as_str(),
            s.progress_percentage,
            s.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(err) = s.error {
            println!("    error: {}", err);
        }
    }
    Ok(())
}
