use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use myrvm::cli::cache::{self, CacheAction};
use myrvm::cli::session::{self, ManageAction, ManageOptions};
use myrvm::cli::Interactive;
use myrvm::logging::init_tracing;
use myrvm::state::{AppState, init_app_state};
use myrvm_core::UserId;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "myrvm-cli")]
#[command(about = "MyRVM CLI - Cache and session administration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the application cache
    Cache {
        /// warm, clear, stats or clear-prefix
        action: CacheAction,

        /// Key prefix for clear-prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Manage kiosk sessions
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Remove expired and unreadable sessions
    Cleanup {
        /// Show what would be removed without removing it
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Inspect or clear sessions
    Manage {
        /// cleanup, stats, list or clear
        action: ManageAction,

        /// Limit to one user's sessions
        #[arg(long)]
        user_id: Option<u64>,

        /// Limit to one session
        #[arg(long)]
        session_id: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    init_tracing();

    // Unknown actions are rejected here, before any connection is attempted
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let state = match init_app_state().await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("\n❌ Failed to connect to cache store: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match dispatch(&state, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\n❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(state: &AppState, command: Commands) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();

    match command {
        Commands::Cache { action, prefix } => {
            cache::run(&state.cache, action, prefix.as_deref(), &mut out).await
        }
        Commands::Session { command } => match command {
            SessionCommand::Cleanup { dry_run, force } => {
                session::cleanup(&state.sessions, dry_run, force, &Interactive, &mut out).await
            }
            SessionCommand::Manage {
                action,
                user_id,
                session_id,
                force,
            } => {
                let options = ManageOptions {
                    user_id: user_id.map(UserId::new),
                    session_id,
                    force,
                };
                session::manage(&state.sessions, action, &options, &Interactive, &mut out).await
            }
        },
    }
}
