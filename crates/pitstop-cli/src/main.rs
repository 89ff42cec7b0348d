//! Pitstop CLI - sign in, call the API, and follow realtime updates.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use pitstop_config_and_utils::{init_logging, Config, Paths};
use session_engine::Role;
use tracing::debug;

/// Pitstop CLI - Manage your session and talk to the Pitstop API.
#[derive(Parser)]
#[command(name = "pitstop")]
#[command(about = "Pitstop CLI for authentication, API calls and realtime events")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error). Defaults to the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email or phone and password
    Login {
        /// Email or phone; prompted when omitted
        identifier: Option<String>,
        /// Account type
        #[arg(short, long, default_value = "customer")]
        role: Role,
    },

    /// Create a new account
    Register {
        /// Display name
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: Option<String>,
        #[arg(short, long)]
        phone: Option<String>,
        /// Account type
        #[arg(short, long, default_value = "customer")]
        role: Role,
    },

    /// Logout and clear session
    Logout,

    /// Check authentication status
    Status,

    /// Call an API endpoint with the current session
    Call {
        /// HTTP method (GET, POST, ...)
        method: String,
        /// Path relative to the API base URL
        path: String,
        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
    },

    /// Connect the realtime channel and print events
    Listen {
        /// Extra rooms to join after connecting
        #[arg(long = "room")]
        rooms: Vec<String>,
    },
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    init_logging("pitstop-cli", &level);
    debug!(base_dir = %paths.base_dir().display(), "Starting pitstop CLI");

    let ctx = commands::Context::load(&paths, config)?;

    match cli.command {
        Commands::Login { identifier, role } => {
            commands::login(&ctx, identifier, role, &cli.format).await
        }
        Commands::Register {
            name,
            email,
            phone,
            role,
        } => commands::register(&ctx, name, email, phone, role, &cli.format).await,
        Commands::Logout => commands::logout(&ctx, &cli.format).await,
        Commands::Status => commands::status(&ctx, &cli.format).await,
        Commands::Call { method, path, body } => {
            commands::call(&ctx, &method, &path, body.as_deref(), &cli.format).await
        }
        Commands::Listen { rooms } => commands::listen(&ctx, &rooms, &cli.format).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
