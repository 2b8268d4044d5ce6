//! 2 Man CLI - terminal client for the realtime connection.
//!
//! Connects to a 2 Man realtime server, streams incoming events, and
//! offers payload validation for scripting and debugging.

mod commands;

use clap::{Parser, Subcommand};
use tracing::info;

use tm_core::config::AppConfig;
use tm_core::error::TmResult;
use tm_core::logging;

/// 2 Man realtime client.
#[derive(Parser)]
#[command(
    name = "twoman",
    version,
    about = "2 Man realtime client CLI",
    long_about = "A command-line client for the 2 Man realtime server.\n\
                  Connect with a session token to send and receive realtime events."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the realtime server and stream events.
    Connect {
        /// WebSocket endpoint (overrides config).
        #[arg(short, long)]
        url: Option<String>,
        /// Session token to authenticate with.
        #[arg(short, long)]
        token: String,
        /// Save connection settings to the config file.
        #[arg(long)]
        save: bool,
    },
    /// Validate a message payload against its type schema.
    Validate {
        /// Message type, e.g. "chat".
        message_type: String,
        /// JSON payload; read from stdin when omitted.
        payload: Option<String>,
    },
    /// Print the active configuration.
    Config,
}

#[tokio::main]
async fn main() -> TmResult<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let log_dir = dirs::data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("twoman")
        .join("logs");
    let _guard = logging::init_logging(log_level, &log_dir, false)?;

    let config = if let Some(path) = cli.config.as_deref() {
        AppConfig::load_from_file(std::path::Path::new(path))?
    } else {
        AppConfig::load_or_default()?
    };
    let config = config.into_handle();

    info!("2 Man CLI v{}", tm_core::constants::CLIENT_VERSION);

    match cli.command {
        Commands::Connect { url, token, save } => {
            commands::connect::run(config, url, token, save).await
        }
        Commands::Validate {
            message_type,
            payload,
        } => commands::validate::run(&message_type, payload),
        Commands::Config => commands::show_config(config).await,
    }
}
