mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pagebridge")]
#[command(about = "Expose a live page's console, storage and metrics as MCP tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.pagebridge/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP endpoint and the page websocket
    Serve {
        /// Host to bind to (overrides config server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config server.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Per-call timeout in milliseconds, 0 to wait forever (overrides config relay.callTimeoutMs)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Run a headless in-memory page that answers calls from a server
    Page {
        /// Bridge websocket URL (defaults to the configured server)
        #[arg(long)]
        url: Option<String>,

        /// Origin the in-memory page pretends to be served from
        #[arg(long)]
        origin: Option<String>,
    },

    /// List the capability catalogue
    Tools {
        /// Print the MCP tool schemas as JSON
        #[arg(long)]
        json: bool,
    },

    /// Call one capability on a running server
    Call {
        /// Capability name, e.g. local_storage
        name: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,

        /// MCP endpoint URL (defaults to the configured server)
        #[arg(long)]
        url: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve {
            host,
            port,
            timeout_ms,
        } => {
            commands::serve::run(config_path, host, port, timeout_ms).await?;
        }
        Commands::Page { url, origin } => {
            commands::page::run(config_path, url, origin).await?;
        }
        Commands::Tools { json } => {
            commands::tools_cmd::list(config_path, json)?;
        }
        Commands::Call { name, params, url } => {
            commands::call::run(config_path, &name, &params, url).await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config_cmd::show(config_path)?,
            ConfigCommands::Init { force } => commands::config_cmd::init(config_path, force)?,
            ConfigCommands::Path => commands::config_cmd::path(config_path),
        },
    }

    Ok(())
}
