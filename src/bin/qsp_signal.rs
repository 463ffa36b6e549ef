//! QSP signal server binary.
//!
//! # Commands
//!
//! - `server` - Start the signaling server
//! - `config` - Print the default configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use qsp_signal::{Config, Server, ServerConfig, VERSION};

#[derive(Parser)]
#[command(name = "qsp-signal")]
#[command(version = VERSION)]
#[command(about = "QSP Signal - WebRTC signaling relay for station agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the signaling server
    Server {
        /// Config file path (default: <config dir>/qsp-signal/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind to all interfaces (0.0.0.0)
        #[arg(long)]
        bind_all: bool,

        /// Seconds a client waits for an agent answer
        #[arg(long)]
        exchange_timeout: Option<u64>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Log as JSON lines
        #[arg(long)]
        log_json: bool,
    },

    /// Print the default configuration as TOML
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            config,
            host,
            port,
            bind_all,
            exchange_timeout,
            verbose,
            log_json,
        } => {
            init_logging(verbose, log_json);

            let mut file_config = Config::load(config.as_deref())?;
            if let Some(host) = host {
                file_config.server.host = host;
            }
            if let Some(port) = port {
                file_config.server.port = port;
            }

            let mut server_config = ServerConfig::from_config(&file_config)?;
            if bind_all {
                server_config = server_config.bind_all();
            }
            if let Some(secs) = exchange_timeout {
                server_config = server_config.with_exchange_timeout(Duration::from_secs(secs));
            }

            cmd_server(server_config, &file_config)
        },

        Commands::Config => {
            print!("{}", Config::default().to_toml()?);
            Ok(())
        },
    }
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn cmd_server(config: ServerConfig, file_config: &Config) -> anyhow::Result<()> {
    let server = Server::new(config.clone(), file_config.directory()?);

    tracing::info!("Starting QSP signal server {} on {}", VERSION, config.addr);
    if config.cors_origins.is_empty() {
        tracing::info!("CORS: disabled");
    } else {
        tracing::info!("CORS origins: {}", config.cors_origins.join(", "));
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        server.run().await?;
        Ok::<_, anyhow::Error>(())
    })
}
