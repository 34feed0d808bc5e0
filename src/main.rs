//! CLI entry point for the Liric front end.
//!
//! Run the command server:
//! ```bash
//! liric serve --config config/liric.toml
//! ```
//!
//! Send one line command to a C layer and print its reply:
//! ```bash
//! liric send localhost 8367 status exposure status
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use liric::app::Liric;
use liric::config::Settings;
use liric::line_protocol::LineCommandClient;
use liric::logging::{self, TracingConfig};
use liric::network::CommandServer;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "liric")]
#[command(about = "Liric instrument control front end", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept commands until a REBOOT ends the process or Ctrl-C is pressed
    Serve {
        /// TOML settings file
        #[arg(long)]
        config: PathBuf,

        /// Overrides `[logging] level`
        #[arg(long)]
        log_level: Option<String>,

        /// Overrides `[server] port`
        #[arg(long)]
        port: Option<u16>,
    },

    /// Send one line command to a C layer and print the reply
    Send {
        host: String,
        port: u16,
        /// Command words, joined with single spaces
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            log_level,
            port,
        } => {
            let code = serve(config, log_level, port).await?;
            std::process::exit(code);
        }
        Commands::Send { host, port, words } => send(host, port, words.join(" ")).await,
    }
}

async fn serve(config: PathBuf, log_level: Option<String>, port: Option<u16>) -> Result<i32> {
    let mut settings = Settings::load(&config)
        .with_context(|| format!("loading settings from {}", config.display()))?;
    if let Some(level) = log_level {
        settings.logging.level = level;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }
    let tracing_config =
        TracingConfig::from_settings(&settings.logging).context("invalid [logging] settings")?;
    logging::init(tracing_config)?;

    let (liric, mut exit) = Liric::new(settings, Some(config));
    let server = CommandServer::bind(liric.clone()).await?;
    info!(address = %server.local_addr()?, "Liric started");
    let server_task = tokio::spawn(server.run());

    let code = tokio::select! {
        code = exit.recv() => code.unwrap_or(0),
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Waiting for Ctrl-C failed: {e}");
            }
            info!("Interrupted");
            0
        }
    };

    liric.close_server();
    if let Err(e) = server_task.await {
        error!("Command server task failed: {e}");
    }
    info!(code, "Liric stopped");
    Ok(code)
}

async fn send(host: String, port: u16, line: String) -> Result<()> {
    let client = LineCommandClient::new(host, port);
    let reply = client.send(&line).await?;
    println!("status:  {}", reply.status);
    println!("payload: {}", reply.payload);
    if !reply.is_ok() {
        anyhow::bail!("command failed with status {}", reply.status);
    }
    Ok(())
}
