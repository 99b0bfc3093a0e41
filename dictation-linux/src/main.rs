// Dictation Link for Linux: run a companion (recorder) or host (receiver) endpoint.

mod config;
mod endpoint;
mod store;
mod transport;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dictation-linux", version, about = "Move recordings from a companion to a host")]
struct Cli {
    /// Recordings directory (overrides config and DICTATION_RECORDINGS_DIR)
    #[arg(long, global = true)]
    recordings_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Receive recordings and confirm each one back to the companion
    Host {
        /// Listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Keep FILE as a new recording and send it to the host
    Companion {
        file: PathBuf,
        /// Host address, e.g. 192.168.1.20:45700
        #[arg(long)]
        peer: Option<std::net::SocketAddr>,
        /// Use the file channel instead of the user-info channel
        #[arg(long)]
        as_file: bool,
    },
    /// List recordings kept on this endpoint
    List,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load();
    if let Some(dir) = cli.recordings_dir {
        cfg.recordings_dir = dir;
    }

    match cli.command {
        Commands::List => {
            for name in endpoint::list(&cfg)? {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Host { port } => {
            if let Some(p) = port {
                cfg.port = p;
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(endpoint::run_host(&cfg))
        }
        Commands::Companion {
            file,
            peer,
            as_file,
        } => {
            if let Some(a) = peer {
                cfg.peer = a;
            }
            let mode = if as_file {
                endpoint::SendMode::File
            } else {
                endpoint::SendMode::UserInfo
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(endpoint::run_companion(&cfg, &file, mode))
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    tracing::info!("shutting down");
    Ok(())
}
