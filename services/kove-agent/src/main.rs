//! # Kove Agent
//!
//! Policy violation exporter

use clap::Parser;
use kove_agent::Agent;
use kove_core::{KoveConfig, BUILD_INFO};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kove-agent")]
#[command(about = "Export policy violations of live objects as metrics")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the configured listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Override the configured watch stream (`-` for stdin)
    #[arg(short, long)]
    watch: Option<String>,

    /// Wait for outstanding evaluations before exiting
    #[arg(long)]
    drain_on_shutdown: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    info!("Starting {}", BUILD_INFO);

    let mut config = KoveConfig::from_file(&args.config)?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(watch) = args.watch {
        config.watch = watch;
    }
    let addr = config.listen_addr()?;

    let agent = Agent::from_config(config)?.with_drain_on_shutdown(args.drain_on_shutdown);
    let source = agent.open_watch().await?;
    let listener = TcpListener::bind(addr).await?;

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };
    agent.run(listener, source, shutdown).await?;

    Ok(())
}
