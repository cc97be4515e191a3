//! zealcore documentation server entry point.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zeal_core::Config;
use zeal_serve::{router, AppState};

#[derive(Debug, Parser)]
#[command(name = "zeal-serve", about = "Local documentation search server", version)]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:12340")]
    listen: SocketAddr,

    /// Data directory holding archives and the catalog database.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(&cli)?;

    let config = match cli.data_dir.clone() {
        Some(dir) => Config::with_data_dir(dir),
        None => Config::new(),
    }
    .context("failed to resolve the data directory")?;

    // Catalog open or the initial import failing is fatal: there is
    // nothing meaningful to serve without them.
    let state = tokio::task::spawn_blocking(move || AppState::build(config))
        .await?
        .context("failed to open the catalog and build the index")?;

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    info!(listen = %cli.listen, "zealcore serving");
    axum::serve(listener, app).await?;
    Ok(())
}

fn initialize_logging(cli: &Cli) -> Result<()> {
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}
