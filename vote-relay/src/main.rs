use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use vote_relay::{cli::Cli, coordinator::Coordinator, server::Server};

fn init_tracing() {
    use std::io::IsTerminal;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let catalog = cli.load_catalog()?;
    let store = cli.store.build_store()?;
    let coordinator = Arc::new(Coordinator::new(catalog, store, cli.relay_config()));

    let listen = cli.listen_addr();
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    let server = Server::new(listener, coordinator);
    let addr = server.local_addr()?;
    info!("vote relay listening on {}", addr);

    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("vote relay exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
