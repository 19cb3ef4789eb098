use std::time::Duration;

use project_rpg::config::parse_cli_args;
use project_rpg::server::{build_world, run_server};
use project_rpg::shutdown::{self, shutdown_channel};

#[tokio::main]
async fn main() {
    observability::init_logging("info");

    let config = parse_cli_args();
    tracing::info!(addr = %config.net.ws_addr, "RPG server starting...");

    let world = match build_world(&config) {
        Ok(world) => world,
        Err(e) => {
            eprintln!("Failed to build world: {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let server = run_server(config, world, shutdown_rx);
    tokio::pin!(server);

    tokio::select! {
        _ = shutdown::wait_for_signal() => {
            tracing::info!("shutdown signal received, stopping server...");
            shutdown_tx.trigger();
            match tokio::time::timeout(Duration::from_secs(5), &mut server).await {
                Ok(Err(e)) => tracing::error!(error = %e, "server stopped with error"),
                Err(_) => tracing::warn!("server did not stop in time"),
                Ok(Ok(())) => {}
            }
        }
        result = &mut server => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
                std::process::exit(1);
            }
        }
    }

    tracing::info!("server stopped.");
}
