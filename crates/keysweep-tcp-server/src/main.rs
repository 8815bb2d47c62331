use clap::Parser;
use keysweep_tcp_core::telemetry::init_telemetry;
use keysweep_tcp_server::{AllocatorServer, ServerConfig, server::config::CliArgs};
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        // Help and version go to stdout and exit 0; usage errors exit 1.
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };

    init_telemetry()?;

    let config = match ServerConfig::try_from(args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid arguments: {e}");
            std::process::exit(1);
        }
    };
    log_startup_info(&config);

    let server = AllocatorServer::bind(&config).await?;
    tokio::spawn(shutdown_signal(server.shutdown_token()));

    let summary = server.run().await?;
    match summary.found {
        Some(key) => {
            println!("Key found: {key}");
            if let Some(elapsed) = summary.elapsed {
                println!("It took {} ms to find the key", elapsed.as_millis());
            }
        }
        None => println!("Key not found"),
    }

    tracing::info!("Allocator shut down successfully");
    Ok(())
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting allocator with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting allocator on {} for {}-byte keys",
            config.listen,
            config.key_space.key_width()
        );
    }
}

/// Cancels `token` on Ctrl+C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
        () = token.cancelled() => return,
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
    token.cancel();
}
