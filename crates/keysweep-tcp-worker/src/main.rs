use clap::Parser;
use keysweep_tcp_core::telemetry::init_telemetry;
use keysweep_tcp_worker::{
    BlowfishTester, CriticalSection, Worker, WorkerConfig, worker::config::CliArgs,
};
use tokio::signal;

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

    let config = match WorkerConfig::try_from(args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid arguments: {e}");
            std::process::exit(1);
        }
    };

    let worker = Worker::new(&config, BlowfishTester::new(config.plaintext.clone()));

    // No point starting without an allocator to talk to.
    if !worker.client().probe().await {
        eprintln!(
            "No allocator running on {} to make requests, exiting",
            config.allocator_addr()
        );
        std::process::exit(1);
    }

    tracing::info!(
        "Connected to allocator on {}, requesting {} keys per chunk",
        config.allocator_addr(),
        config.chunk_size
    );

    tokio::spawn(shutdown_signal(worker.critical_section()));

    let summary = worker.run().await;
    if let Some(key) = &summary.found {
        println!("Key found: {key}");
    }
    println!(
        "Searched {} chunks ({} keys), stopped: {}",
        summary.chunks_searched, summary.keys_tested, summary.exit_reason
    );

    Ok(())
}

/// Requests shutdown on Ctrl+C or SIGTERM and waits for the chunk in flight.
async fn shutdown_signal(section: CriticalSection) {
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
    }

    tracing::info!("Shutdown requested, finishing the current chunk first...");
    section.request_shutdown();
    section.drained().await;
    tracing::info!("Work finished, shutting worker down");
}
