//! # Telemetry
//!
//! Both binaries log through `tracing`. Events are printed to the console by
//! `tracing_subscriber::fmt`, filtered by `RUST_LOG` (default `info`).
//!
//! ## Example usage
//!
//! ```bash
//! RUST_LOG=debug keysweep-allocator 0 4 <ciphertext>
//! RUST_LOG=keysweep_tcp_worker=trace keysweep-worker 127.0.0.1 4000 1000000
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber was already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true),
        )
        .try_init()?;

    Ok(())
}
