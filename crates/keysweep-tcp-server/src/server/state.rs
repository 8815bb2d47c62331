use core::time::Duration;
use keysweep_tcp_core::keysweep::{ChunkAllocator, FoundKey};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// State shared by the accept loop and every connection of a run.
///
/// The allocator is the only mutable part of the search itself; the rest is
/// bookkeeping for the end-of-run report and the shutdown signal observed by
/// every task.
#[derive(Debug)]
pub struct RunState {
    pub allocator: Arc<ChunkAllocator>,
    pub shutdown: CancellationToken,
    pub max_line_length: usize,
    first_contact: OnceLock<Instant>,
    found: OnceLock<Found>,
}

/// The winning report of a run.
#[derive(Debug, Clone)]
pub struct Found {
    pub key: FoundKey,
    /// Time from the first worker connection to the report.
    pub elapsed: Duration,
}

impl RunState {
    pub fn new(
        allocator: Arc<ChunkAllocator>,
        shutdown: CancellationToken,
        max_line_length: usize,
    ) -> Self {
        Self {
            allocator,
            shutdown,
            max_line_length,
            first_contact: OnceLock::new(),
            found: OnceLock::new(),
        }
    }

    /// Starts the run clock on the first accepted connection. Later calls
    /// have no effect.
    pub fn mark_contact(&self) {
        self.first_contact.get_or_init(Instant::now);
    }

    /// Time since the first accepted connection, if any.
    pub fn elapsed(&self) -> Option<Duration> {
        self.first_contact.get().map(Instant::elapsed)
    }

    /// Records a found report and stops the run.
    ///
    /// Only the first report wins; it is stored, logged, and cancels the
    /// shutdown token so the accept loop stops and idle connections close.
    /// Returns `false` for every later report, whose result is discarded.
    pub fn record_found(&self, key: FoundKey) -> bool {
        if !self.allocator.report_found() {
            tracing::debug!(%key, "Ignoring found report after the run ended");
            return false;
        }

        let elapsed = self.elapsed().unwrap_or_default();
        tracing::info!(%key, "Key found");
        tracing::info!("It took {} ms to find the key", elapsed.as_millis());

        let _ = self.found.set(Found { key, elapsed });
        self.shutdown.cancel();
        true
    }

    pub fn found(&self) -> Option<&Found> {
        self.found.get()
    }
}
