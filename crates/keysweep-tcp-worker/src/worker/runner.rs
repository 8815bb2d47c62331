//! The worker's poll/search/report loop.
//!
//! Each cycle:
//!
//! 1. Probe the allocator; stop if it is gone.
//! 2. Ask whether work is left; stop if not.
//! 3. Enter the critical section; stop if shutdown was requested.
//! 4. Request a chunk; stop if the grant is empty.
//! 5. Sweep the chunk on a blocking thread.
//! 6. Report the outcome and leave the critical section. A worker that found
//!    the key stops here.
//!
//! A failed exchange abandons the cycle, waits `retry_delay`, and starts over
//! at the probe. A granted chunk whose sweep or report fails is lost; the
//! allocator never hands it out again. A grant too long to read stops the
//! worker instead, since every retry would lose another chunk.

use crate::worker::{
    blowfish::decode_ciphertext, client::AllocatorClient, config::WorkerConfig,
    critical::CriticalSection,
};
use core::{fmt, time::Duration};
use keysweep_tcp_core::{
    Error, Result,
    keysweep::{ChunkSearch, FoundKey, KeySpace, KeyTester, SearchOutcome},
    protocol::ChunkGrant,
};
use std::sync::Arc;

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The liveness probe failed.
    AllocatorUnreachable,
    /// The allocator reported no work left, or granted an empty chunk.
    NoWorkLeft,
    /// Shutdown was requested between cycles.
    ShutdownRequested,
    /// A grant was longer than the configured line limit. Retrying would only
    /// lose more chunks.
    LineLimitExceeded,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AllocatorUnreachable => "allocator unreachable",
            Self::NoWorkLeft => "no work left",
            Self::ShutdownRequested => "shutdown requested",
            Self::LineLimitExceeded => "grant exceeds the line limit",
        })
    }
}

/// What a worker did before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub chunks_searched: u64,
    pub keys_tested: u128,
    /// The key this worker found, if any.
    pub found: Option<FoundKey>,
    pub exit_reason: ExitReason,
}

enum Cycle {
    Searched(SearchOutcome),
    NoWork,
}

/// A worker bound to one allocator and one key tester.
#[derive(Debug)]
pub struct Worker<T> {
    client: AllocatorClient,
    tester: Arc<T>,
    section: CriticalSection,
    chunk_size: u64,
    retry_delay: Duration,
}

impl<T> Worker<T>
where
    T: KeyTester + 'static,
{
    pub fn new(config: &WorkerConfig, tester: T) -> Self {
        Self {
            client: AllocatorClient::new(config),
            tester: Arc::new(tester),
            section: CriticalSection::new(),
            chunk_size: config.chunk_size,
            retry_delay: config.retry_delay,
        }
    }

    pub fn client(&self) -> &AllocatorClient {
        &self.client
    }

    /// Handle for requesting shutdown and waiting for the current chunk.
    pub fn critical_section(&self) -> CriticalSection {
        self.section.clone()
    }

    /// Runs cycles until the allocator is gone, no work is left, or shutdown
    /// is requested.
    pub async fn run(&self) -> WorkerSummary {
        let mut chunks_searched = 0;
        let mut keys_tested = 0;
        let mut found = None;

        let exit_reason = loop {
            if self.section.is_shutdown_requested() {
                break ExitReason::ShutdownRequested;
            }
            if !self.client.probe().await {
                break ExitReason::AllocatorUnreachable;
            }

            match self.client.work_left().await {
                Ok(true) => {}
                Ok(false) => break ExitReason::NoWorkLeft,
                Err(e) => {
                    self.abandon_cycle(&e).await;
                    continue;
                }
            }

            let Some(guard) = self.section.try_enter() else {
                break ExitReason::ShutdownRequested;
            };

            match self.cycle().await {
                Ok(Cycle::Searched(outcome)) => {
                    chunks_searched += 1;
                    keys_tested += u128::from(outcome.tested());
                    if let Some(key) = outcome.found() {
                        // The allocator grants nothing once the key is reported.
                        found = Some(key.clone());
                        break ExitReason::NoWorkLeft;
                    }
                }
                Ok(Cycle::NoWork) => break ExitReason::NoWorkLeft,
                Err(e @ Error::LineTooLong { .. }) => {
                    tracing::error!(
                        "Cannot read grants from the allocator: {e}; \
                         raise the line limit to match the allocator's"
                    );
                    break ExitReason::LineLimitExceeded;
                }
                Err(e) => {
                    drop(guard);
                    self.abandon_cycle(&e).await;
                }
            }
        };

        tracing::info!(
            chunks_searched,
            %keys_tested,
            "Worker stopped: {exit_reason}"
        );

        WorkerSummary {
            chunks_searched,
            keys_tested,
            found,
            exit_reason,
        }
    }

    /// Requests, sweeps, and reports one chunk. Must run inside the critical
    /// section.
    async fn cycle(&self) -> Result<Cycle> {
        let grant = self.client.request_chunk(self.chunk_size).await?;
        if grant.chunk.is_empty() {
            tracing::debug!("Received an empty grant");
            return Ok(Cycle::NoWork);
        }

        tracing::info!(
            start = %grant.chunk.start,
            size = grant.chunk.size,
            "Searching chunk"
        );

        let outcome = self.search(grant).await?;
        match outcome.found() {
            Some(key) => tracing::info!("Found the key: {key}"),
            None => tracing::debug!(tested = outcome.tested(), "Chunk exhausted"),
        }

        self.client.report(&outcome).await?;
        Ok(Cycle::Searched(outcome))
    }

    async fn search(&self, grant: ChunkGrant) -> Result<SearchOutcome> {
        let ciphertext = match decode_ciphertext(&grant.ciphertext) {
            Ok(ciphertext) => ciphertext,
            Err(e) => {
                // No key can match an undecodable ciphertext.
                tracing::warn!("Ciphertext {:?} is not base64: {e}", grant.ciphertext);
                return Ok(SearchOutcome::Exhausted { tested: 0 });
            }
        };
        // Grant parsing already checked the width.
        let key_space = KeySpace::new(grant.key_width)?;

        let search = ChunkSearch::new(grant.chunk, key_space, ciphertext);
        let tester = Arc::clone(&self.tester);
        let outcome = tokio::task::spawn_blocking(move || search.run(&*tester)).await?;
        Ok(outcome)
    }

    async fn abandon_cycle(&self, error: &Error) {
        if error.is_transient() {
            tracing::debug!("Abandoning cycle: {error}");
        } else {
            tracing::warn!("Abandoning cycle: {error}");
        }
        tokio::time::sleep(self.retry_delay).await;
    }
}
