//! Accept loop and run lifecycle of the allocator.
//!
//! [`AllocatorServer::run`] accepts connections until the shutdown token is
//! cancelled, either by a found report or by the binary's signal handler.
//! Shutdown then proceeds in phases:
//!
//! 1. Stop accepting: the listener is dropped so new connections are refused.
//! 2. Drain: idle connections observe the token and close, busy ones finish
//!    their current response. Waiting is bounded by the shutdown timeout.
//! 3. Report: the [`RunSummary`] is returned to the caller.

use crate::server::{config::ServerConfig, connection::handle_connection, state::RunState};
use core::time::Duration;
use keysweep_tcp_core::{
    Result,
    keysweep::{AllocatorStats, ChunkAllocator, FoundKey},
};
use std::{io, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::Instrument;

/// Pause after a failed accept, so a persistent failure such as running out
/// of file descriptors does not spin the loop.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound allocator, ready to serve workers.
#[derive(Debug)]
pub struct AllocatorServer {
    listener: TcpListener,
    state: Arc<RunState>,
    tracker: TaskTracker,
    shutdown_timeout: Duration,
}

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The key reported by the winning worker, if any.
    pub found: Option<FoundKey>,
    /// Time from the first worker connection to the found report, or to the
    /// end of the run if nothing was found.
    pub elapsed: Option<Duration>,
    pub stats: AllocatorStats,
}

impl AllocatorServer {
    /// Builds the allocator and binds the listener.
    ///
    /// # Errors
    ///
    /// Fails if the configuration does not pass [`ServerConfig::validate`] or
    /// the address cannot be bound.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let allocator = Arc::new(config.allocator()?);
        let listener = TcpListener::bind(&config.listen).await?;

        let state = Arc::new(RunState::new(
            allocator,
            CancellationToken::new(),
            config.max_line_length,
        ));

        Ok(Self {
            listener,
            state,
            tracker: TaskTracker::new(),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// The address actually bound, with the ephemeral port resolved.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot report its address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn allocator(&self) -> Arc<ChunkAllocator> {
        Arc::clone(&self.state.allocator)
    }

    /// Token that ends the run when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Serves workers until the key is found or the token is cancelled.
    ///
    /// # Errors
    ///
    /// Fails only if the listener's address cannot be read; accept failures
    /// are logged and retried.
    pub async fn run(self) -> Result<RunSummary> {
        let Self {
            listener,
            state,
            tracker,
            shutdown_timeout,
        } = self;

        let addr = listener.local_addr()?;
        tracing::info!("Waiting for connections on {addr}");
        tracing::info!(
            "Searching {} keys of {} bytes starting at key {}",
            state.allocator.total_keys(),
            state.allocator.key_space().key_width(),
            state.allocator.cursor()
        );

        loop {
            let accepted = tokio::select! {
                biased;
                () = state.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    state.mark_contact();
                    tracing::debug!(%peer, "Accepted connection");

                    let span = tracing::debug_span!("connection", %peer);
                    tracker.spawn(
                        handle_connection(stream, peer, Arc::clone(&state)).instrument(span),
                    );
                }
                Err(e) => back_off_after_accept_error(&e).await,
            }
        }

        // Phase 1: refuse new connections.
        drop(listener);
        tracker.close();

        // Phase 2: let open connections finish.
        if tokio::time::timeout(shutdown_timeout, tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                "{} connections still open after {:?}, abandoning them",
                tracker.len(),
                shutdown_timeout
            );
        }

        // Phase 3: report.
        let found = state.found().cloned();
        let summary = RunSummary {
            elapsed: found.as_ref().map(|f| f.elapsed).or_else(|| state.elapsed()),
            found: found.map(|f| f.key),
            stats: state.allocator.stats(),
        };

        match &summary.found {
            Some(key) => tracing::info!("Run finished, key {key}"),
            None => tracing::info!("Run stopped without finding the key"),
        }
        tracing::info!("{}", summary.stats);

        Ok(summary)
    }
}

/// Logs a failed accept and waits [`ACCEPT_BACKOFF`] before the next one.
/// Open connections keep being served meanwhile.
async fn back_off_after_accept_error(error: &io::Error) {
    tracing::warn!(
        "Failed to accept connection: {error}, retrying in {:?}",
        ACCEPT_BACKOFF
    );
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use keysweep_tcp_core::keysweep::KeySpace;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use keysweep_tcp_core::Error;
    use std::time::Instant;
    use tokio::net::TcpStream;

    async fn server(total_keys: u128) -> AllocatorServer {
        let space = KeySpace::new(4).unwrap().truncated(total_keys);
        let mut config = ServerConfig::local(0, space, "Y2lwaGVy");
        config.shutdown_timeout = Duration::from_secs(1);
        AllocatorServer::bind(&config).await.unwrap()
    }

    async fn ask(stream: &mut BufReader<TcpStream>, line: &str) -> String {
        stream.get_mut().write_all(line.as_bytes()).await.unwrap();
        stream.get_mut().write_all(b"\n").await.unwrap();
        let mut answer = String::new();
        stream.read_line(&mut answer).await.unwrap();
        answer.trim_end().to_owned()
    }

    #[tokio::test]
    async fn serves_grants_and_stops_on_found() {
        let server = server(16).await;
        let addr = server.local_addr().unwrap();
        let run = tokio::spawn(server.run());

        let mut worker = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(ask(&mut worker, "Work_Left?").await, "true");
        assert_eq!(
            ask(&mut worker, "Requesting Work: 5").await,
            "InitialKey: 0\tChunkSize: 5\tKeySize: 4\tCipherText: Y2lwaGVy"
        );

        worker
            .get_mut()
            .write_all(b"Key Found: 3, 00000003\n")
            .await
            .unwrap();

        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary.found, Some(FoundKey::from_parts(3, "00000003")));
        assert!(summary.elapsed.is_some());
        assert!(summary.stats.found);
        assert_eq!(summary.stats.chunks_granted, 1);
        assert_eq!(summary.stats.keys_granted, 5);

        // The listener is gone once the run is over.
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn cancellation_ends_an_unfinished_run() {
        let server = server(1_000).await;
        let addr = server.local_addr().unwrap();
        let token = server.shutdown_token();
        let run = tokio::spawn(server.run());

        // An idle connection must not hold the run open.
        let mut worker = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(ask(&mut worker, "Work_Left?").await, "true");

        token.cancel();
        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary.found, None);
        assert!(!summary.stats.found);

        let mut rest = String::new();
        assert_eq!(worker.read_line(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn probes_and_garbage_do_not_disturb_the_run() {
        let server = server(16).await;
        let addr = server.local_addr().unwrap();
        let allocator = server.allocator();
        let token = server.shutdown_token();
        let run = tokio::spawn(server.run());

        // Liveness probe: connect and hang up.
        drop(TcpStream::connect(addr).await.unwrap());

        let mut worker = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert!(ask(&mut worker, "hello?").await.starts_with("Error: "));
        assert!(
            ask(&mut worker, "Requesting Work: 2")
                .await
                .starts_with("InitialKey: 0\t")
        );
        assert_eq!(allocator.cursor(), 2);

        token.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn exhausted_space_keeps_serving_until_cancelled() {
        let server = server(16).await;
        let addr = server.local_addr().unwrap();
        let token = server.shutdown_token();
        let run = tokio::spawn(server.run());

        let mut worker = BufReader::new(TcpStream::connect(addr).await.unwrap());
        ask(&mut worker, "Requesting Work: 16").await;
        assert_eq!(ask(&mut worker, "Work_Left?").await, "false");
        drop(worker);

        // Nobody is connected and nothing is left, yet the run goes on.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!run.is_finished());
        let mut late = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(ask(&mut late, "Work_Left?").await, "false");

        token.cancel();
        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary.found, None);
        assert_eq!(summary.stats.remaining, 0);
    }

    #[tokio::test]
    async fn accept_errors_pause_the_loop() {
        let started = Instant::now();
        back_off_after_accept_error(&io::Error::other("too many open files")).await;
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
    }

    #[tokio::test]
    async fn refuses_to_bind_when_a_grant_cannot_fit_a_line() {
        let config = ServerConfig::local(0, KeySpace::new(4).unwrap(), "A".repeat(9_000));
        let err = AllocatorServer::bind(&config).await.unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }), "{err}");
    }
}
