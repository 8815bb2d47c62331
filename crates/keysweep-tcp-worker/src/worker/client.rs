//! One-shot exchanges with the allocator.
//!
//! Every exchange opens a fresh connection, sends a single request, reads at
//! most one answer, and closes. No connection outlives a request, so a worker
//! never holds allocator resources while it is busy sweeping a chunk.

use crate::worker::config::WorkerConfig;
use core::time::Duration;
use keysweep_tcp_core::{
    Error, Result,
    codec::LineStream,
    keysweep::SearchOutcome,
    protocol::{ChunkGrant, Request, parse_work_left},
};
use tokio::net::TcpStream;

/// A handle to the allocator at a fixed address.
#[derive(Debug, Clone)]
pub struct AllocatorClient {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_line_length: usize,
}

impl AllocatorClient {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            max_line_length: config.max_line_length,
        }
    }

    async fn connect(&self) -> Result<LineStream<TcpStream>> {
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| Error::Timeout(self.connect_timeout))??;
        stream.set_nodelay(true)?;

        Ok(LineStream::new(stream, self.max_line_length))
    }

    /// Sends `request` and returns the answer line.
    async fn exchange(&self, request: &Request) -> Result<String> {
        let mut lines = self.connect().await?;
        lines.write_line(&request.to_line()).await?;
        let answer = lines.expect_line(self.read_timeout).await?;
        let _ = lines.close().await;
        Ok(answer)
    }

    /// Liveness probe: connects and immediately hangs up.
    pub async fn probe(&self) -> bool {
        match self.connect().await {
            Ok(mut lines) => {
                let _ = lines.close().await;
                true
            }
            Err(e) => {
                tracing::debug!("Allocator at {}:{} is unreachable: {e}", self.host, self.port);
                false
            }
        }
    }

    /// Asks whether any work remains.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors and on answers that are not a boolean.
    pub async fn work_left(&self) -> Result<bool> {
        let answer = self.exchange(&Request::WorkLeft).await?;
        parse_work_left(&answer)
    }

    /// Requests a chunk of at most `size` keys.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, on error answers, and on lines that are not a
    /// grant.
    pub async fn request_chunk(&self, size: u64) -> Result<ChunkGrant> {
        let answer = self.exchange(&Request::RequestWork { size }).await?;
        ChunkGrant::from_line(&answer)
    }

    /// Reports the outcome of a sweep. The allocator does not answer reports.
    ///
    /// # Errors
    ///
    /// Fails if the report could not be delivered.
    pub async fn report(&self, outcome: &SearchOutcome) -> Result<()> {
        let request = match outcome.found() {
            Some(key) => Request::KeyFound(key.clone()),
            None => Request::KeyNotFound,
        };

        let mut lines = self.connect().await?;
        lines.write_line(&request.to_line()).await?;
        lines.close().await
    }
}
