//! Per-connection request/response loop.
//!
//! Each accepted connection is served by [`handle_connection`] on its own
//! task. The protocol is strictly half-duplex: read one request line,
//! dispatch it against the shared allocator, write at most one response line,
//! repeat. The loop ends when the peer closes the stream, reports the key,
//! breaks the framing, or the run is shut down while the connection is idle.

use crate::server::state::RunState;
use keysweep_tcp_core::{
    Error,
    codec::LineStream,
    protocol::{ChunkGrant, Request, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::io::{AsyncRead, AsyncWrite};

/// What the connection loop does after dispatching a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Write this response and keep serving.
    Respond(Response),
    /// Keep serving without writing anything.
    Continue,
    /// Close the connection.
    Close,
}

/// Serves one worker connection until it ends.
///
/// Never fails: I/O and framing errors are logged and close this connection
/// only.
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, state: Arc<RunState>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = LineStream::new(stream, state.max_line_length);

    loop {
        // Shutdown only interrupts the wait for a request, never a response
        // that is already being written.
        let next = tokio::select! {
            biased;
            () = state.shutdown.cancelled() => {
                tracing::debug!(%peer, "Closing idle connection on shutdown");
                break;
            }
            next = lines.read_line() => next,
        };

        let dispatched = match next {
            Ok(Some(line)) => {
                tracing::debug!(%peer, request = %line, "Received request");
                dispatch(&line, &state)
            }
            Ok(None) => {
                // Liveness probes connect and close without sending anything.
                tracing::trace!(%peer, "Peer closed the connection");
                break;
            }
            // An undecodable line is answered like any other bad request.
            Err(e @ Error::Malformed { .. }) => {
                tracing::warn!(%peer, "Rejecting request: {e}");
                Dispatch::Respond(Response::Error(e.to_string()))
            }
            Err(e @ Error::LineTooLong { .. }) => {
                tracing::warn!(%peer, "Dropping connection: {e}");
                break;
            }
            Err(e) => {
                tracing::debug!(%peer, "Connection failed: {e}");
                break;
            }
        };

        match dispatched {
            Dispatch::Respond(response) => {
                let response = response.to_line();
                tracing::debug!(%peer, %response, "Responding");
                if let Err(e) = lines.write_line(&response).await {
                    tracing::debug!(%peer, "Failed to respond: {e}");
                    break;
                }
            }
            Dispatch::Continue => {}
            Dispatch::Close => break,
        }
    }
}

/// Applies one request line to the shared run state.
///
/// Malformed and unknown requests are answered with an error line; they never
/// end the connection or the run.
pub fn dispatch(line: &str, state: &RunState) -> Dispatch {
    let allocator = &state.allocator;

    match Request::from_line(line) {
        Ok(Request::RequestWork { size }) => {
            let chunk = allocator.allocate(size);
            tracing::debug!(start = %chunk.start, size = chunk.size, "Granting chunk");
            Dispatch::Respond(Response::Grant(ChunkGrant::new(
                chunk,
                allocator.target(),
            )))
        }
        Ok(Request::WorkLeft) => Dispatch::Respond(Response::WorkLeft(allocator.has_work())),
        Ok(Request::KeyFound(key)) => {
            state.record_found(key);
            Dispatch::Close
        }
        Ok(Request::KeyNotFound) => {
            if !allocator.is_found() {
                allocator.report_not_found();
            }
            Dispatch::Continue
        }
        Err(e) => {
            tracing::warn!("Rejecting request: {e}");
            Dispatch::Respond(Response::Error(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keysweep_tcp_core::keysweep::{Chunk, ChunkAllocator, FoundKey, KeySpace, Target};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};
    use tokio_util::sync::CancellationToken;

    fn state(total_keys: u128) -> Arc<RunState> {
        let space = KeySpace::new(4).unwrap().truncated(total_keys);
        let allocator = ChunkAllocator::new(Target::new(space, "Y2lwaGVy"), 0).unwrap();
        Arc::new(RunState::new(
            Arc::new(allocator),
            CancellationToken::new(),
            256,
        ))
    }

    fn grant(dispatch: Dispatch) -> ChunkGrant {
        match dispatch {
            Dispatch::Respond(Response::Grant(grant)) => grant,
            other => panic!("expected a grant, got {other:?}"),
        }
    }

    #[test]
    fn grants_chunks_in_order() {
        let state = state(16);

        let first = grant(dispatch("Requesting Work: 5", &state));
        assert_eq!(first.chunk, Chunk::new(0, 5));
        assert_eq!(first.key_width, 4);
        assert_eq!(first.ciphertext, "Y2lwaGVy");

        assert_eq!(
            grant(dispatch("Requesting Work: 20", &state)).chunk,
            Chunk::new(5, 11)
        );
        assert_eq!(
            grant(dispatch("Requesting Work: 20", &state)).chunk,
            Chunk::new(16, 0)
        );
    }

    #[test]
    fn answers_work_left() {
        let state = state(4);
        assert_eq!(
            dispatch("Work_Left?", &state),
            Dispatch::Respond(Response::WorkLeft(true))
        );

        dispatch("Requesting Work: 4", &state);
        assert_eq!(
            dispatch("Work_Left?", &state),
            Dispatch::Respond(Response::WorkLeft(false))
        );
    }

    #[test]
    fn found_report_closes_and_ends_the_run() {
        let state = state(1_000);
        dispatch("Requesting Work: 10", &state);

        assert_eq!(dispatch("Key Found: 7, 00000007", &state), Dispatch::Close);
        assert!(state.shutdown.is_cancelled());
        assert_eq!(
            state.found().map(|f| f.key.clone()),
            Some(FoundKey::from_parts(7, "00000007"))
        );

        // A worker still polling sees no work.
        assert_eq!(
            dispatch("Work_Left?", &state),
            Dispatch::Respond(Response::WorkLeft(false))
        );
        assert!(grant(dispatch("Requesting Work: 10", &state)).chunk.is_empty());
    }

    #[test]
    fn not_found_reports_are_silent() {
        let state = state(1_000);
        assert_eq!(dispatch("Key Not Found: ", &state), Dispatch::Continue);
        assert_eq!(state.allocator.stats().not_found_reports, 1);
    }

    #[test]
    fn malformed_requests_get_an_error_line() {
        let state = state(1_000);
        for line in ["Requesting Work: many", "hello", ""] {
            match dispatch(line, &state) {
                Dispatch::Respond(Response::Error(reason)) => assert!(!reason.is_empty()),
                other => panic!("{line:?}: expected an error response, got {other:?}"),
            }
        }
        assert_eq!(state.allocator.cursor(), 0);
    }

    #[tokio::test]
    async fn serves_requests_until_the_peer_closes() {
        let state = state(16);
        let (client, server) = duplex(1024);
        let handler = tokio::spawn(handle_connection(
            server,
            "127.0.0.1:9".parse().unwrap(),
            Arc::clone(&state),
        ));

        let (read, mut write) = tokio::io::split(client);
        let mut read = BufReader::new(read).lines();

        write.write_all(b"Work_Left?\r\n").await.unwrap();
        assert_eq!(read.next_line().await.unwrap().unwrap(), "true");

        write.write_all(b"bogus\n").await.unwrap();
        assert!(read.next_line().await.unwrap().unwrap().starts_with("Error: "));

        write.write_all(b"Requesting Work: 5\n").await.unwrap();
        assert_eq!(
            read.next_line().await.unwrap().unwrap(),
            "InitialKey: 0\tChunkSize: 5\tKeySize: 4\tCipherText: Y2lwaGVy"
        );

        write.shutdown().await.unwrap();
        drop(write);
        handler.await.unwrap();
        assert_eq!(read.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn non_utf8_requests_get_an_error_line() {
        let state = state(16);
        let (client, server) = duplex(1024);
        let handler = tokio::spawn(handle_connection(
            server,
            "127.0.0.1:9".parse().unwrap(),
            Arc::clone(&state),
        ));

        let (read, mut write) = tokio::io::split(client);
        let mut read = BufReader::new(read).lines();

        write.write_all(b"Work_Left\xff?\n").await.unwrap();
        let reply = read.next_line().await.unwrap().unwrap();
        assert!(reply.starts_with("Error: "), "{reply}");

        write.write_all(b"Work_Left?\n").await.unwrap();
        assert_eq!(read.next_line().await.unwrap().unwrap(), "true");

        write.shutdown().await.unwrap();
        handler.await.unwrap();
    }

    #[tokio::test]
    async fn idle_connections_close_on_shutdown() {
        let state = state(16);
        let (_client, server) = duplex(1024);
        let handler = tokio::spawn(handle_connection(
            server,
            "127.0.0.1:9".parse().unwrap(),
            Arc::clone(&state),
        ));

        state.shutdown.cancel();
        handler.await.unwrap();
    }
}
