//! Line framing over any async byte stream.
//!
//! Both sides wrap their socket in a [`LineStream`]: a [`Framed`] transport
//! splitting on LF with [`AnyDelimiterCodec`]. A trailing CR is stripped, so
//! CRLF terminators work too, and a maximum line length stops a misbehaving
//! peer from making us buffer forever.
//!
//! Lines are decoded as UTF-8 after framing. A line that is not valid UTF-8
//! is reported as [`Error::Malformed`] and the stream stays usable, so the
//! peer can be answered and the next line read.

use crate::{Error, Result};
use core::time::Duration;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{AnyDelimiterCodec, Framed};

/// Default upper bound on a single protocol line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024;

/// Smallest line limit that still fits every fixed-size protocol message.
pub const MIN_LINE_LENGTH: usize = 128;

const LINE_FEED: u8 = b'\n';

/// A line-framed, bidirectional stream.
pub struct LineStream<T> {
    inner: Framed<T, AnyDelimiterCodec>,
    max_line_length: usize,
}

impl<T> LineStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T, max_line_length: usize) -> Self {
        Self {
            inner: Framed::new(
                io,
                AnyDelimiterCodec::new_with_max_length(
                    vec![LINE_FEED],
                    vec![LINE_FEED],
                    max_line_length,
                ),
            ),
            max_line_length,
        }
    }

    /// Reads the next line with its terminator stripped. Returns `None` once
    /// the peer has closed the stream.
    ///
    /// # Errors
    ///
    /// [`Error::Malformed`] for a line that is not UTF-8; the stream can still
    /// be read afterwards. [`Error::LineTooLong`] and [`Error::Io`] end the
    /// stream.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let frame = match self.inner.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(Error::from_codec(e, self.max_line_length)),
            None => return Ok(None),
        };

        let line: &[u8] = &frame;
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        core::str::from_utf8(line)
            .map(|line| Some(line.to_owned()))
            .map_err(|e| Error::malformed(format!("line is not valid UTF-8: {e}")))
    }

    /// Like [`Self::read_line`], but fails with [`Error::Timeout`] after
    /// `deadline` and with [`Error::ConnectionClosed`] on end of stream.
    pub async fn expect_line(&mut self, deadline: Duration) -> Result<String> {
        tokio::time::timeout(deadline, self.read_line())
            .await
            .map_err(|_| Error::Timeout(deadline))?
            .and_then(|line| line.ok_or(Error::ConnectionClosed))
    }

    /// Writes `line` followed by a line feed and flushes it.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        self.inner
            .send(line)
            .await
            .map_err(|e| Error::from_codec(e, self.max_line_length))
    }

    /// Flushes pending output and shuts down the write half.
    pub async fn close(&mut self) -> Result<()> {
        SinkExt::<&str>::close(&mut self.inner)
            .await
            .map_err(|e| Error::from_codec(e, self.max_line_length))
    }
}
