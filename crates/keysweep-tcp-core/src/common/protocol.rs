//! The line protocol spoken between workers and the allocator.
//!
//! Every message is a single line of ASCII text. Workers send [`Request`]s;
//! the allocator answers work-left queries and work requests with a
//! [`Response`] line and stays silent on reports.
//!
//! | Request              | Line                              | Response                  |
//! |----------------------|-----------------------------------|---------------------------|
//! | work-left query      | `Work_Left?`                      | `true` / `false`          |
//! | work request         | `Requesting Work: <n>`            | a [`ChunkGrant`] line     |
//! | found report         | `Key Found: <key>, <hex>`         | connection closed         |
//! | not-found report     | `Key Not Found: `                 | none                      |
//! | anything else        |                                   | `Error: <reason>`         |

use crate::{Error, Result};
use keysweep::{Chunk, FoundKey, KeySpace, Target};

pub const WORK_LEFT: &str = "Work_Left?";
pub const REQUEST_WORK: &str = "Requesting Work: ";
pub const KEY_FOUND: &str = "Key Found: ";
pub const KEY_NOT_FOUND: &str = "Key Not Found: ";

pub const GRANT_INITIAL_KEY: &str = "InitialKey: ";
pub const GRANT_CHUNK_SIZE: &str = "ChunkSize: ";
pub const GRANT_KEY_SIZE: &str = "KeySize: ";
pub const GRANT_CIPHERTEXT: &str = "CipherText: ";
pub const ERROR: &str = "Error: ";

/// A message sent by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Ask for a chunk of at most `size` keys.
    RequestWork { size: u64 },
    /// Ask whether any work remains.
    WorkLeft,
    /// Report the matching key.
    KeyFound(FoundKey),
    /// Report that a chunk held no match.
    KeyNotFound,
}

impl Request {
    /// Renders the request as a line, without the terminator.
    pub fn to_line(&self) -> String {
        match self {
            Self::RequestWork { size } => format!("{REQUEST_WORK}{size}"),
            Self::WorkLeft => WORK_LEFT.to_owned(),
            Self::KeyFound(found) => format!("{KEY_FOUND}{}, {}", found.key(), found.hex()),
            Self::KeyNotFound => KEY_NOT_FOUND.to_owned(),
        }
    }

    /// Parses a request line. Rules are tried in priority order: work
    /// request, work-left query, found report, not-found report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] for unknown messages and for known
    /// messages with unparseable arguments.
    pub fn from_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(size) = line.strip_prefix(REQUEST_WORK) {
            let size = size.trim().parse::<u64>().map_err(|_| {
                Error::malformed(format!(
                    "work request size {size:?} is not a non-negative integer"
                ))
            })?;
            return Ok(Self::RequestWork { size });
        }

        if line.trim().eq_ignore_ascii_case(WORK_LEFT) {
            return Ok(Self::WorkLeft);
        }

        if let Some(report) = line.strip_prefix(KEY_FOUND) {
            return parse_found(report).map(Self::KeyFound);
        }

        if line
            .trim_end()
            .eq_ignore_ascii_case(KEY_NOT_FOUND.trim_end())
        {
            return Ok(Self::KeyNotFound);
        }

        Err(Error::malformed(format!("unrecognised request {line:?}")))
    }
}

fn parse_found(report: &str) -> Result<FoundKey> {
    let (key, hex) = report
        .split_once(',')
        .ok_or_else(|| Error::malformed(format!("found report {report:?} lacks a hex key")))?;

    let key = key
        .trim()
        .parse::<u128>()
        .map_err(|_| Error::malformed(format!("found key {key:?} is not an integer")))?;

    let hex = hex.trim();
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::malformed(format!(
            "found key hex {hex:?} is not hexadecimal"
        )));
    }

    Ok(FoundKey::from_parts(key, hex))
}

/// The allocator's answer to a work request: a chunk plus the target it
/// belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGrant {
    pub chunk: Chunk,
    pub key_width: usize,
    pub ciphertext: String,
}

impl ChunkGrant {
    pub fn new(chunk: Chunk, target: &Target) -> Self {
        Self {
            chunk,
            key_width: target.key_width(),
            ciphertext: target.ciphertext().to_owned(),
        }
    }

    /// Length of the longest grant line a run over keys of `key_width` bytes
    /// and `ciphertext` can produce, without the terminator.
    pub fn max_line_length(key_width: usize, ciphertext: &str) -> usize {
        const SEPARATORS: usize = 3;

        GRANT_INITIAL_KEY.len()
            + digits(u128::MAX)
            + GRANT_CHUNK_SIZE.len()
            + digits(u128::from(u64::MAX))
            + GRANT_KEY_SIZE.len()
            + digits(key_width as u128)
            + GRANT_CIPHERTEXT.len()
            + ciphertext.len()
            + SEPARATORS
    }

    pub fn to_line(&self) -> String {
        format!(
            "{GRANT_INITIAL_KEY}{}\t{GRANT_CHUNK_SIZE}{}\t{GRANT_KEY_SIZE}{}\t{GRANT_CIPHERTEXT}{}",
            self.chunk.start, self.chunk.size, self.key_width, self.ciphertext
        )
    }

    /// Parses a grant line. A trailing tab is tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] if the allocator answered with an error
    /// line and [`Error::Malformed`] if the line is not a grant, names an
    /// unsupported key width, or describes a chunk running past the end of
    /// its key-space.
    pub fn from_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        rejection(line)?;

        let mut fields = line.split('\t').filter(|field| !field.is_empty());
        let mut field = |prefix: &str| {
            fields
                .next()
                .and_then(|field| field.strip_prefix(prefix))
                .ok_or_else(|| Error::malformed(format!("grant {line:?} lacks {prefix:?}")))
        };

        let start = field(GRANT_INITIAL_KEY)?;
        let size = field(GRANT_CHUNK_SIZE)?;
        let key_width = field(GRANT_KEY_SIZE)?;
        let ciphertext = field(GRANT_CIPHERTEXT)?;

        let start = start
            .trim()
            .parse::<u128>()
            .map_err(|_| Error::malformed(format!("grant start {start:?} is not an integer")))?;
        let size = size
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::malformed(format!("grant size {size:?} is not an integer")))?;
        let key_width = key_width.trim().parse::<usize>().map_err(|_| {
            Error::malformed(format!("grant key size {key_width:?} is not an integer"))
        })?;

        let key_space = KeySpace::new(key_width)
            .map_err(|e| Error::malformed(format!("grant key size {key_width}: {e}")))?;
        let in_range = start
            .checked_add(u128::from(size))
            .is_some_and(|end| end <= key_space.total_keys());
        if !in_range {
            return Err(Error::malformed(format!(
                "grant of {size} keys from {start} overruns a key-space of {} keys",
                key_space.total_keys()
            )));
        }

        Ok(Self {
            chunk: Chunk::new(start, size),
            key_width,
            ciphertext: ciphertext.to_owned(),
        })
    }
}

/// A message sent by the allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    WorkLeft(bool),
    Grant(ChunkGrant),
    Error(String),
}

impl Response {
    pub fn to_line(&self) -> String {
        match self {
            Self::WorkLeft(left) => left.to_string(),
            Self::Grant(grant) => grant.to_line(),
            Self::Error(reason) => format!("{ERROR}{reason}"),
        }
    }
}

/// Parses the answer to a work-left query.
///
/// # Errors
///
/// Returns [`Error::Rejected`] for an error line and [`Error::Malformed`] for
/// anything other than a boolean token.
pub fn parse_work_left(line: &str) -> Result<bool> {
    let line = line.trim();
    rejection(line)?;

    if line.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if line.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::malformed(format!(
            "work-left answer {line:?} is not a boolean"
        )))
    }
}

fn digits(n: u128) -> usize {
    n.checked_ilog10().map_or(1, |d| d as usize + 1)
}

fn rejection(line: &str) -> Result<()> {
    match line.strip_prefix(ERROR) {
        Some(reason) => Err(Error::Rejected {
            reason: reason.to_owned(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_work_requests() {
        assert_eq!(
            Request::from_line("Requesting Work: 1000000").unwrap(),
            Request::RequestWork { size: 1_000_000 }
        );
        assert_eq!(
            Request::from_line("Requesting Work: 5\r\n").unwrap(),
            Request::RequestWork { size: 5 }
        );
    }

    #[test]
    fn rejects_bad_work_sizes() {
        for line in [
            "Requesting Work: ",
            "Requesting Work: lots",
            "Requesting Work: -5",
        ] {
            let err = Request::from_line(line).unwrap_err();
            assert!(matches!(err, Error::Malformed { .. }), "{line}: {err}");
        }
    }

    #[test]
    fn work_left_is_case_insensitive() {
        assert_eq!(Request::from_line("Work_Left?").unwrap(), Request::WorkLeft);
        assert_eq!(Request::from_line("work_left?").unwrap(), Request::WorkLeft);
    }

    #[test]
    fn parses_reports() {
        assert_eq!(
            Request::from_line("Key Found: 123456, 0001e240").unwrap(),
            Request::KeyFound(FoundKey::from_parts(123_456, "0001e240"))
        );
        assert_eq!(
            Request::from_line("Key Not Found: ").unwrap(),
            Request::KeyNotFound
        );
        assert_eq!(
            Request::from_line("key not found:").unwrap(),
            Request::KeyNotFound
        );
    }

    #[test]
    fn rejects_bad_found_reports() {
        for line in ["Key Found: 12", "Key Found: x, 0c", "Key Found: 12, zz"] {
            assert!(Request::from_line(line).is_err(), "{line}");
        }
    }

    #[test]
    fn rejects_unknown_requests() {
        let err = Request::from_line("GIVE ME KEYS").unwrap_err();
        assert!(err.to_string().contains("unrecognised request"));
    }

    #[test]
    fn request_lines_parse_back() {
        let requests = [
            Request::RequestWork { size: 42 },
            Request::WorkLeft,
            Request::KeyFound(FoundKey::from_parts(7, "00000007")),
            Request::KeyNotFound,
        ];
        for request in requests {
            assert_eq!(Request::from_line(&request.to_line()).unwrap(), request);
        }
    }

    #[test]
    fn grant_round_trips() {
        let space = KeySpace::new(6).unwrap();
        let target = Target::new(space, "AbC+/9==");
        let grant = ChunkGrant::new(Chunk::new(281_474_976_710_000, 655), &target);

        let line = grant.to_line();
        assert_eq!(
            line,
            "InitialKey: 281474976710000\tChunkSize: 655\tKeySize: 6\tCipherText: AbC+/9=="
        );
        assert_eq!(ChunkGrant::from_line(&line).unwrap(), grant);
    }

    #[test]
    fn grant_tolerates_trailing_tab() {
        let grant =
            ChunkGrant::from_line("InitialKey: 10\tChunkSize: 5\tKeySize: 4\tCipherText: xyz\t\r\n")
                .unwrap();
        assert_eq!(grant.chunk, Chunk::new(10, 5));
        assert_eq!(grant.key_width, 4);
        assert_eq!(grant.ciphertext, "xyz");
    }

    #[test]
    fn grant_surfaces_rejections() {
        let err = ChunkGrant::from_line("Error: allocator is busy").unwrap_err();
        assert!(matches!(err, Error::Rejected { reason } if reason == "allocator is busy"));

        let err = ChunkGrant::from_line("InitialKey: 10\tChunkSize: 5").unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn grant_rejects_chunks_past_the_key_space() {
        let near_max = u128::MAX - 1;
        for line in [
            format!("InitialKey: {near_max}\tChunkSize: 5\tKeySize: 56\tCipherText: xyz"),
            "InitialKey: 4294967295\tChunkSize: 2\tKeySize: 4\tCipherText: xyz".to_owned(),
            "InitialKey: 0\tChunkSize: 5\tKeySize: 57\tCipherText: xyz".to_owned(),
        ] {
            let err = ChunkGrant::from_line(&line).unwrap_err();
            assert!(matches!(err, Error::Malformed { .. }), "{line}: {err}");
        }

        // The last key of a 32-bit space is still grantable.
        let grant =
            ChunkGrant::from_line("InitialKey: 4294967295\tChunkSize: 1\tKeySize: 4\tCipherText: xyz")
                .unwrap();
        assert_eq!(grant.chunk.end(), 1 << 32);
    }

    #[test]
    fn longest_grant_fits_the_computed_length() {
        let ciphertext = "AbC+/9==";
        let target = Target::new(KeySpace::new(56).unwrap(), ciphertext);
        let grant = ChunkGrant::new(Chunk::new(u128::MAX, u64::MAX), &target);

        assert_eq!(
            grant.to_line().len(),
            ChunkGrant::max_line_length(56, ciphertext)
        );
        assert_eq!(ChunkGrant::max_line_length(4, ""), 107);
    }

    #[test]
    fn responses_render_as_lines() {
        assert_eq!(Response::WorkLeft(true).to_line(), "true");
        assert_eq!(Response::WorkLeft(false).to_line(), "false");
        assert_eq!(
            Response::Error("bad request".into()).to_line(),
            "Error: bad request"
        );
    }

    #[test]
    fn parses_work_left_answers() {
        assert!(parse_work_left("true").unwrap());
        assert!(!parse_work_left("false\r").unwrap());
        assert!(matches!(
            parse_work_left("Error: nope"),
            Err(Error::Rejected { .. })
        ));
        assert!(matches!(
            parse_work_left("maybe"),
            Err(Error::Malformed { .. })
        ));
    }
}
