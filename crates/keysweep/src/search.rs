use core::fmt;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Chunk, KeySpace};

/// Decides whether a candidate key decrypts the target.
///
/// Implementations must be pure: the same key and ciphertext always produce
/// the same answer. Keys are passed in their `key_width`-byte big-endian
/// encoding.
///
/// Any `Fn(&[u8], &[u8]) -> bool` closure is a tester, which keeps tests and
/// experiments free of boilerplate.
pub trait KeyTester: Send + Sync {
    fn is_match(&self, key: &[u8], ciphertext: &[u8]) -> bool;
}

impl<F> KeyTester for F
where
    F: Fn(&[u8], &[u8]) -> bool + Send + Sync,
{
    fn is_match(&self, key: &[u8], ciphertext: &[u8]) -> bool {
        self(key, ciphertext)
    }
}

/// A key that was reported as the match, with its hexadecimal rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FoundKey {
    key: u128,
    hex: String,
}

impl FoundKey {
    /// Builds the report for `key`, rendering it at the width of `key_space`.
    pub fn new(key: u128, key_space: &KeySpace) -> Self {
        Self {
            key,
            hex: key_space.key_hex(key),
        }
    }

    /// Builds the report from its already-rendered parts, as received from a
    /// peer.
    pub fn from_parts(key: u128, hex: impl Into<String>) -> Self {
        Self {
            key,
            hex: hex.into(),
        }
    }

    pub const fn key(&self) -> u128 {
        self.key
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for FoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{})", self.key, self.hex)
    }
}

/// Result of sweeping one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A key matched; the sweep stopped there.
    Found {
        key: FoundKey,
        /// Keys tested including the match.
        tested: u64,
    },
    /// Every key in the chunk was tested without a match.
    Exhausted { tested: u64 },
}

impl SearchOutcome {
    pub const fn tested(&self) -> u64 {
        match self {
            Self::Found { tested, .. } | Self::Exhausted { tested } => *tested,
        }
    }

    pub const fn found(&self) -> Option<&FoundKey> {
        match self {
            Self::Found { key, .. } => Some(key),
            Self::Exhausted { .. } => None,
        }
    }
}

/// An exhaustive, in-order sweep of a single chunk.
///
/// Owns everything it needs so it can be moved onto a blocking thread.
#[derive(Debug, Clone)]
pub struct ChunkSearch {
    chunk: Chunk,
    key_space: KeySpace,
    ciphertext: Vec<u8>,
}

impl ChunkSearch {
    pub fn new(chunk: Chunk, key_space: KeySpace, ciphertext: Vec<u8>) -> Self {
        Self {
            chunk,
            key_space,
            ciphertext,
        }
    }

    pub const fn chunk(&self) -> Chunk {
        self.chunk
    }

    /// Tests every key of the chunk in ascending order, stopping at the first
    /// match.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(start = %self.chunk.start, size = self.chunk.size)))]
    pub fn run<T>(&self, tester: &T) -> SearchOutcome
    where
        T: KeyTester + ?Sized,
    {
        let mut key_buf = vec![0; self.key_space.key_width()];
        let mut tested = 0;

        for key in self.chunk.keys() {
            self.key_space.encode_key(key, &mut key_buf);
            tested += 1;

            if tester.is_match(&key_buf, &self.ciphertext) {
                return SearchOutcome::Found {
                    key: FoundKey::new(key, &self.key_space),
                    tested,
                };
            }
        }

        SearchOutcome::Exhausted { tested }
    }
}
