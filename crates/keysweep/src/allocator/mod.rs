mod stats;

pub use stats::*;

use portable_atomic::{AtomicBool, AtomicU64, AtomicU128, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Chunk, Error, KeySpace, Result, Target};

/// A lock-free chunk allocator shared by every connection of a run.
///
/// The allocator owns a single cursor: the next key that has not yet been
/// handed out. Each call to [`Self::allocate`] advances the cursor with one
/// compare-and-swap, so concurrent callers always receive disjoint ranges that
/// together cover the space without gaps.
///
/// Chunks are never re-issued. A worker that dies mid-chunk takes that part
/// of the key-space with it.
///
/// ## Features
/// - ✅ Thread-safe (`Send + Sync`, share it behind an `Arc`)
/// - ✅ Linearizable allocation
/// - ❌ Fair ordering between concurrent callers
#[derive(Debug)]
pub struct ChunkAllocator {
    cursor: AtomicU128,
    found: AtomicBool,
    target: Target,
    chunks_granted: AtomicU64,
    keys_granted: AtomicU128,
    not_found_reports: AtomicU64,
}

impl ChunkAllocator {
    /// Creates an allocator for `target` whose cursor starts at `initial_key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InitialKeyOutOfRange`] if `initial_key` is past the end
    /// of the target's key-space.
    pub fn new(target: Target, initial_key: u128) -> Result<Self> {
        let total = target.key_space().total_keys();
        if initial_key > total {
            return Err(Error::InitialKeyOutOfRange {
                initial: initial_key,
                total,
            });
        }

        Ok(Self {
            cursor: AtomicU128::new(initial_key),
            found: AtomicBool::new(false),
            target,
            chunks_granted: AtomicU64::new(0),
            keys_granted: AtomicU128::new(0),
            not_found_reports: AtomicU64::new(0),
        })
    }

    /// Returns `true` while unassigned keys remain and no worker has reported
    /// the key.
    pub fn has_work(&self) -> bool {
        !self.is_found() && self.cursor() < self.total_keys()
    }

    /// Carves the next chunk of at most `requested` keys off the key-space.
    ///
    /// The returned chunk starts at the cursor observed by this call and holds
    /// `min(requested, remaining)` keys. An empty chunk means there is nothing
    /// left to hand out, either because the space is exhausted or because the
    /// key has already been found; it is not an error.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn allocate(&self, requested: u64) -> Chunk {
        if self.is_found() {
            return Chunk::empty(self.cursor());
        }

        let total = self.total_keys();
        let mut size = 0;
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                size = (total - cursor).min(u128::from(requested)) as u64;
                (size > 0).then(|| cursor + u128::from(size))
            });

        let chunk = match previous {
            Ok(start) => Chunk::new(start, size),
            Err(start) => Chunk::empty(start),
        };

        if !chunk.is_empty() {
            self.chunks_granted.fetch_add(1, Ordering::Relaxed);
            self.keys_granted
                .fetch_add(u128::from(chunk.size), Ordering::Relaxed);
        }

        chunk
    }

    /// Marks the key as found.
    ///
    /// Idempotent. Returns `true` only for the call that performed the
    /// transition, so exactly one caller drives the shutdown of the run.
    /// Chunks already handed out stay valid, but no further chunks are
    /// granted.
    pub fn report_found(&self) -> bool {
        let first = !self.found.swap(true, Ordering::AcqRel);

        #[cfg(feature = "tracing")]
        if first {
            tracing::info!(cursor = %self.cursor(), "Key reported found, refusing further grants");
        }

        first
    }

    /// Records that a worker searched its chunk without success.
    ///
    /// Bookkeeping only: the cursor is never moved backwards.
    pub fn report_not_found(&self) {
        self.not_found_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_found(&self) -> bool {
        self.found.load(Ordering::Acquire)
    }

    /// The next key that has not been handed out.
    pub fn cursor(&self) -> u128 {
        self.cursor.load(Ordering::Acquire)
    }

    pub const fn total_keys(&self) -> u128 {
        self.target.key_space().total_keys()
    }

    /// Keys not yet handed out.
    pub fn remaining(&self) -> u128 {
        self.total_keys() - self.cursor()
    }

    pub const fn key_space(&self) -> KeySpace {
        self.target.key_space()
    }

    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// A point-in-time snapshot of the allocator's counters.
    pub fn stats(&self) -> AllocatorStats {
        let cursor = self.cursor();
        AllocatorStats {
            cursor,
            remaining: self.total_keys() - cursor,
            chunks_granted: self.chunks_granted.load(Ordering::Relaxed),
            keys_granted: self.keys_granted.load(Ordering::Relaxed),
            not_found_reports: self.not_found_reports.load(Ordering::Relaxed),
            found: self.is_found(),
        }
    }
}
