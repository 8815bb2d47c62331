use core::fmt;

/// Diagnostic counters of a [`ChunkAllocator`](crate::ChunkAllocator).
///
/// Counters are read independently, so a snapshot taken while workers are
/// active may be slightly inconsistent. They never influence allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub cursor: u128,
    pub remaining: u128,
    pub chunks_granted: u64,
    pub keys_granted: u128,
    pub not_found_reports: u64,
    pub found: bool,
}

impl fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cursor={} remaining={} chunks={} keys={} misses={} found={}",
            self.cursor,
            self.remaining,
            self.chunks_granted,
            self.keys_granted,
            self.not_found_reports,
            self.found
        )
    }
}
