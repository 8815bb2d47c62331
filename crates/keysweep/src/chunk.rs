use core::ops::Range;

/// A contiguous run of keys handed to one worker for one work cycle.
///
/// A chunk of size zero carries no work; it is what the allocator returns once
/// the key-space is exhausted or the key has been found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    /// First key of the chunk.
    pub start: u128,
    /// Number of keys in the chunk.
    pub size: u64,
}

impl Chunk {
    pub const fn new(start: u128, size: u64) -> Self {
        Self { start, size }
    }

    /// An empty chunk positioned at `start`.
    pub const fn empty(start: u128) -> Self {
        Self { start, size: 0 }
    }

    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// One past the last key of the chunk.
    pub const fn end(&self) -> u128 {
        self.start + self.size as u128
    }

    /// The keys covered by this chunk, in ascending order.
    pub const fn keys(&self) -> Range<u128> {
        self.start..self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_follow_start_and_size() {
        let chunk = Chunk::new(10, 5);
        assert_eq!(chunk.end(), 15);
        assert_eq!(chunk.keys().collect::<Vec<_>>(), vec![10, 11, 12, 13, 14]);
        assert!(!chunk.is_empty());
    }

    #[test]
    fn empty_chunk_has_no_keys() {
        let chunk = Chunk::empty(16);
        assert!(chunk.is_empty());
        assert_eq!(chunk.keys().count(), 0);
        assert_eq!(chunk.end(), 16);
    }
}
