//! Key-space partitioning for distributed brute-force key searches.
//!
//! A run searches a fixed [`KeySpace`] for the key that decrypts a single
//! [`Target`]. One process owns a [`ChunkAllocator`] which carves the
//! remaining space into contiguous [`Chunk`]s on demand; any number of workers
//! sweep those chunks with a [`ChunkSearch`] driven by a pluggable
//! [`KeyTester`].
//!
//! ```
//! use keysweep::{ChunkAllocator, ChunkSearch, KeySpace, SearchOutcome, Target};
//!
//! let target = Target::new(KeySpace::new(4).unwrap(), "opaque");
//! let allocator = ChunkAllocator::new(target, 0).unwrap();
//!
//! let chunk = allocator.allocate(1_000);
//! let search = ChunkSearch::new(chunk, allocator.key_space(), Vec::new());
//! let outcome = search.run(&|key: &[u8], _: &[u8]| key == [0, 0, 0x01, 0x2c]);
//!
//! match outcome {
//!     SearchOutcome::Found { key, .. } => assert_eq!(key.hex(), "0000012c"),
//!     SearchOutcome::Exhausted { .. } => unreachable!(),
//! }
//! ```

mod allocator;
mod chunk;
mod error;
mod keyspace;
mod search;

pub use crate::allocator::*;
pub use crate::chunk::*;
pub use crate::error::*;
pub use crate::keyspace::*;
pub use crate::search::*;
