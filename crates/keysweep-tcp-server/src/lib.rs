//! The keysweep allocator.
//!
//! Owns the single [`ChunkAllocator`](keysweep_tcp_core::keysweep::ChunkAllocator)
//! of a run and serves it to workers over the keysweep line protocol, one task
//! per connection. The run ends when a worker reports the key or when the
//! operator interrupts the process. An exhausted key-space does not end it:
//! the allocator keeps answering that no work is left until it is stopped.

pub mod server;

pub use server::{AllocatorServer, RunSummary, config::ServerConfig};
