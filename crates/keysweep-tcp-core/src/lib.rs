//! Shared pieces of the keysweep allocator and worker binaries: the line
//! protocol spoken between them, its framing over TCP, the unified error type
//! and telemetry setup.

mod common;
pub use common::*;
// Public re-export so downstream crates can access `keysweep` via
// `keysweep_tcp_core::keysweep`
pub use keysweep;
