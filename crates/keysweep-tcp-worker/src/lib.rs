//! The keysweep worker.
//!
//! A worker repeatedly asks the allocator for a chunk of the key-space,
//! sweeps it with a [`KeyTester`](keysweep_tcp_core::keysweep::KeyTester)
//! and reports the outcome. It stops when the allocator goes away, when no
//! work is left, or when the operator asks it to, but never in the middle of
//! a chunk.

pub mod worker;

pub use worker::{
    blowfish::{BlowfishTester, DEFAULT_PLAINTEXT},
    client::AllocatorClient,
    config::WorkerConfig,
    critical::CriticalSection,
    runner::{ExitReason, Worker, WorkerSummary},
};
