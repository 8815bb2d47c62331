//! Allocator server internals.
//!
//! ## Structure
//!
//! - [`config`] - Command-line arguments and the validated [`ServerConfig`].
//! - [`listener`] - The accept loop and shutdown sequence ([`AllocatorServer`]).
//! - [`connection`] - The per-connection request/response loop.
//! - [`state`] - State shared by every connection of a run.
//!
//! [`ServerConfig`]: config::ServerConfig

pub mod config;
pub mod connection;
pub mod listener;
pub mod state;

pub use listener::{AllocatorServer, RunSummary};
