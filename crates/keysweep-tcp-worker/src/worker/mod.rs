//! Worker internals.
//!
//! ## Structure
//!
//! - [`config`] - Command-line arguments and the validated [`WorkerConfig`].
//! - [`client`] - One-shot protocol exchanges with the allocator.
//! - [`critical`] - The non-interruptible request-search-report window.
//! - [`blowfish`] - The Blowfish key tester.
//! - [`runner`] - The poll/search/report loop.
//!
//! [`WorkerConfig`]: config::WorkerConfig

pub mod blowfish;
pub mod client;
pub mod config;
pub mod critical;
pub mod runner;
