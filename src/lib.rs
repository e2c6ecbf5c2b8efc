//! # objsync - Object Storage Synchronization
//!
//! Copy, move, delete, and synchronize files between a local tree and an
//! object store, or between two locations in the store.
//!
//! Listings are lazy and sorted so the two sides of a `sync` can be
//! merge-joined without holding either in memory; transfers run
//! concurrently and report through a single result queue.

// Module declarations
pub mod commands;
pub mod config;
pub mod diff;
pub mod executor;
pub mod filter;
pub mod hash;
pub mod paths;
pub mod results;
pub mod scanner;
pub mod store;
pub mod transfer;
pub mod types;
pub mod ui;

// Re-export commonly used types
pub use commands::ActionArchitecture;
pub use config::{Command, Parameters, SyncOptions};
pub use results::CommandResult;
pub use types::{FileInfo, FileStats, Operation, PathKind, SyncError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
