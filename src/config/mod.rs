//! Configuration management
//!
//! Command lines are parsed by [`Invocation`], merged with an optional
//! [`FileConfig`], and validated into the [`Parameters`] every stage reads.

mod cli;
mod file;
mod params;

pub use cli::{Cli, CliCommand, CommonArgs, Invocation, RmArgs, SyncArgs, TransferArgs};
pub use file::{exit_code, FileConfig};
pub use params::{
    Command, Grant, GrantPermission, Parameters, RequestOptions, SyncOptions, DEFAULT_PAGE_SIZE,
    STREAM_PATH,
};
