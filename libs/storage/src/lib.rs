//! Write-ahead log of the consensus engine.
//!
//! The log is an append-only sequence of [`WalEntry`] records covering the
//! height being decided. The engine appends every accepted message, every
//! verification outcome and every fired timeout before acting on it, and
//! replays the log at startup to rebuild its state. Once a height is
//! committed, the log is compacted to a single [`WalEntry::Checkpoint`].
mod file;
mod metrics;
pub mod proto;
pub mod testonly;
mod types;

pub use crate::{
    file::FileWal,
    types::{NoopWal, Wal, WalEntry, WalError, WalWriteMode},
};
