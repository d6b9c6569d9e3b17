//! Abstraction for interaction with the execution layer.
//!
//! Consensus doesn't build, execute or persist blocks itself. It drives the
//! collaborators defined here: a [`BlockProposer`] building blocks when the
//! local node is the proposer, a [`BlockVerifier`] checking proposed blocks,
//! a [`BlockCommitter`] persisting decided blocks, and a [`LedgerCache`]
//! holding the last committed block.
mod interface;
mod ledger;
mod manager;
mod metrics;
pub mod testonly;
#[cfg(test)]
mod tests;

pub use crate::{
    interface::{BlockCommitter, BlockProposer, BlockVerifier, LedgerCache, VerifyError, VerifyMode},
    ledger::LedgerCacheImpl,
    manager::EngineManager,
};
