use std::fmt;

use tbft_roles::validator::{Block, BlockHash, Height, TxId};

/// Context in which a block is verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VerifyMode {
    /// Block proposed in a consensus round, not decided yet.
    Consensus,
    /// Block already decided by the network, fetched during synchronization.
    Sync,
}

/// Error returned by [`BlockVerifier::verify_block`].
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Block contains transactions which the verifier considers invalid.
    /// Their ids get reported in the prevote of the verifying node.
    #[error("block contains {} invalid transactions", .0.len())]
    InvalidTxs(Vec<TxId>),
    /// Block is invalid.
    #[error(transparent)]
    Invalid(#[from] anyhow::Error),
}

/// Builds blocks when the local node is the proposer.
#[async_trait::async_trait]
pub trait BlockProposer: 'static + fmt::Debug + Send + Sync {
    /// Builds a block at `height` on top of the block with hash `pre_hash`.
    /// Called only when the local node is the proposer of the current round.
    async fn create_block(&self, height: Height, pre_hash: BlockHash) -> anyhow::Result<Block>;
}

/// Checks proposed blocks.
#[async_trait::async_trait]
pub trait BlockVerifier: 'static + fmt::Debug + Send + Sync {
    /// Verifies the block. Called on receipt of a proposal, before prevoting.
    async fn verify_block(&self, block: &Block, mode: VerifyMode) -> Result<(), VerifyError>;
}

/// Persists decided blocks.
#[async_trait::async_trait]
pub trait BlockCommitter: 'static + fmt::Debug + Send + Sync {
    /// Persists a decided block and updates the ledger cache.
    /// Called once per height on commit; retried with the same block on failure,
    /// so it has to be idempotent for the same height.
    async fn add_block(&self, block: Block) -> anyhow::Result<()>;
}

/// Cache of the last committed block, shared between consensus and the committer.
pub trait LedgerCache: 'static + fmt::Debug + Send + Sync {
    /// Last committed block.
    fn last_committed_block(&self) -> Block;
    /// Replaces the last committed block.
    fn set_last_committed_block(&self, block: Block);
    /// Height of the last committed block.
    fn current_height(&self) -> anyhow::Result<Height>;
}
