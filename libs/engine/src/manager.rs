use std::sync::Arc;

use anyhow::Context as _;
use tbft_roles::validator::{Block, BlockHash, Height};

use crate::{
    metrics::ENGINE_INTERFACE, BlockCommitter, BlockProposer, BlockVerifier, LedgerCache,
    VerifyError, VerifyMode,
};

/// Bundle of the execution layer collaborators, instrumented with metrics.
/// Cheap to clone, so that calls can be made from spawned tasks.
#[derive(Debug, Clone)]
pub struct EngineManager {
    proposer: Arc<dyn BlockProposer>,
    verifier: Arc<dyn BlockVerifier>,
    committer: Arc<dyn BlockCommitter>,
    ledger: Arc<dyn LedgerCache>,
}

impl EngineManager {
    /// Constructs an `EngineManager`.
    pub fn new(
        proposer: Arc<dyn BlockProposer>,
        verifier: Arc<dyn BlockVerifier>,
        committer: Arc<dyn BlockCommitter>,
        ledger: Arc<dyn LedgerCache>,
    ) -> Self {
        Self {
            proposer,
            verifier,
            committer,
            ledger,
        }
    }

    /// Constructs an `EngineManager` from a single object implementing all the interfaces.
    pub fn from_engine<E>(engine: Arc<E>) -> Self
    where
        E: BlockProposer + BlockVerifier + BlockCommitter + LedgerCache,
    {
        Self::new(engine.clone(), engine.clone(), engine.clone(), engine)
    }

    /// Ledger cache.
    pub fn ledger(&self) -> &dyn LedgerCache {
        &*self.ledger
    }

    /// Last committed block.
    pub fn last_committed_block(&self) -> Block {
        self.ledger.last_committed_block()
    }

    /// Builds a block for the given height.
    pub async fn create_block(&self, height: Height, pre_hash: BlockHash) -> anyhow::Result<Block> {
        let t = ENGINE_INTERFACE.create_block_latency.start();
        let block = self
            .proposer
            .create_block(height, pre_hash)
            .await
            .context("create_block()")?;
        anyhow::ensure!(
            block.height == height,
            "proposer built a block at height {}, want {height}",
            block.height
        );
        t.observe();
        Ok(block)
    }

    /// Verifies a proposed block.
    pub async fn verify_block(&self, block: &Block, mode: VerifyMode) -> Result<(), VerifyError> {
        let t = ENGINE_INTERFACE.verify_block_latency.start();
        let res = self.verifier.verify_block(block, mode).await;
        t.observe();
        if let Err(err) = &res {
            ENGINE_INTERFACE.rejected_blocks.inc();
            tracing::warn!(height = %block.height, hash = %block.hash(), "block rejected: {err:#}");
        }
        res
    }

    /// Persists a decided block.
    /// Blocks at or below the last committed height are ignored.
    pub async fn add_block(&self, block: Block) -> anyhow::Result<()> {
        let last = self.ledger.current_height().context("current_height()")?;
        if block.height <= last {
            tracing::debug!(height = %block.height, "block already committed");
            return Ok(());
        }
        let height = block.height;
        let t = ENGINE_INTERFACE.add_block_latency.start();
        self.committer
            .add_block(block)
            .await
            .context("add_block()")?;
        t.observe();
        ENGINE_INTERFACE.committed_height.set(height.0);
        Ok(())
    }
}
