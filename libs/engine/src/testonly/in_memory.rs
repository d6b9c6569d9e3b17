//! In-memory execution layer.
use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::Context as _;
use rand::Rng as _;
use tbft_roles::validator::{
    Block, BlockHash, BlockVersion, Height, Payload, TxId, ValidatorId,
};

use crate::{
    BlockCommitter, BlockProposer, BlockVerifier, LedgerCache, LedgerCacheImpl, VerifyError,
    VerifyMode,
};

/// Behavior of the in-memory block producer and verifier.
#[derive(Debug, Clone)]
pub enum PayloadManager {
    /// Proposes blocks with random payloads of the given size, accepts all blocks.
    Random(usize),
    /// Never finishes proposing a block, accepts all blocks.
    Pending,
    /// Rejects all blocks.
    Reject,
}

/// In-memory implementation of all the execution layer interfaces.
#[derive(Debug, Clone)]
pub struct Engine(Arc<EngineInner>);

#[derive(Debug)]
struct EngineInner {
    id: ValidatorId,
    version: BlockVersion,
    payload_manager: PayloadManager,
    ledger: LedgerCacheImpl,
    blocks: Mutex<BTreeMap<Height, Block>>,
    pending_txs: Mutex<Vec<TxId>>,
    invalid_txs: Mutex<HashSet<TxId>>,
    failing_commits: AtomicUsize,
}

impl Engine {
    /// Engine of the validator `id`, with a random payload manager, starting from genesis.
    pub fn new_random(id: ValidatorId, version: BlockVersion) -> Self {
        Self::new(id, Block::genesis(version), PayloadManager::Random(100))
    }

    /// Engine starting with `last` as the last committed block.
    pub fn new(id: ValidatorId, last: Block, payload_manager: PayloadManager) -> Self {
        Self(Arc::new(EngineInner {
            id,
            version: last.version,
            payload_manager,
            ledger: LedgerCacheImpl::new(last.clone()),
            blocks: Mutex::new([(last.height, last)].into()),
            pending_txs: Mutex::default(),
            invalid_txs: Mutex::default(),
            failing_commits: AtomicUsize::new(0),
        }))
    }

    /// Includes the transaction in the next proposed block.
    pub fn push_tx(&self, tx: TxId) {
        self.0.pending_txs.lock().unwrap().push(tx);
    }

    /// Makes the verifier report blocks with this transaction.
    pub fn mark_invalid(&self, tx: TxId) {
        self.0.invalid_txs.lock().unwrap().insert(tx);
    }

    /// Makes the next `n` calls to `add_block()` fail.
    pub fn fail_commits(&self, n: usize) {
        self.0.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Committed block at the given height.
    pub fn block(&self, height: Height) -> Option<Block> {
        self.0.blocks.lock().unwrap().get(&height).cloned()
    }

    /// All committed blocks, genesis included.
    pub fn blocks(&self) -> Vec<Block> {
        self.0.blocks.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl BlockProposer for Engine {
    async fn create_block(&self, height: Height, pre_hash: BlockHash) -> anyhow::Result<Block> {
        let size = match &self.0.payload_manager {
            PayloadManager::Random(size) => *size,
            PayloadManager::Pending => std::future::pending().await,
            PayloadManager::Reject => 0,
        };
        let mut rng = rand::thread_rng();
        Ok(Block {
            height,
            version: self.0.version,
            pre_hash,
            proposer: self.0.id.clone(),
            txs: std::mem::take(&mut *self.0.pending_txs.lock().unwrap()),
            payload: Payload((0..size).map(|_| rng.gen()).collect()),
        })
    }
}

#[async_trait::async_trait]
impl BlockVerifier for Engine {
    async fn verify_block(&self, block: &Block, _mode: VerifyMode) -> Result<(), VerifyError> {
        if let PayloadManager::Reject = self.0.payload_manager {
            return Err(anyhow::format_err!("invalid payload").into());
        }
        let last = self.0.ledger.last_committed_block();
        if block.pre_hash != last.hash() {
            return Err(anyhow::format_err!("block doesn't extend the last committed block").into());
        }
        let invalid = self.0.invalid_txs.lock().unwrap();
        let bad: Vec<_> = block
            .txs
            .iter()
            .filter(|tx| invalid.contains(*tx))
            .cloned()
            .collect();
        if !bad.is_empty() {
            return Err(VerifyError::InvalidTxs(bad));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlockCommitter for Engine {
    async fn add_block(&self, block: Block) -> anyhow::Result<()> {
        let failing = self.0.failing_commits.load(Ordering::SeqCst);
        if failing > 0 {
            self.0.failing_commits.store(failing - 1, Ordering::SeqCst);
            anyhow::bail!("injected commit failure");
        }
        let mut blocks = self.0.blocks.lock().unwrap();
        if let Some(got) = blocks.get(&block.height) {
            anyhow::ensure!(got == &block, "conflicting block at height {}", block.height);
            return Ok(());
        }
        let last = blocks.values().next_back().context("empty store")?;
        anyhow::ensure!(
            block.height == last.height.next(),
            "got block {}, want {}",
            block.height,
            last.height.next()
        );
        self.0.ledger.set_last_committed_block(block.clone());
        blocks.insert(block.height, block);
        Ok(())
    }
}

impl LedgerCache for Engine {
    fn last_committed_block(&self) -> Block {
        self.0.ledger.last_committed_block()
    }

    fn set_last_committed_block(&self, block: Block) {
        self.0.ledger.set_last_committed_block(block);
    }

    fn current_height(&self) -> anyhow::Result<Height> {
        self.0.ledger.current_height()
    }
}
