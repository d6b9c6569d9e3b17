use std::sync::{PoisonError, RwLock};

use tbft_roles::validator::{Block, Height};

use crate::LedgerCache;

/// [`LedgerCache`] guarded by a reader/writer lock.
#[derive(Debug)]
pub struct LedgerCacheImpl(RwLock<Block>);

impl LedgerCacheImpl {
    /// Constructs a cache with the given last committed block.
    pub fn new(last: Block) -> Self {
        Self(RwLock::new(last))
    }
}

impl LedgerCache for LedgerCacheImpl {
    fn last_committed_block(&self) -> Block {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_last_committed_block(&self, block: Block) {
        let mut last = self.0.write().unwrap_or_else(PoisonError::into_inner);
        // The cache never moves backwards.
        if block.height >= last.height {
            *last = block;
        }
    }

    fn current_height(&self) -> anyhow::Result<Height> {
        Ok(self
            .0
            .read()
            .map_err(|_| anyhow::format_err!("ledger cache lock poisoned"))?
            .height)
    }
}
