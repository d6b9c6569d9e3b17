use std::sync::Arc;

use assert_matches::assert_matches;
use tbft_roles::validator::{testonly::validator_id, Block, BlockVersion, Height, TxId};

use crate::{testonly::Engine, EngineManager, LedgerCache, VerifyError, VerifyMode};

const VERSION: BlockVersion = BlockVersion(2300);

fn manager() -> (Engine, EngineManager) {
    let engine = Engine::new_random(validator_id(0), VERSION);
    let manager = EngineManager::from_engine(Arc::new(engine.clone()));
    (engine, manager)
}

async fn next_block(manager: &EngineManager) -> Block {
    let last = manager.last_committed_block();
    manager
        .create_block(last.height.next(), last.hash())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_commit_advances_ledger() {
    let (engine, manager) = manager();
    for want in 1..4 {
        let block = next_block(&manager).await;
        manager.verify_block(&block, VerifyMode::Consensus).await.unwrap();
        manager.add_block(block.clone()).await.unwrap();
        assert_eq!(engine.current_height().unwrap(), Height(want));
        assert_eq!(manager.last_committed_block(), block);
    }
    assert_eq!(engine.blocks().len(), 4);
}

#[tokio::test]
async fn test_add_block_is_idempotent() {
    let (engine, manager) = manager();
    let block = next_block(&manager).await;
    manager.add_block(block.clone()).await.unwrap();
    manager.add_block(block.clone()).await.unwrap();
    assert_eq!(engine.blocks().len(), 2);
    assert_eq!(engine.block(Height(1)), Some(block));
}

#[tokio::test]
async fn test_add_block_rejects_gaps() {
    let (_, manager) = manager();
    let mut block = next_block(&manager).await;
    block.height = Height(3);
    assert!(manager.add_block(block).await.is_err());
}

#[tokio::test]
async fn test_injected_commit_failures() {
    let (engine, manager) = manager();
    engine.fail_commits(2);
    let block = next_block(&manager).await;
    assert!(manager.add_block(block.clone()).await.is_err());
    assert!(manager.add_block(block.clone()).await.is_err());
    manager.add_block(block).await.unwrap();
    assert_eq!(engine.current_height().unwrap(), Height(1));
}

#[tokio::test]
async fn test_invalid_txs_are_reported() {
    let (engine, manager) = manager();
    engine.push_tx(TxId("good".into()));
    engine.push_tx(TxId("bad".into()));
    engine.mark_invalid(TxId("bad".into()));
    let block = next_block(&manager).await;
    assert_matches!(
        manager.verify_block(&block, VerifyMode::Consensus).await,
        Err(VerifyError::InvalidTxs(txs)) if txs == vec![TxId("bad".into())]
    );
}

#[tokio::test]
async fn test_block_must_extend_the_ledger() {
    let (_, manager) = manager();
    let mut block = next_block(&manager).await;
    block.pre_hash = block.hash();
    assert_matches!(
        manager.verify_block(&block, VerifyMode::Consensus).await,
        Err(VerifyError::Invalid(_))
    );
}

#[test]
fn test_ledger_cache_never_moves_backwards() {
    let engine = Engine::new_random(validator_id(0), VERSION);
    let mut block = Block::genesis(VERSION);
    block.height = Height(5);
    engine.set_last_committed_block(block.clone());
    engine.set_last_committed_block(Block::genesis(VERSION));
    assert_eq!(engine.last_committed_block(), block);
}
