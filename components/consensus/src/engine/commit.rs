//! Committing the decided block.
use anyhow::Context as _;
use tbft_roles::validator::{Block, BlockHash, Height, Round, Step};

use super::{CommitStatus, ConsensusEngine, Internal};
use crate::{io::ConsensusEvent, metrics::METRICS, timeout::TimeoutInfo};

impl ConsensusEngine {
    /// Moves to the commit step: the block got a precommit quorum in `round`.
    pub(crate) fn enter_commit(&mut self, round: Round, hash: BlockHash) -> anyhow::Result<()> {
        let height = self.state.height;
        tracing::info!(%height, %round, block = %hash, "decided");
        METRICS.commit_latency.observe(self.height_start.elapsed());
        self.scheduler.prune(height.next(), Round(0));
        self.state.step = Step::Commit;
        self.state.decision = Some((round, hash));
        self.try_start_commit()
    }

    /// Starts the commit of the decided block, once the block is known.
    pub(crate) fn try_start_commit(&mut self) -> anyhow::Result<()> {
        if !matches!(self.commit, CommitStatus::Idle | CommitStatus::Pending) {
            return Ok(());
        }
        let Some((_, hash)) = self.state.decision else {
            return Ok(());
        };
        let Some(block) = self.state.block(&hash).cloned() else {
            tracing::info!(height = %self.state.height, block = %hash, "waiting for the decided block");
            return Ok(());
        };
        self.start_commit(block);
        Ok(())
    }

    fn start_commit(&mut self, block: Block) {
        if self.replaying {
            self.commit = CommitStatus::Pending;
            return;
        }
        self.commit = CommitStatus::InFlight;
        let engine = self.engine.clone();
        let height = block.height;
        self.spawn(async move {
            let result = engine.add_block(block).await;
            Internal::Committed { height, result }
        });
    }

    /// Processes the outcome of `add_block()`.
    pub(crate) fn on_committed(
        &mut self,
        height: Height,
        result: anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        if height != self.state.height || self.commit != CommitStatus::InFlight {
            return Ok(());
        }
        let Some((round, hash)) = self.state.decision else {
            anyhow::bail!("committed height {height} without a decision");
        };
        let info = TimeoutInfo::new(height, self.state.round, Step::Commit);
        match result {
            Ok(()) => {
                tracing::info!(%height, %round, block = %hash, "committed");
                self.commit = CommitStatus::Done;
                METRICS.committed_height.set(height.0);
                self.states.push_committed(self.state.snapshot());
                self.wal
                    .compact(height)
                    .with_context(|| format!("wal.compact({height})"))?;
                self.publish(ConsensusEvent::BlockCommitted {
                    height,
                    hash,
                    round,
                });
            }
            Err(err) => {
                tracing::error!(%height, block = %hash, "add_block(): {err:#}");
                METRICS.commit_failures.inc();
                self.commit = CommitStatus::Failed;
            }
        }
        // Either starts the next height or retries the commit.
        self.schedule(info, self.timeouts.commit);
        Ok(())
    }

    /// Commit timeout: the next height starts, or a failed commit is retried.
    pub(crate) fn on_commit_timeout(&mut self) -> anyhow::Result<()> {
        match self.commit {
            CommitStatus::Done => self.enter_new_height(),
            CommitStatus::Failed => {
                tracing::info!(height = %self.state.height, "retrying commit");
                self.commit = CommitStatus::Idle;
                self.try_start_commit()
            }
            CommitStatus::Idle | CommitStatus::Pending | CommitStatus::InFlight => Ok(()),
        }
    }
}
