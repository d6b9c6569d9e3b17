//! Handling of fired timers.
use tbft_roles::validator::Step;
use tbft_storage::WalEntry;

use super::ConsensusEngine;
use crate::{
    metrics::{StepLabel, METRICS},
    timeout::TimeoutInfo,
};

impl ConsensusEngine {
    /// Processes a fired timer (or a timeout replayed from the WAL).
    /// Timers which don't match the current height, round and step are stale.
    pub(crate) fn on_timeout(&mut self, info: TimeoutInfo) -> anyhow::Result<()> {
        let state = &self.state;
        if (info.height, info.round, info.step) != (state.height, state.round, state.step) {
            tracing::trace!(?info, "stale timeout");
            return Ok(());
        }
        if info.optimal && self.state.proposal().is_some() {
            return Ok(());
        }
        if info.step != Step::Commit {
            self.wal_append(&WalEntry::Timeout {
                height: info.height,
                round: info.round,
                step: info.step,
                optimal: info.optimal,
            })?;
        }
        METRICS.timeouts[&StepLabel::new(info.step, info.optimal)].inc();
        tracing::debug!(height = %info.height, round = %info.round, step = %info.step, optimal = info.optimal, "timeout");
        match info.step {
            Step::Propose => {
                if info.optimal {
                    let proposer = self.proposer(info.round)?;
                    tracing::info!(%proposer, "proposer missed the optimal timeout");
                    self.slow_proposers.insert(proposer);
                }
                self.enter_prevote(None, vec![])?;
            }
            Step::Prevote | Step::PrevoteWait => self.enter_precommit(None)?,
            Step::Precommit | Step::PrecommitWait => self.enter_new_round(info.round.next())?,
            Step::Commit => self.on_commit_timeout()?,
            Step::NewHeight | Step::NewRound => {}
        }
        self.try_progress()
    }
}
