//! Recovery from the write-ahead log.
use anyhow::Context as _;
use tbft_roles::validator::{Step, VoteType};
use tbft_storage::WalEntry;

use super::{proposal, vote, ConsensusEngine};
use crate::{state::Verdict, timeout::TimeoutInfo};

impl ConsensusEngine {
    /// Rebuilds the state of the current height from the WAL, then resumes:
    /// re-broadcasts our messages of the current round, re-arms the timer of
    /// the current step and restarts the interrupted calls to the execution layer.
    pub(crate) fn recover(&mut self) -> anyhow::Result<()> {
        let entries = self.wal.replay().context("wal.replay()")?;
        self.replaying = true;
        let res = self.replay(entries);
        self.replaying = false;
        res?;
        self.resume()
    }

    fn replay(&mut self, entries: Vec<WalEntry>) -> anyhow::Result<()> {
        self.enter_new_height()?;
        let height = self.state.height;
        let mut replayed = 0;
        for entry in entries {
            // Entries of committed heights are left over from before a compaction.
            if entry.height() != height {
                continue;
            }
            replayed += 1;
            match entry {
                WalEntry::Proposal(p) => match self.on_proposal(p) {
                    Ok(()) => {}
                    Err(proposal::Error::Internal(err)) => return Err(err),
                    Err(err) => tracing::debug!("replay: on_proposal: {err:#}"),
                },
                WalEntry::Vote(v) => match self.on_vote(v) {
                    Ok(()) => {}
                    Err(vote::Error::Internal(err)) => return Err(err),
                    Err(err) => tracing::debug!("replay: on_vote: {err:#}"),
                },
                WalEntry::Verified {
                    height,
                    round,
                    hash,
                    ok,
                    invalid_txs,
                } => {
                    let verdict = if ok {
                        Verdict::Valid
                    } else {
                        Verdict::Invalid { invalid_txs }
                    };
                    self.record_verdict(height, round, hash, verdict)?;
                }
                WalEntry::Timeout {
                    height,
                    round,
                    step,
                    optimal,
                } => self.on_timeout(TimeoutInfo {
                    height,
                    round,
                    step,
                    optimal,
                })?,
                WalEntry::Checkpoint { .. } => {}
            }
            self.drain_backlog()?;
        }
        tracing::info!(
            %height,
            round = %self.state.round,
            step = %self.state.step,
            replayed,
            "recovered consensus state"
        );
        Ok(())
    }

    fn resume(&mut self) -> anyhow::Result<()> {
        let (height, round) = (self.state.height, self.state.round);

        // Our messages of the current round may not have reached anyone.
        if let Some(p) = self.state.proposal() {
            if p.msg.voter == self.id {
                self.broadcast(p.clone().upcast());
            }
        }
        if let Some(votes) = self.state.votes.round(round) {
            for vote_type in [VoteType::Prevote, VoteType::Precommit] {
                if let Some(v) = votes.get(vote_type).get(&self.id) {
                    self.broadcast(v.clone().upcast());
                }
            }
        }

        for (_, (block_round, block)) in std::mem::take(&mut self.unverified) {
            self.start_verification(block_round, block);
        }

        match self.state.step {
            Step::Propose => {
                self.arm_propose_timers()?;
                if self.proposer(round)? == self.id {
                    self.propose()?;
                }
            }
            Step::Prevote => self.schedule(
                TimeoutInfo::new(height, round, Step::Prevote),
                self.timeouts.prevote(round),
            ),
            Step::PrevoteWait => self.schedule(
                TimeoutInfo::new(height, round, Step::PrevoteWait),
                self.timeouts.prevote(round),
            ),
            Step::Precommit => self.schedule(
                TimeoutInfo::new(height, round, Step::Precommit),
                self.timeouts.precommit(round),
            ),
            Step::PrecommitWait => self.schedule(
                TimeoutInfo::new(height, round, Step::PrecommitWait),
                self.timeouts.precommit(round),
            ),
            Step::Commit => self.try_start_commit()?,
            Step::NewHeight | Step::NewRound => {}
        }
        self.try_progress()
    }
}
