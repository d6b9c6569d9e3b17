//! Height, round and step transitions.
//!
//! Every rule of the protocol is a single transition checked by
//! [`ConsensusEngine::step_once`]. [`ConsensusEngine::try_progress`] applies
//! transitions until none applies, so the order in which messages arrive
//! doesn't matter.
use std::sync::Arc;

use tbft_roles::validator::{BlockHash, Round, Step, TxId, VoteType};
use tokio::time::Instant;

use super::{CommitStatus, ConsensusEngine};
use crate::{
    io::ConsensusEvent,
    metrics::METRICS,
    state::{ConsensusState, Verdict},
    timeout::TimeoutInfo,
};

impl ConsensusEngine {
    /// Starts the height after the last committed block.
    pub(crate) fn enter_new_height(&mut self) -> anyhow::Result<()> {
        let last = self.engine.last_committed_block();
        let mut validators = self.state.validators.clone();
        if let Some(ids) = self.pending_validators.take() {
            match self.chain.make_validator_set(ids) {
                Ok(set) => {
                    tracing::info!(height = %last.height.next(), size = set.len(), "validator set updated");
                    validators = Arc::new(set);
                }
                Err(err) => tracing::error!("rejected validator set update: {err:#}"),
            }
        }
        self.state = ConsensusState::new(last, validators);
        let height = self.state.height;
        tracing::info!(%height, "new height");
        METRICS.height.set(height.0);
        self.commit = CommitStatus::Idle;
        self.verifying.clear();
        self.unverified.clear();
        self.creating = None;
        self.height_start = Instant::now();
        self.backlog.extend(self.future.take_height(height));
        self.enter_new_round(Round(0))
    }

    /// Starts the given round of the current height.
    pub(crate) fn enter_new_round(&mut self, round: Round) -> anyhow::Result<()> {
        let height = self.state.height;
        if round > Round(0) {
            METRICS.round_latency.observe(self.round_start.elapsed());
            tracing::info!(%height, %round, "new round");
        }
        self.state.round = round;
        self.state.step = Step::NewRound;
        self.round_start = Instant::now();
        self.scheduler.prune(height, round);
        METRICS.round.set(round.0.into());
        self.publish(ConsensusEvent::RoundChanged {
            height,
            round,
            step: Step::NewRound,
        });
        self.backlog.extend(self.future.take_round(height, round));
        self.enter_propose()
    }

    fn enter_propose(&mut self) -> anyhow::Result<()> {
        self.state.step = Step::Propose;
        self.arm_propose_timers()?;
        if self.proposer(self.state.round)? == self.id {
            self.propose()?;
        }
        Ok(())
    }

    /// Schedules the propose timeout, and the optimal one if the proposer is fast.
    pub(crate) fn arm_propose_timers(&mut self) -> anyhow::Result<()> {
        let (height, round) = (self.state.height, self.state.round);
        self.schedule(
            TimeoutInfo::new(height, round, Step::Propose),
            self.timeouts.propose(round),
        );
        let proposer = self.proposer(round)?;
        if let Some(optimal) = self.timeouts.propose_optimal {
            if proposer != self.id && !self.slow_proposers.contains(&proposer) {
                let info = TimeoutInfo {
                    optimal: true,
                    ..TimeoutInfo::new(height, round, Step::Propose)
                };
                self.schedule(info, optimal);
            }
        }
        Ok(())
    }

    /// Prevotes for `hash` (nil if `None`) and waits for the prevotes.
    pub(crate) fn enter_prevote(
        &mut self,
        hash: Option<BlockHash>,
        invalid_txs: Vec<TxId>,
    ) -> anyhow::Result<()> {
        let (height, round) = (self.state.height, self.state.round);
        self.state.step = Step::Prevote;
        self.scheduler.cancel(height, round, Step::Propose);
        self.cast_vote(VoteType::Prevote, hash, invalid_txs)?;
        self.schedule(
            TimeoutInfo::new(height, round, Step::Prevote),
            self.timeouts.prevote(round),
        );
        Ok(())
    }

    /// Precommits for `hash` (nil if `None`) and waits for the precommits.
    /// A precommit for a block locks on it.
    pub(crate) fn enter_precommit(&mut self, hash: Option<BlockHash>) -> anyhow::Result<()> {
        let (height, round) = (self.state.height, self.state.round);
        self.state.step = Step::Precommit;
        self.scheduler.cancel(height, round, Step::Prevote);
        self.scheduler.cancel(height, round, Step::PrevoteWait);
        if let Some(hash) = hash {
            let block = self.state.block(&hash).cloned();
            tracing::debug!(%height, %round, block = %hash, "locking");
            self.state.locked_round = Some(round);
            self.state.locked_proposal = block.clone();
            self.state.valid_round = Some(round);
            self.state.valid_proposal = block;
        }
        self.cast_vote(VoteType::Precommit, hash, vec![])?;
        self.schedule(
            TimeoutInfo::new(height, round, Step::Precommit),
            self.timeouts.precommit(round),
        );
        Ok(())
    }

    /// Applies transitions until none applies.
    pub(crate) fn try_progress(&mut self) -> anyhow::Result<()> {
        while self.step_once()? {}
        Ok(())
    }

    /// Applies a single transition. Returns whether one was applied.
    fn step_once(&mut self) -> anyhow::Result<bool> {
        match self.state.step {
            Step::NewHeight | Step::NewRound => return Ok(false),
            Step::Commit => {
                self.try_start_commit()?;
                return Ok(false);
            }
            _ => {}
        }

        // A precommit quorum for a block in any round decides the height.
        let decision = self.state.votes.rounds().find_map(|(round, votes)| {
            match votes.precommits.two_thirds_majority() {
                Some(Some(hash)) => Some((*round, hash)),
                _ => None,
            }
        });
        if let Some((round, hash)) = decision {
            self.enter_commit(round, hash)?;
            return Ok(true);
        }

        // Skip to a future round where a quorum of validators is already voting.
        let current = self.state.round;
        let skip = self
            .state
            .votes
            .rounds()
            .filter(|(round, votes)| {
                **round > current
                    && (votes.prevotes.has_quorum_of_voters()
                        || votes.precommits.has_quorum_of_voters())
            })
            .map(|(round, _)| *round)
            .last();
        if let Some(round) = skip {
            tracing::info!(height = %self.state.height, from = %current, to = %round, "skipping to a future round");
            self.enter_new_round(round)?;
            return Ok(true);
        }

        // The current round can't decide anything anymore.
        if let Some(precommits) = self.state.votes.precommits(current) {
            if precommits.two_thirds_majority() == Some(None) || !precommits.has_two_thirds_any() {
                self.enter_new_round(current.next())?;
                return Ok(true);
            }
        }

        self.update_valid_block();
        match self.state.step {
            Step::Propose => self.try_prevote(),
            Step::Prevote | Step::PrevoteWait => self.try_precommit(),
            Step::Precommit => self.try_precommit_wait(),
            _ => Ok(false),
        }
    }

    /// Hash of the proposal of the current round, if it has been verified valid.
    fn valid_proposal_hash(&self) -> Option<BlockHash> {
        let hash = self.state.proposal()?.msg.block.hash();
        self.state
            .verdict(&hash)
            .is_some_and(Verdict::is_valid)
            .then_some(hash)
    }

    /// Checks whether the lock allows prevoting for `hash`.
    fn lock_allows(&self, hash: BlockHash, pol_round: Option<Round>) -> bool {
        let Some(locked_round) = self.state.locked_round else {
            return true;
        };
        if self.state.locked_hash() == Some(hash) {
            return true;
        }
        // A prevote quorum for the block in a round at or after our lock unlocks us.
        pol_round.is_some_and(|pol_round| {
            pol_round >= locked_round
                && pol_round < self.state.round
                && self
                    .state
                    .votes
                    .prevotes(pol_round)
                    .is_some_and(|v| v.two_thirds_majority() == Some(Some(hash)))
        })
    }

    fn try_prevote(&mut self) -> anyhow::Result<bool> {
        let Some(proposal) = self.state.proposal() else {
            return Ok(false);
        };
        let hash = proposal.msg.block.hash();
        let pol_round = proposal.msg.pol_round;
        let Some(verdict) = self.state.verdict(&hash) else {
            // Waiting for the verification.
            return Ok(false);
        };
        let (valid, invalid_txs) = match verdict {
            Verdict::Valid => (true, vec![]),
            Verdict::Invalid { invalid_txs } => (false, invalid_txs.clone()),
        };
        if valid && self.lock_allows(hash, pol_round) {
            self.enter_prevote(Some(hash), invalid_txs)?;
        } else {
            tracing::debug!(height = %self.state.height, round = %self.state.round, block = %hash, valid, "prevoting nil");
            self.enter_prevote(None, invalid_txs)?;
        }
        Ok(true)
    }

    fn try_precommit(&mut self) -> anyhow::Result<bool> {
        let round = self.state.round;
        let Some(prevotes) = self.state.votes.prevotes(round) else {
            return Ok(false);
        };
        let maj23 = prevotes.two_thirds_majority();
        let reachable = prevotes.has_two_thirds_any();
        let no_majority = prevotes.has_two_thirds_no_majority();
        match maj23 {
            Some(Some(hash)) => {
                if self.valid_proposal_hash() == Some(hash) {
                    self.enter_precommit(Some(hash))?;
                    return Ok(true);
                }
                // Waiting for the proposal or its verification.
                Ok(self.enter_prevote_wait())
            }
            Some(None) => {
                self.enter_precommit(None)?;
                Ok(true)
            }
            None if !reachable => {
                self.enter_precommit(None)?;
                Ok(true)
            }
            None if no_majority => Ok(self.enter_prevote_wait()),
            None => Ok(false),
        }
    }

    fn enter_prevote_wait(&mut self) -> bool {
        if self.state.step != Step::Prevote {
            return false;
        }
        let (height, round) = (self.state.height, self.state.round);
        self.state.step = Step::PrevoteWait;
        self.scheduler.cancel(height, round, Step::Prevote);
        self.schedule(
            TimeoutInfo::new(height, round, Step::PrevoteWait),
            self.timeouts.prevote(round),
        );
        true
    }

    fn try_precommit_wait(&mut self) -> anyhow::Result<bool> {
        let (height, round) = (self.state.height, self.state.round);
        let waiting = self
            .state
            .votes
            .precommits(round)
            .is_some_and(|v| v.has_two_thirds_no_majority());
        if !waiting {
            return Ok(false);
        }
        self.state.step = Step::PrecommitWait;
        self.scheduler.cancel(height, round, Step::Precommit);
        self.schedule(
            TimeoutInfo::new(height, round, Step::PrecommitWait),
            self.timeouts.precommit(round),
        );
        Ok(true)
    }

    /// Remembers the proposal of the current round as the valid block once it
    /// gets a prevote quorum, even if we are past prevoting.
    fn update_valid_block(&mut self) {
        if !matches!(
            self.state.step,
            Step::Prevote | Step::PrevoteWait | Step::Precommit | Step::PrecommitWait
        ) {
            return;
        }
        let round = self.state.round;
        if self.state.valid_round == Some(round) {
            return;
        }
        let Some(hash) = self.valid_proposal_hash() else {
            return;
        };
        let maj23 = self
            .state
            .votes
            .prevotes(round)
            .and_then(|v| v.two_thirds_majority());
        if maj23 == Some(Some(hash)) {
            self.state.valid_round = Some(round);
            self.state.valid_proposal = self.state.block(&hash).cloned();
        }
    }
}
