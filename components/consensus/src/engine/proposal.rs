//! Handling of proposals: validation, verification of the block and
//! building of our own proposals.
use anyhow::Context as _;
use tbft_engine::VerifyError;
use tbft_roles::validator::{
    self, Block, BlockHash, Height, Proposal, Round, Signed, ValidatorId,
};
use tbft_storage::WalEntry;

use super::{ConsensusEngine, Internal};
use crate::{cache::CacheOutcome, metrics::METRICS, state::Verdict};

/// Errors that can occur when processing a proposal.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// Proposal for a height that is already decided.
    #[error("old proposal (current height {current_height}, proposal height {height})")]
    Old {
        current_height: Height,
        height: Height,
    },
    /// Proposal too far in the future to be cached.
    #[error("proposal too far ahead: {height}/{round}")]
    TooFarAhead { height: Height, round: Round },
    /// The proposal was signed by someone else than the proposer.
    #[error("proposal of {voter} signed by {signer}")]
    InvalidSigner {
        voter: ValidatorId,
        signer: ValidatorId,
    },
    /// The proposer isn't the one selected for the round.
    #[error("wrong proposer for round {round}: got {got}, want {want}")]
    WrongProposer {
        round: Round,
        got: ValidatorId,
        want: ValidatorId,
    },
    /// The block doesn't extend the last committed block.
    #[error("block {height} doesn't extend the last committed block")]
    InvalidBlock { height: Height },
    /// `pol_round` is not below the round of the proposal.
    #[error("invalid pol_round {pol_round} for round {round}")]
    InvalidPolRound { pol_round: Round, round: Round },
    /// The proposer sent two different proposals for the same round.
    #[error("conflicting proposals from {voter} for round {round}")]
    Equivocation { voter: ValidatorId, round: Round },
    /// Internal error. Unlike other error types, this one isn't supposed to be
    /// easily recoverable.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ConsensusEngine {
    /// Proposer of the given round of the current height.
    pub(crate) fn proposer(&self, round: Round) -> anyhow::Result<ValidatorId> {
        let last = &self.state.last_block;
        Ok(self
            .state
            .validators
            .get_proposer(last.version, &last.proposer, self.state.height, round)
            .context("get_proposer()")?
            .clone())
    }

    /// Processes a proposal from the network (or from the WAL).
    pub(crate) fn on_proposal(&mut self, signed: Signed<Proposal>) -> Result<(), Error> {
        let p = &signed.msg;
        if signed.signer != p.voter {
            return Err(Error::InvalidSigner {
                voter: p.voter.clone(),
                signer: signed.signer.clone(),
            });
        }
        let (height, round) = (self.state.height, self.state.round);
        if p.height < height {
            return Err(Error::Old {
                current_height: height,
                height: p.height,
            });
        }
        if p.height > height || p.round > round {
            return match self.future.add(height, round, signed.clone().upcast()) {
                CacheOutcome::Dropped => Err(Error::TooFarAhead {
                    height: p.height,
                    round: p.round,
                }),
                CacheOutcome::Cached | CacheOutcome::Duplicate => Ok(()),
            };
        }

        // Check the proposal.
        let want = self.proposer(p.round)?;
        if p.voter != want {
            return Err(Error::WrongProposer {
                round: p.round,
                got: p.voter.clone(),
                want,
            });
        }
        if p.block.height != p.height || p.block.pre_hash != self.state.last_block.hash() {
            return Err(Error::InvalidBlock {
                height: p.block.height,
            });
        }
        if let Some(pol_round) = p.pol_round {
            if pol_round >= p.round {
                return Err(Error::InvalidPolRound {
                    pol_round,
                    round: p.round,
                });
            }
        }
        if let Some(existing) = self.state.proposals.get(&p.round) {
            if existing.msg == *p {
                return Ok(());
            }
            return Err(Error::Equivocation {
                voter: p.voter.clone(),
                round: p.round,
            });
        }

        self.wal_append(&WalEntry::Proposal(signed.clone()))?;
        if p.round == round {
            let elapsed = self.round_start.elapsed();
            METRICS.proposal_latency.observe(elapsed);
            if self
                .timeouts
                .propose_optimal
                .is_some_and(|optimal| elapsed <= optimal)
            {
                self.slow_proposers.remove(&p.voter);
            }
        }
        tracing::debug!(
            height = %p.height,
            round = %p.round,
            proposer = %p.voter,
            block = %p.block.hash(),
            "accepted proposal"
        );
        let (round, block) = (p.round, p.block.clone());
        let own = p.voter == self.id;
        self.state.proposals.insert(round, signed);
        if own {
            // Our own block doesn't need to be checked again.
            self.state.verdicts.insert(block.hash(), Verdict::Valid);
        } else {
            self.start_verification(round, block);
        }
        self.try_progress()?;
        Ok(())
    }

    /// Asks the execution layer to verify a proposed block, unless its
    /// verification is known or pending.
    pub(crate) fn start_verification(&mut self, round: Round, block: Block) {
        let hash = block.hash();
        if self.state.verdict(&hash).is_some() || self.verifying.contains(&hash) {
            return;
        }
        if self.replaying {
            self.unverified.insert(hash, (round, block));
            return;
        }
        self.verifying.insert(hash);
        let engine = self.engine.clone();
        let height = block.height;
        self.spawn(async move {
            let result = engine
                .verify_block(&block, tbft_engine::VerifyMode::Consensus)
                .await;
            Internal::Verified {
                height,
                round,
                hash,
                result,
            }
        });
    }

    /// Records the verification outcome of a block.
    pub(crate) fn on_verified(
        &mut self,
        height: Height,
        round: Round,
        hash: BlockHash,
        result: Result<(), VerifyError>,
    ) -> anyhow::Result<()> {
        self.verifying.remove(&hash);
        let verdict = match result {
            Ok(()) => Verdict::Valid,
            Err(VerifyError::InvalidTxs(invalid_txs)) => Verdict::Invalid { invalid_txs },
            Err(VerifyError::Invalid(err)) => {
                tracing::warn!(%height, %round, block = %hash, "invalid block: {err:#}");
                Verdict::Invalid {
                    invalid_txs: vec![],
                }
            }
        };
        self.record_verdict(height, round, hash, verdict)
    }

    /// Stores a verdict, logging it to the WAL first.
    pub(crate) fn record_verdict(
        &mut self,
        height: Height,
        round: Round,
        hash: BlockHash,
        verdict: Verdict,
    ) -> anyhow::Result<()> {
        if height != self.state.height || self.state.verdict(&hash).is_some() {
            return Ok(());
        }
        let (ok, invalid_txs) = match &verdict {
            Verdict::Valid => (true, vec![]),
            Verdict::Invalid { invalid_txs } => (false, invalid_txs.clone()),
        };
        self.wal_append(&WalEntry::Verified {
            height,
            round,
            hash,
            ok,
            invalid_txs,
        })?;
        self.unverified.remove(&hash);
        self.state.verdicts.insert(hash, verdict);
        self.try_progress()
    }

    /// Proposes a block for the current round: the valid block if there is
    /// one, a new block from the execution layer otherwise.
    pub(crate) fn propose(&mut self) -> anyhow::Result<()> {
        if self.state.proposal().is_some() {
            return Ok(());
        }
        let (height, round) = (self.state.height, self.state.round);
        if let Some(block) = self.state.valid_proposal.clone() {
            let pol_round = self.state.valid_round;
            return self.publish_proposal(block, pol_round);
        }
        if self.replaying || self.creating == Some((height, round)) {
            return Ok(());
        }
        self.creating = Some((height, round));
        let engine = self.engine.clone();
        let pre_hash = self.state.last_block.hash();
        self.spawn(async move {
            let result = engine.create_block(height, pre_hash).await;
            Internal::BlockCreated {
                height,
                round,
                result,
            }
        });
        Ok(())
    }

    /// Processes a block built by the execution layer.
    pub(crate) fn on_block_created(
        &mut self,
        height: Height,
        round: Round,
        result: anyhow::Result<Block>,
    ) -> anyhow::Result<()> {
        if self.creating == Some((height, round)) {
            self.creating = None;
        }
        let current = (self.state.height, self.state.round);
        if (height, round) != current
            || self.state.step != validator::Step::Propose
            || self.state.proposal().is_some()
        {
            tracing::debug!(%height, %round, "dropping a block built for a stale round");
            return Ok(());
        }
        match result {
            Ok(block) => self.publish_proposal(block, None),
            Err(err) => {
                // The round will time out.
                tracing::error!(%height, %round, "create_block(): {err:#}");
                Ok(())
            }
        }
    }

    /// Signs, logs and broadcasts our proposal, then acts on it.
    fn publish_proposal(&mut self, block: Block, pol_round: Option<Round>) -> anyhow::Result<()> {
        let proposal = Proposal {
            voter: self.id.clone(),
            height: self.state.height,
            round: self.state.round,
            pol_round,
            block,
        };
        let signed = validator::sign_msg(&*self.signer, proposal).context("sign_msg()")?;
        tracing::info!(
            height = %signed.msg.height,
            round = %signed.msg.round,
            block = %signed.msg.block.hash(),
            ?pol_round,
            "proposing block"
        );
        self.wal_append(&WalEntry::Proposal(signed.clone()))?;
        let hash = signed.msg.block.hash();
        self.state.verdicts.insert(hash, Verdict::Valid);
        self.state.proposals.insert(signed.msg.round, signed.clone());
        self.broadcast(signed.upcast());
        self.try_progress()
    }
}
