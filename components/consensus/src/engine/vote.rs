//! Handling of prevotes and precommits.
use anyhow::Context as _;
use tbft_roles::validator::{self, BlockHash, Height, Round, Signed, TxId, Vote, VoteType};
use tbft_storage::WalEntry;

use super::ConsensusEngine;
use crate::{
    cache::CacheOutcome,
    io::ConsensusEvent,
    metrics::RejectLabel,
    vote_set,
};

/// Errors that can occur when processing a vote.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// Vote for a height that is already decided.
    #[error("old vote (current height {current_height}, vote height {height})")]
    Old {
        current_height: Height,
        height: Height,
    },
    /// Vote too far in the future to be kept.
    #[error("vote too far ahead: {height}/{round}")]
    TooFarAhead { height: Height, round: Round },
    /// The vote set rejected the vote.
    #[error(transparent)]
    VoteSet(#[from] vote_set::Error),
    /// Internal error. Unlike other error types, this one isn't supposed to be
    /// easily recoverable.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn label(&self) -> RejectLabel {
        match self {
            Self::Old { .. } => RejectLabel::Old,
            Self::TooFarAhead { .. } => RejectLabel::TooFarAhead,
            Self::VoteSet(vote_set::Error::InvalidValidator(_)) => RejectLabel::InvalidValidator,
            Self::VoteSet(vote_set::Error::InvalidSigner { .. }) => RejectLabel::InvalidSigner,
            Self::VoteSet(vote_set::Error::VoteForDifferentHash { .. }) => {
                RejectLabel::Equivocation
            }
            Self::VoteSet(vote_set::Error::UnexpectedStep { .. }) | Self::Internal(_) => {
                RejectLabel::Other
            }
        }
    }
}

impl ConsensusEngine {
    /// Processes a vote from the network (or from the WAL).
    pub(crate) fn on_vote(&mut self, signed: Signed<Vote>) -> Result<(), Error> {
        let (height, round) = (self.state.height, self.state.round);
        let v = &signed.msg;
        if v.height < height {
            return Err(Error::Old {
                current_height: height,
                height: v.height,
            });
        }
        if v.height > height {
            return match self.future.add(height, round, signed.clone().upcast()) {
                CacheOutcome::Dropped => Err(Error::TooFarAhead {
                    height: v.height,
                    round: v.round,
                }),
                CacheOutcome::Cached | CacheOutcome::Duplicate => Ok(()),
            };
        }
        // Votes of future rounds of the height are counted right away,
        // they may make us skip to that round.
        if v.round > round && v.round.0 - round.0 > self.chain.future_round_limit {
            return Err(Error::TooFarAhead {
                height: v.height,
                round: v.round,
            });
        }
        if !self.state.votes.add_vote(signed.clone())? {
            return Ok(());
        }
        tracing::trace!(
            voter = %signed.msg.voter,
            kind = ?signed.msg.vote_type,
            round = %signed.msg.round,
            hash = ?signed.msg.hash,
            "accepted vote"
        );
        self.wal_append(&WalEntry::Vote(signed))?;
        self.report_invalid_txs();
        self.try_progress()?;
        Ok(())
    }

    /// Publishes the transactions which crossed the invalid-tx threshold.
    fn report_invalid_txs(&mut self) {
        let tx_ids = self.state.votes.take_invalid_txs();
        if tx_ids.is_empty() {
            return;
        }
        let height = self.state.height;
        tracing::info!(%height, ?tx_ids, "transactions reported invalid");
        self.publish(ConsensusEvent::InvalidTxs { height, tx_ids });
    }

    /// Signs, logs, records and broadcasts our vote for the current round.
    /// Does nothing if this node isn't a validator or has already voted.
    pub(crate) fn cast_vote(
        &mut self,
        vote_type: VoteType,
        hash: Option<BlockHash>,
        invalid_txs: Vec<TxId>,
    ) -> anyhow::Result<()> {
        if !self.state.validators.contains(&self.id) {
            return Ok(());
        }
        let vote = Vote {
            vote_type,
            voter: self.id.clone(),
            height: self.state.height,
            round: self.state.round,
            hash,
            invalid_txs,
        };
        if !self.state.votes.is_required(vote.round, &vote) {
            return Ok(());
        }
        let signed = validator::sign_msg(&*self.signer, vote).context("sign_msg()")?;
        tracing::debug!(
            height = %signed.msg.height,
            round = %signed.msg.round,
            kind = ?vote_type,
            ?hash,
            "voting"
        );
        self.wal_append(&WalEntry::Vote(signed.clone()))?;
        self.state
            .votes
            .add_vote(signed.clone())
            .context("add_vote()")?;
        self.report_invalid_txs();
        self.broadcast(signed.upcast());
        Ok(())
    }
}
