//! Messages of the consensus protocol.
use std::fmt;

use tbft_utils::enum_util::{BadVariantError, Variant};

use super::{Block, BlockHash, Height, TxId};
use crate::validator::ValidatorId;

/// Attempt counter within a height. Starts at 0 for every height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Round(pub u32);

impl Round {
    /// Returns the next round.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Round {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, formatter)
    }
}

/// Phase within a round.
///
/// `Propose -> Prevote -> PrevoteWait -> Precommit -> PrecommitWait -> Commit`,
/// going back to `Propose` at the next round when no block gets committed.
/// `NewHeight` and `NewRound` are transient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    /// Entering a new height.
    NewHeight,
    /// Entering a new round.
    NewRound,
    /// Waiting for the proposal.
    Propose,
    /// Prevote cast, waiting for prevotes.
    Prevote,
    /// 2/3+ prevotes received, but no majority yet.
    PrevoteWait,
    /// Precommit cast, waiting for precommits.
    Precommit,
    /// 2/3+ precommits received, but no majority yet.
    PrecommitWait,
    /// A block has been decided for this height.
    Commit,
}

impl fmt::Display for Step {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, formatter)
    }
}

/// Type of a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VoteType {
    /// First voting phase of a round.
    Prevote,
    /// Second voting phase of a round.
    Precommit,
}

/// A vote for a block (or for nothing) at the given height and round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vote {
    /// Type of the vote.
    pub vote_type: VoteType,
    /// Validator casting the vote.
    pub voter: ValidatorId,
    /// Height.
    pub height: Height,
    /// Round.
    pub round: Round,
    /// Hash of the block voted for; `None` is a nil vote.
    pub hash: Option<BlockHash>,
    /// Transactions of the proposed block that the voter considers invalid.
    /// Only meaningful for prevotes.
    pub invalid_txs: Vec<TxId>,
}

impl Vote {
    /// Returns true for a vote for nothing.
    pub fn is_nil(&self) -> bool {
        self.hash.is_none()
    }
}

/// A candidate block proposed by the proposer of a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    /// Proposer.
    pub voter: ValidatorId,
    /// Height.
    pub height: Height,
    /// Round.
    pub round: Round,
    /// Round in which the proposer observed a 2/3+ prevote quorum for the block, if any.
    pub pol_round: Option<Round>,
    /// Proposed block.
    pub block: Block,
}

/// Consensus message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsensusMsg {
    /// Proposal.
    Proposal(Proposal),
    /// Prevote.
    Prevote(Vote),
    /// Precommit.
    Precommit(Vote),
}

impl ConsensusMsg {
    /// Height the message refers to.
    pub fn height(&self) -> Height {
        match self {
            Self::Proposal(p) => p.height,
            Self::Prevote(v) | Self::Precommit(v) => v.height,
        }
    }

    /// Round the message refers to.
    pub fn round(&self) -> Round {
        match self {
            Self::Proposal(p) => p.round,
            Self::Prevote(v) | Self::Precommit(v) => v.round,
        }
    }

    /// Validator which authored the message.
    pub fn voter(&self) -> &ValidatorId {
        match self {
            Self::Proposal(p) => &p.voter,
            Self::Prevote(v) | Self::Precommit(v) => &v.voter,
        }
    }

    /// Label of the message type, for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Proposal(_) => "Proposal",
            Self::Prevote(_) => "Prevote",
            Self::Precommit(_) => "Precommit",
        }
    }
}

impl Variant<ConsensusMsg> for Proposal {
    fn insert(self) -> ConsensusMsg {
        ConsensusMsg::Proposal(self)
    }
    fn extract(msg: ConsensusMsg) -> Result<Self, BadVariantError> {
        let ConsensusMsg::Proposal(this) = msg else {
            return Err(BadVariantError);
        };
        Ok(this)
    }
}

impl Variant<ConsensusMsg> for Vote {
    fn insert(self) -> ConsensusMsg {
        match self.vote_type {
            VoteType::Prevote => ConsensusMsg::Prevote(self),
            VoteType::Precommit => ConsensusMsg::Precommit(self),
        }
    }
    fn extract(msg: ConsensusMsg) -> Result<Self, BadVariantError> {
        match msg {
            ConsensusMsg::Prevote(this) | ConsensusMsg::Precommit(this) => Ok(this),
            ConsensusMsg::Proposal(_) => Err(BadVariantError),
        }
    }
}

impl Variant<ConsensusMsg> for ConsensusMsg {
    fn insert(self) -> ConsensusMsg {
        self
    }
    fn extract(msg: ConsensusMsg) -> Result<Self, BadVariantError> {
        Ok(msg)
    }
}
