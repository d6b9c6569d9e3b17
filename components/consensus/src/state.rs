//! Mutable state of the consensus for the height being decided.
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use tbft_roles::validator::{
    Block, BlockHash, Height, Proposal, Round, Signed, Step, TxId, ValidatorSet,
};

use crate::height_round_vote_set::HeightRoundVoteSet;

/// Outcome of the verification of a proposed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Block is valid.
    Valid,
    /// Block is invalid. `invalid_txs` are reported in the prevote.
    Invalid {
        /// Transactions reported by the verifier.
        invalid_txs: Vec<TxId>,
    },
}

impl Verdict {
    /// Returns `true` for a valid block.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Height/round/step state, together with the lock and the votes of the height.
///
/// Recreated at every height. The lock (`locked_round`, `locked_proposal`) and
/// the valid block (`valid_round`, `valid_proposal`) carry over across rounds.
#[derive(Debug, Clone)]
pub struct ConsensusState {
    /// Height being decided.
    pub height: Height,
    /// Current round.
    pub round: Round,
    /// Current step.
    pub step: Step,
    /// Last committed block, parent of the block being decided.
    pub last_block: Block,
    /// Validator set of the height.
    pub validators: Arc<ValidatorSet>,
    /// Accepted proposals, by round.
    pub proposals: BTreeMap<Round, Signed<Proposal>>,
    /// Verification outcomes of the proposed blocks.
    pub verdicts: HashMap<BlockHash, Verdict>,
    /// Round in which this node locked, if any.
    pub locked_round: Option<Round>,
    /// Block this node locked on.
    pub locked_proposal: Option<Block>,
    /// Highest round with a prevote quorum for a valid proposal.
    pub valid_round: Option<Round>,
    /// Block which got that quorum.
    pub valid_proposal: Option<Block>,
    /// Votes of all the rounds of the height.
    pub votes: HeightRoundVoteSet,
    /// Block decided for this height, with the round in which it got its precommit quorum.
    pub decision: Option<(Round, BlockHash)>,
}

impl ConsensusState {
    /// State at the beginning of the height after `last_block`.
    pub fn new(last_block: Block, validators: Arc<ValidatorSet>) -> Self {
        let height = last_block.height.next();
        Self {
            height,
            round: Round(0),
            step: Step::NewHeight,
            last_block,
            votes: HeightRoundVoteSet::new(height, validators.clone()),
            validators,
            proposals: BTreeMap::new(),
            verdicts: HashMap::new(),
            locked_round: None,
            locked_proposal: None,
            valid_round: None,
            valid_proposal: None,
            decision: None,
        }
    }

    /// Proposal of the current round.
    pub fn proposal(&self) -> Option<&Signed<Proposal>> {
        self.proposals.get(&self.round)
    }

    /// Proposed block with the given hash, from any round.
    pub fn block(&self, hash: &BlockHash) -> Option<&Block> {
        self.proposals
            .values()
            .map(|p| &p.msg.block)
            .find(|b| &b.hash() == hash)
    }

    /// Verification outcome of the given block.
    pub fn verdict(&self, hash: &BlockHash) -> Option<&Verdict> {
        self.verdicts.get(hash)
    }

    /// Hash of the block this node is locked on.
    pub fn locked_hash(&self) -> Option<BlockHash> {
        self.locked_proposal.as_ref().map(Block::hash)
    }

    /// Hash of the valid block.
    pub fn valid_hash(&self) -> Option<BlockHash> {
        self.valid_proposal.as_ref().map(Block::hash)
    }

    /// Diagnostic snapshot of the state.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            height: self.height,
            round: self.round,
            step: self.step,
            proposal: self.proposal().map(|p| p.msg.block.hash()),
            locked_round: self.locked_round,
            locked_hash: self.locked_hash(),
            valid_round: self.valid_round,
            valid_hash: self.valid_hash(),
            decision: self.decision,
            rounds: self
                .votes
                .rounds()
                .map(|(round, votes)| RoundSummary {
                    round: *round,
                    prevotes: VoteSummary {
                        sum: votes.prevotes.sum(),
                        maj23: votes.prevotes.two_thirds_majority(),
                    },
                    precommits: VoteSummary {
                        sum: votes.precommits.sum(),
                        maj23: votes.precommits.two_thirds_majority(),
                    },
                })
                .collect(),
        }
    }
}

/// Summary of a vote set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteSummary {
    /// Number of voters.
    pub sum: usize,
    /// Quorum, if reached.
    pub maj23: Option<Option<BlockHash>>,
}

/// Summary of the votes of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    /// Round.
    pub round: Round,
    /// Prevotes.
    pub prevotes: VoteSummary,
    /// Precommits.
    pub precommits: VoteSummary,
}

/// Read-only copy of the [`ConsensusState`], for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Height.
    pub height: Height,
    /// Round.
    pub round: Round,
    /// Step.
    pub step: Step,
    /// Hash of the proposal of the current round.
    pub proposal: Option<BlockHash>,
    /// Locked round.
    pub locked_round: Option<Round>,
    /// Hash of the locked block.
    pub locked_hash: Option<BlockHash>,
    /// Valid round.
    pub valid_round: Option<Round>,
    /// Hash of the valid block.
    pub valid_hash: Option<BlockHash>,
    /// Decided block.
    pub decision: Option<(Round, BlockHash)>,
    /// Votes, per round.
    pub rounds: Vec<RoundSummary>,
}
