//! Votes of all the rounds of a height.
use std::{collections::BTreeMap, sync::Arc};

use tbft_roles::validator::{Height, Round, Signed, TxId, ValidatorSet, Vote, VoteType};

use crate::vote_set::{self, VoteSet};

/// Prevotes and precommits of a single round.
#[derive(Debug, Clone)]
pub struct RoundVoteSet {
    /// Prevotes.
    pub prevotes: VoteSet,
    /// Precommits.
    pub precommits: VoteSet,
}

impl RoundVoteSet {
    fn new(height: Height, round: Round, validators: &Arc<ValidatorSet>) -> Self {
        Self {
            prevotes: VoteSet::new(VoteType::Prevote, height, round, validators.clone()),
            precommits: VoteSet::new(VoteType::Precommit, height, round, validators.clone()),
        }
    }

    /// Vote set of the given type.
    pub fn get(&self, vote_type: VoteType) -> &VoteSet {
        match vote_type {
            VoteType::Prevote => &self.prevotes,
            VoteType::Precommit => &self.precommits,
        }
    }

    fn get_mut(&mut self, vote_type: VoteType) -> &mut VoteSet {
        match vote_type {
            VoteType::Prevote => &mut self.prevotes,
            VoteType::Precommit => &mut self.precommits,
        }
    }
}

/// Vote sets of all the rounds of a height. Rounds are created on first use.
#[derive(Debug, Clone)]
pub struct HeightRoundVoteSet {
    height: Height,
    validators: Arc<ValidatorSet>,
    rounds: BTreeMap<Round, RoundVoteSet>,
}

impl HeightRoundVoteSet {
    /// Empty vote sets for `height`.
    pub fn new(height: Height, validators: Arc<ValidatorSet>) -> Self {
        Self {
            height,
            validators,
            rounds: BTreeMap::new(),
        }
    }

    /// Height of the votes.
    pub fn height(&self) -> Height {
        self.height
    }

    /// Validator set the votes are checked against.
    pub fn validators(&self) -> &Arc<ValidatorSet> {
        &self.validators
    }

    /// Adds a vote to the vote set of its round and type.
    pub fn add_vote(&mut self, vote: Signed<Vote>) -> Result<bool, vote_set::Error> {
        let (height, round) = (self.height, vote.msg.round);
        let validators = &self.validators;
        let set = self
            .rounds
            .entry(round)
            .or_insert_with(|| RoundVoteSet::new(height, round, validators))
            .get_mut(vote.msg.vote_type);
        set.add_vote(vote)
    }

    /// Votes of the given round.
    pub fn round(&self, round: Round) -> Option<&RoundVoteSet> {
        self.rounds.get(&round)
    }

    /// Prevotes of the given round.
    pub fn prevotes(&self, round: Round) -> Option<&VoteSet> {
        Some(&self.rounds.get(&round)?.prevotes)
    }

    /// Precommits of the given round.
    pub fn precommits(&self, round: Round) -> Option<&VoteSet> {
        Some(&self.rounds.get(&round)?.precommits)
    }

    /// Rounds with at least one vote, in order.
    pub fn rounds(&self) -> impl Iterator<Item = (&Round, &RoundVoteSet)> {
        self.rounds.iter()
    }

    /// Tells whether it is worth requesting `vote` from a peer: false if the
    /// voter isn't a validator or the vote is already present.
    pub fn is_required(&self, round: Round, vote: &Vote) -> bool {
        if !self.validators.contains(&vote.voter) {
            return false;
        }
        self.rounds
            .get(&round)
            .and_then(|r| r.get(vote.vote_type).get(&vote.voter))
            .is_none()
    }

    /// Takes the transactions which crossed the invalid-tx threshold in any round.
    pub fn take_invalid_txs(&mut self) -> Vec<TxId> {
        self.rounds
            .values_mut()
            .flat_map(|r| r.prevotes.take_invalid_txs())
            .collect()
    }
}
