//! Aggregation of the votes of a single type for a single (height, round).
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use tbft_roles::validator::{
    BlockHash, Height, Round, Signed, TxId, ValidatorId, ValidatorSet, Vote, VoteType,
};

/// Errors returned when adding a vote.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The vote is for a different (type, height, round) than the set.
    #[error("unexpected vote {got_type:?}/{got_height}/{got_round}, want {want_type:?}/{want_height}/{want_round}")]
    UnexpectedStep {
        /// Type of the set.
        want_type: VoteType,
        /// Height of the set.
        want_height: Height,
        /// Round of the set.
        want_round: Round,
        /// Type of the vote.
        got_type: VoteType,
        /// Height of the vote.
        got_height: Height,
        /// Round of the vote.
        got_round: Round,
    },
    /// The voter is not a member of the validator set.
    #[error("voter {0} is not a validator")]
    InvalidValidator(ValidatorId),
    /// The vote was signed by someone else than the voter.
    #[error("vote of {voter} signed by {signer}")]
    InvalidSigner {
        /// Voter.
        voter: ValidatorId,
        /// Signer.
        signer: ValidatorId,
    },
    /// The voter has already voted for a different hash (equivocation).
    #[error("{voter} already voted for {existing:?}, got a vote for {got:?}")]
    VoteForDifferentHash {
        /// Voter.
        voter: ValidatorId,
        /// Hash of the recorded vote.
        existing: Option<BlockHash>,
        /// Hash of the rejected vote.
        got: Option<BlockHash>,
    },
}

/// Set of votes of one type for one (height, round).
///
/// Holds at most one vote per voter. `maj23` is set once, by the first hash
/// (or nil) reaching the quorum threshold, and never changes afterwards.
#[derive(Debug, Clone)]
pub struct VoteSet {
    vote_type: VoteType,
    height: Height,
    round: Round,
    validators: Arc<ValidatorSet>,
    /// All the accepted votes.
    votes: BTreeMap<ValidatorId, Signed<Vote>>,
    /// Number of votes per hash.
    block_votes: HashMap<Option<BlockHash>, usize>,
    /// Hash which reached the quorum.
    maj23: Option<Option<BlockHash>>,
    /// Votes which formed the quorum, frozen when it was reached.
    maj23_votes: BTreeMap<ValidatorId, Signed<Vote>>,
    /// Number of reports per transaction, prevotes only.
    invalid_txs: HashMap<TxId, i64>,
    /// Transactions which crossed the reporting threshold and haven't been taken yet.
    reported_txs: Vec<TxId>,
}

impl VoteSet {
    /// Empty vote set.
    pub fn new(
        vote_type: VoteType,
        height: Height,
        round: Round,
        validators: Arc<ValidatorSet>,
    ) -> Self {
        Self {
            vote_type,
            height,
            round,
            validators,
            votes: BTreeMap::new(),
            block_votes: HashMap::new(),
            maj23: None,
            maj23_votes: BTreeMap::new(),
            invalid_txs: HashMap::new(),
            reported_txs: vec![],
        }
    }

    /// Type of the votes.
    pub fn vote_type(&self) -> VoteType {
        self.vote_type
    }

    /// Round of the votes.
    pub fn round(&self) -> Round {
        self.round
    }

    /// Checks whether the vote could be added, without adding it.
    /// Returns `Ok(false)` for an exact duplicate.
    pub fn check(&self, vote: &Signed<Vote>) -> Result<bool, Error> {
        let v = &vote.msg;
        if (v.vote_type, v.height, v.round) != (self.vote_type, self.height, self.round) {
            return Err(Error::UnexpectedStep {
                want_type: self.vote_type,
                want_height: self.height,
                want_round: self.round,
                got_type: v.vote_type,
                got_height: v.height,
                got_round: v.round,
            });
        }
        if !self.validators.contains(&v.voter) {
            return Err(Error::InvalidValidator(v.voter.clone()));
        }
        if vote.signer != v.voter {
            return Err(Error::InvalidSigner {
                voter: v.voter.clone(),
                signer: vote.signer.clone(),
            });
        }
        if let Some(existing) = self.votes.get(&v.voter) {
            if existing.msg.hash != v.hash {
                return Err(Error::VoteForDifferentHash {
                    voter: v.voter.clone(),
                    existing: existing.msg.hash,
                    got: v.hash,
                });
            }
            return Ok(false);
        }
        Ok(true)
    }

    /// Adds a vote. Returns `Ok(false)` if the same vote was already present.
    pub fn add_vote(&mut self, vote: Signed<Vote>) -> Result<bool, Error> {
        if !self.check(&vote)? {
            return Ok(false);
        }
        let hash = vote.msg.hash;
        if self.vote_type == VoteType::Prevote {
            self.count_invalid_txs(&vote.msg.invalid_txs);
        }
        self.votes.insert(vote.msg.voter.clone(), vote);
        let count = self.block_votes.entry(hash).or_default();
        *count += 1;
        if self.maj23.is_none() && *count >= self.validators.quorum_threshold() {
            self.maj23 = Some(hash);
            self.maj23_votes = self
                .votes
                .iter()
                .filter(|(_, v)| v.msg.hash == hash)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }
        Ok(true)
    }

    fn count_invalid_txs(&mut self, txs: &[TxId]) {
        let size = self.validators.len() as i64;
        let threshold = self.validators.invalid_tx_threshold() as i64;
        let mut seen = HashSet::new();
        for tx in txs {
            if !seen.insert(tx) {
                continue;
            }
            let count = self.invalid_txs.entry(tx.clone()).or_default();
            *count += 1;
            if *count >= threshold {
                // Pushed below any reachable count, so it is reported only once.
                *count -= size;
                self.reported_txs.push(tx.clone());
            }
        }
    }

    /// Takes the transactions which crossed the invalid-tx threshold since the last call.
    pub fn take_invalid_txs(&mut self) -> Vec<TxId> {
        std::mem::take(&mut self.reported_txs)
    }

    /// Number of distinct voters.
    pub fn sum(&self) -> usize {
        self.votes.len()
    }

    /// Number of votes for the given hash.
    pub fn votes_for(&self, hash: Option<BlockHash>) -> usize {
        self.block_votes.get(&hash).copied().unwrap_or(0)
    }

    /// Vote of the given voter, if any.
    pub fn get(&self, voter: &ValidatorId) -> Option<&Signed<Vote>> {
        self.votes.get(voter)
    }

    /// All the accepted votes, by voter.
    pub fn votes(&self) -> impl Iterator<Item = &Signed<Vote>> {
        self.votes.values()
    }

    /// Hash which gathered a quorum: `Some(None)` is a nil quorum.
    pub fn two_thirds_majority(&self) -> Option<Option<BlockHash>> {
        self.maj23
    }

    /// Votes which formed the quorum.
    pub fn maj23_votes(&self) -> impl Iterator<Item = &Signed<Vote>> {
        self.maj23_votes.values()
    }

    /// Returns `true` as long as a quorum on a single hash can still be reached,
    /// assuming that all the validators who haven't voted yet vote for the
    /// leading hash.
    pub fn has_two_thirds_any(&self) -> bool {
        if self.maj23.is_some() {
            return true;
        }
        let best = self.block_votes.values().copied().max().unwrap_or(0);
        let missing = self.validators.len().saturating_sub(self.sum());
        best + missing >= self.validators.quorum_threshold()
    }

    /// Returns `true` if a quorum of voters has voted but no single hash has a quorum.
    pub fn has_two_thirds_no_majority(&self) -> bool {
        self.maj23.is_none() && self.sum() >= self.validators.quorum_threshold()
    }

    /// Returns `true` if a quorum of the voters has voted, for anything.
    pub fn has_quorum_of_voters(&self) -> bool {
        self.sum() >= self.validators.quorum_threshold()
    }
}
