//! Test-only utilities.
use rand::{
    distributions::{Distribution, Standard},
    Rng,
};

use super::{
    sign_msg, Block, BlockHash, BlockVersion, ConsensusMsg, Height, LocalSigner, Payload,
    Proposal, Round, SecretKey, Signature, Signed, TxId, ValidatorId, ValidatorSet, Vote,
    VoteType,
};

/// Test setup: a validator set together with the validators' keys.
#[derive(Debug, Clone)]
pub struct Setup {
    /// Validators' secret keys, in the validator set order.
    pub keys: Vec<SecretKey>,
    /// The validator set.
    pub validators: ValidatorSet,
}

impl Setup {
    /// Setup with `n` validators and `blocks_per_proposer == 1`.
    pub fn new(rng: &mut impl Rng, n: usize) -> Self {
        Self::with_blocks_per_proposer(rng, n, 1)
    }

    /// Setup with `n` validators.
    pub fn with_blocks_per_proposer(rng: &mut impl Rng, n: usize, bpp: u64) -> Self {
        let ids: Vec<_> = (0..n).map(validator_id).collect();
        Self {
            keys: (0..n).map(|_| rng.gen()).collect(),
            // Ids are zero padded, so the sorted order is the construction order.
            validators: ValidatorSet::new(ids, bpp).unwrap(),
        }
    }

    /// Ids of the validators.
    pub fn ids(&self) -> Vec<ValidatorId> {
        self.validators.iter().cloned().collect()
    }

    /// Signer of the i-th validator.
    pub fn signer(&self, i: usize) -> LocalSigner {
        LocalSigner::new(
            self.validators.get(i).unwrap().clone(),
            self.keys[i].clone(),
        )
    }

    /// Signers of all the validators.
    pub fn signers(&self) -> Vec<LocalSigner> {
        (0..self.keys.len()).map(|i| self.signer(i)).collect()
    }

    /// Constructs a vote of the i-th validator.
    pub fn vote(
        &self,
        i: usize,
        vote_type: VoteType,
        height: Height,
        round: Round,
        hash: Option<BlockHash>,
    ) -> Signed<Vote> {
        let vote = Vote {
            vote_type,
            voter: self.validators.get(i).unwrap().clone(),
            height,
            round,
            hash,
            invalid_txs: vec![],
        };
        sign_msg(&self.signer(i), vote).unwrap()
    }

    /// Constructs a block on top of `parent`, proposed by the i-th validator.
    pub fn make_block(&self, rng: &mut impl Rng, i: usize, parent: &Block) -> Block {
        Block {
            height: parent.height.next(),
            version: parent.version,
            pre_hash: parent.hash(),
            proposer: self.validators.get(i).unwrap().clone(),
            txs: vec![],
            payload: rng.gen(),
        }
    }
}

/// Id of the i-th test validator.
pub fn validator_id(i: usize) -> ValidatorId {
    ValidatorId(format!("validator-{i:03}"))
}

impl Distribution<SecretKey> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SecretKey {
        let bytes: [u8; 32] = rng.gen();
        SecretKey::decode(&bytes).unwrap()
    }
}

impl Distribution<BlockHash> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> BlockHash {
        BlockHash(rng.gen())
    }
}

impl Distribution<Payload> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Payload {
        let size: usize = rng.gen_range(500..1000);
        Payload((0..size).map(|_| rng.gen()).collect())
    }
}

impl Distribution<ValidatorId> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ValidatorId {
        validator_id(rng.gen_range(0..100))
    }
}

impl Distribution<Block> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Block {
        Block {
            height: Height(rng.gen_range(1..1000)),
            version: BlockVersion(rng.gen_range(2000..3000)),
            pre_hash: rng.gen(),
            proposer: rng.gen(),
            txs: (0..rng.gen_range(0..5))
                .map(|i| TxId(format!("tx-{i}")))
                .collect(),
            payload: rng.gen(),
        }
    }
}

impl Distribution<Vote> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vote {
        Vote {
            vote_type: if rng.gen() {
                VoteType::Prevote
            } else {
                VoteType::Precommit
            },
            voter: rng.gen(),
            height: Height(rng.gen_range(1..1000)),
            round: Round(rng.gen_range(0..10)),
            hash: rng.gen::<bool>().then(|| rng.gen()),
            invalid_txs: (0..rng.gen_range(0..3))
                .map(|i| TxId(format!("tx-{i}")))
                .collect(),
        }
    }
}

impl Distribution<Proposal> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Proposal {
        let block: Block = rng.gen();
        let round = Round(rng.gen_range(0..10));
        Proposal {
            voter: block.proposer.clone(),
            height: block.height,
            round,
            pol_round: rng
                .gen::<bool>()
                .then(|| Round(rng.gen_range(0..=round.0))),
            block,
        }
    }
}

impl Distribution<ConsensusMsg> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ConsensusMsg {
        let vote: Vote = rng.gen();
        match rng.gen_range(0..3) {
            0 => ConsensusMsg::Proposal(rng.gen()),
            1 => ConsensusMsg::Prevote(Vote {
                vote_type: VoteType::Prevote,
                ..vote
            }),
            _ => ConsensusMsg::Precommit(Vote {
                vote_type: VoteType::Precommit,
                ..vote
            }),
        }
    }
}

impl Distribution<Signed<ConsensusMsg>> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Signed<ConsensusMsg> {
        let msg: ConsensusMsg = rng.gen();
        Signed {
            signer: msg.voter().clone(),
            msg,
            sig: Signature((0..64).map(|_| rng.gen()).collect()),
        }
    }
}
