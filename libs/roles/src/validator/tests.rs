use assert_matches::assert_matches;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tbft_protobuf::{testonly::test_encode_random, ProtoFmt as _};
use tbft_utils::enum_util::Variant as _;

use super::{testonly::*, *};

fn rng() -> StdRng {
    StdRng::seed_from_u64(29483920)
}

fn ids(n: usize) -> Vec<ValidatorId> {
    (0..n).map(validator_id).collect()
}

const V1: BlockVersion = BlockVersion(2000);
const V2: BlockVersion = PROPOSER_V2_BLOCK_VERSION;

#[test]
fn test_schema_encoding() {
    let rng = &mut rng();
    test_encode_random::<Block>(rng);
    test_encode_random::<Proposal>(rng);
    test_encode_random::<Vote>(rng);
    test_encode_random::<ConsensusMsg>(rng);
    test_encode_random::<Signed<ConsensusMsg>>(rng);
}

#[test]
fn test_vote_type_mismatch_is_rejected() {
    let rng = &mut rng();
    let vote = Vote {
        vote_type: VoteType::Precommit,
        ..rng.gen()
    };
    let mut bad = ConsensusMsg::Precommit(vote).build();
    bad.t = match bad.t {
        Some(crate::proto::consensus_msg::T::Precommit(v)) => {
            Some(crate::proto::consensus_msg::T::Prevote(v))
        }
        t => t,
    };
    assert!(tbft_protobuf::decode::<ConsensusMsg>(&prost::Message::encode_to_vec(&bad)).is_err());
}

#[test]
fn test_block_hash_depends_on_content() {
    let rng = &mut rng();
    let block: Block = rng.gen();
    assert_eq!(block.hash(), block.clone().hash());
    let mut other = block.clone();
    other.txs.push(TxId("extra".into()));
    assert_ne!(block.hash(), other.hash());
}

#[test]
fn test_signature_verification() {
    let rng = &mut rng();
    let setup = Setup::new(rng, 4);
    let vote = setup.vote(1, VoteType::Prevote, Height(5), Round(0), Some(rng.gen()));
    vote.verify(&setup.keys[1].public()).unwrap();
    assert!(vote.verify(&setup.keys[2].public()).is_err());

    let mut forged = vote.clone();
    forged.msg.hash = None;
    assert!(forged.verify(&setup.keys[1].public()).is_err());
}

#[test]
fn test_signed_cast() {
    let rng = &mut rng();
    let setup = Setup::new(rng, 4);
    let vote = setup.vote(0, VoteType::Precommit, Height(1), Round(2), None);
    let msg: Signed<ConsensusMsg> = vote.clone().cast().unwrap();
    assert_matches!(&msg.msg, ConsensusMsg::Precommit(v) if v == &vote.msg);
    assert!(msg.clone().cast::<Proposal>().is_err());
    assert_eq!(msg.cast::<Vote>().unwrap(), vote);
    assert_matches!(vote.msg.insert(), ConsensusMsg::Precommit(_));
}

#[test]
fn test_validator_set_is_sorted() {
    let set = ValidatorSet::new([2, 0, 3, 1].map(validator_id), 1).unwrap();
    assert_eq!(set.iter().cloned().collect::<Vec<_>>(), ids(4));
    assert_eq!(set.index(&validator_id(3)), Some(3));
    assert!(!set.contains(&validator_id(7)));
    assert_eq!(set.quorum_threshold(), 3);
    assert_eq!(set.invalid_tx_threshold(), 2);
}

#[test]
fn test_validator_set_rejects_bad_input() {
    assert!(ValidatorSet::new([validator_id(0), validator_id(0)], 1).is_err());
    assert!(ValidatorSet::new(ids(4), 0).is_err());
}

#[test]
fn test_proposer_empty_set() {
    let set = ValidatorSet::new([], 1).unwrap();
    assert_matches!(
        set.get_proposer(V2, &validator_id(0), Height(1), Round(0)),
        Err(ValidatorSetError::InvalidIndex { size: 0, .. })
    );
}

#[test]
fn test_proposer_v1() {
    let set = ValidatorSet::new(ids(4), 1).unwrap();
    let prev = validator_id(0);
    let proposer = |h, r| set.get_proposer(V1, &prev, Height(h), Round(r)).unwrap().clone();
    assert_eq!(proposer(5, 0), validator_id(2));
    assert_eq!(proposer(5, 1), validator_id(3));
    assert_eq!(proposer(5, 2), validator_id(0));
    assert_eq!(proposer(6, 0), validator_id(3));

    let set = ValidatorSet::new(ids(4), 2).unwrap();
    let proposer = |h, r| set.get_proposer(V1, &prev, Height(h), Round(r)).unwrap().clone();
    assert_eq!(proposer(3, 0), validator_id(2));
    assert_eq!(proposer(4, 0), validator_id(2));
    assert_eq!(proposer(5, 0), validator_id(3));
}

#[test]
fn test_proposer_v2() {
    let set = ValidatorSet::new(ids(4), 1).unwrap();
    let proposer = |prev: usize, h, r| {
        set.get_proposer(V2, &validator_id(prev), Height(h), Round(r))
            .unwrap()
            .clone()
    };
    assert_eq!(proposer(1, 5, 0), validator_id(2));
    assert_eq!(proposer(1, 5, 1), validator_id(3));
    assert_eq!(proposer(1, 5, 3), validator_id(1));
    assert_eq!(proposer(3, 5, 0), validator_id(0));

    let set = ValidatorSet::new(ids(4), 2).unwrap();
    let proposer = |prev: usize, h| {
        set.get_proposer(V2, &validator_id(prev), Height(h), Round(0))
            .unwrap()
            .clone()
    };
    // The role rotates only at multiples of blocks_per_proposer.
    assert_eq!(proposer(1, 3), validator_id(1));
    assert_eq!(proposer(1, 4), validator_id(2));
}

#[test]
fn test_proposer_v2_unknown_prev() {
    let set = ValidatorSet::new(ids(4), 1).unwrap();
    let genesis = ValidatorId::default();
    assert_eq!(
        set.get_proposer(V2, &genesis, Height(1), Round(0)).unwrap(),
        &validator_id(0)
    );
    let set = ValidatorSet::new(ids(4), 2).unwrap();
    assert_eq!(
        set.get_proposer(V2, &genesis, Height(1), Round(0)).unwrap(),
        &validator_id(3)
    );
}

#[test]
fn test_proposer_version_boundary_is_configurable() {
    let set = ValidatorSet::new(ids(4), 1)
        .unwrap()
        .with_proposer_v2_version(BlockVersion(10));
    let prev = validator_id(0);
    // v1 would pick (5+1)/1 % 4 == 2, v2 picks prev+1.
    assert_eq!(
        set.get_proposer(BlockVersion(9), &prev, Height(5), Round(0)).unwrap(),
        &validator_id(2)
    );
    assert_eq!(
        set.get_proposer(BlockVersion(10), &prev, Height(5), Round(0)).unwrap(),
        &validator_id(1)
    );
}

#[test]
fn test_proposer_is_deterministic_and_fair() {
    let rng = &mut rng();
    for size in 1..8 {
        let set = ValidatorSet::new(ids(size), 1).unwrap();
        for version in [V1, V2] {
            let prev = validator_id(rng.gen_range(0..size));
            let height = Height(rng.gen_range(1..1000));
            let mut seen = std::collections::HashSet::new();
            for r in 0..size as u32 {
                let a = set.get_proposer(version, &prev, height, Round(r)).unwrap();
                let b = set.get_proposer(version, &prev, height, Round(r)).unwrap();
                assert_eq!(a, b);
                seen.insert(a.clone());
            }
            assert_eq!(seen.len(), size);
        }
    }
}
