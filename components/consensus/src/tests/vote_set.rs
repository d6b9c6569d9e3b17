use std::sync::Arc;

use assert_matches::assert_matches;
use rand::{rngs::StdRng, seq::SliceRandom as _, Rng as _, SeedableRng as _};
use tbft_roles::validator::{
    self, testonly::Setup, BlockHash, Height, LocalSigner, Round, TxId, ValidatorId, Vote,
    VoteType,
};
use test_casing::test_casing;

use crate::{vote_set::Error, HeightRoundVoteSet, VoteSet};

const H: Height = Height(7);
const R: Round = Round(2);

fn setup(n: usize) -> (StdRng, Setup, VoteSet) {
    let mut rng = StdRng::seed_from_u64(n as u64);
    let setup = Setup::new(&mut rng, n);
    let set = VoteSet::new(VoteType::Prevote, H, R, Arc::new(setup.validators.clone()));
    (rng, setup, set)
}

#[test]
fn quorum_is_reached_at_threshold() {
    let (mut rng, setup, mut set) = setup(4);
    let hash: BlockHash = rng.gen();
    assert_eq!(setup.validators.quorum_threshold(), 3);
    for i in 0..2 {
        assert!(set.add_vote(setup.vote(i, VoteType::Prevote, H, R, Some(hash))).unwrap());
        assert_eq!(set.two_thirds_majority(), None);
    }
    assert!(set.add_vote(setup.vote(2, VoteType::Prevote, H, R, Some(hash))).unwrap());
    assert_eq!(set.two_thirds_majority(), Some(Some(hash)));
    assert_eq!(set.sum(), 3);
    assert_eq!(set.votes_for(Some(hash)), 3);
    assert_eq!(set.maj23_votes().count(), 3);
}

#[test]
fn nil_quorum() {
    let (_, setup, mut set) = setup(4);
    for i in 1..4 {
        set.add_vote(setup.vote(i, VoteType::Prevote, H, R, None)).unwrap();
    }
    assert_eq!(set.two_thirds_majority(), Some(None));
    assert!(set.has_two_thirds_any());
}

#[test_casing(5, 0..5)]
#[test]
fn quorum_does_not_depend_on_arrival_order(seed: usize) {
    let (mut rng, setup, _) = setup(7);
    let a: BlockHash = rng.gen();
    let b: BlockHash = rng.gen();
    let mut votes: Vec<_> = (0..7)
        .map(|i| {
            let hash = match i {
                0..=4 => Some(a),
                5 => Some(b),
                _ => None,
            };
            setup.vote(i, VoteType::Prevote, H, R, hash)
        })
        .collect();
    votes.shuffle(&mut StdRng::seed_from_u64(seed as u64));

    let mut set = VoteSet::new(VoteType::Prevote, H, R, Arc::new(setup.validators.clone()));
    for v in votes {
        set.add_vote(v).unwrap();
    }
    assert_eq!(set.two_thirds_majority(), Some(Some(a)));
    assert_eq!(set.sum(), 7);
    assert_eq!(set.votes_for(Some(a)), 5);
    assert_eq!(set.votes_for(Some(b)), 1);
    assert_eq!(set.votes_for(None), 1);
}

#[test]
fn duplicate_vote_is_idempotent() {
    let (mut rng, setup, mut set) = setup(4);
    let v = setup.vote(1, VoteType::Prevote, H, R, Some(rng.gen()));
    assert!(set.add_vote(v.clone()).unwrap());
    assert!(!set.add_vote(v).unwrap());
    assert_eq!(set.sum(), 1);
}

#[test]
fn equivocation_is_rejected() {
    let (mut rng, setup, mut set) = setup(4);
    let a: BlockHash = rng.gen();
    let b: BlockHash = rng.gen();
    set.add_vote(setup.vote(1, VoteType::Prevote, H, R, Some(a))).unwrap();
    assert_matches!(
        set.add_vote(setup.vote(1, VoteType::Prevote, H, R, Some(b))),
        Err(Error::VoteForDifferentHash { existing, got, .. }) => {
            assert_eq!(existing, Some(a));
            assert_eq!(got, Some(b));
        }
    );
    // Nil is a different vote too.
    assert_matches!(
        set.add_vote(setup.vote(1, VoteType::Prevote, H, R, None)),
        Err(Error::VoteForDifferentHash { .. })
    );
    assert_eq!(set.sum(), 1);
    assert_eq!(set.get(&setup.ids()[1]).unwrap().msg.hash, Some(a));
}

#[test]
fn vote_from_non_validator() {
    let (mut rng, _, mut set) = setup(4);
    let stranger = LocalSigner::new(ValidatorId::from("stranger"), rng.gen());
    let vote = Vote {
        vote_type: VoteType::Prevote,
        voter: ValidatorId::from("stranger"),
        height: H,
        round: R,
        hash: None,
        invalid_txs: vec![],
    };
    let vote = validator::sign_msg(&stranger, vote).unwrap();
    assert_matches!(set.add_vote(vote), Err(Error::InvalidValidator(_)));
    assert_eq!(set.sum(), 0);
}

#[test]
fn vote_signed_by_someone_else() {
    let (_, setup, mut set) = setup(4);
    let mut vote = setup.vote(1, VoteType::Prevote, H, R, None);
    vote.signer = setup.ids()[2].clone();
    assert_matches!(set.add_vote(vote), Err(Error::InvalidSigner { .. }));
}

#[test]
fn vote_for_another_step() {
    let (_, setup, mut set) = setup(4);
    assert_matches!(
        set.add_vote(setup.vote(1, VoteType::Precommit, H, R, None)),
        Err(Error::UnexpectedStep { .. })
    );
    assert_matches!(
        set.add_vote(setup.vote(1, VoteType::Prevote, H, R.next(), None)),
        Err(Error::UnexpectedStep { .. })
    );
    assert_matches!(
        set.add_vote(setup.vote(1, VoteType::Prevote, H.next(), R, None)),
        Err(Error::UnexpectedStep { .. })
    );
}

#[test]
fn split_vote_makes_quorum_unreachable() {
    let (mut rng, setup, mut set) = setup(4);
    let a: BlockHash = rng.gen();
    let b: BlockHash = rng.gen();
    set.add_vote(setup.vote(0, VoteType::Prevote, H, R, Some(a))).unwrap();
    set.add_vote(setup.vote(1, VoteType::Prevote, H, R, Some(a))).unwrap();
    set.add_vote(setup.vote(2, VoteType::Prevote, H, R, Some(b))).unwrap();
    // The last validator could still make a quorum for `a`.
    assert!(set.has_two_thirds_any());
    assert!(set.has_two_thirds_no_majority());
    set.add_vote(setup.vote(3, VoteType::Prevote, H, R, Some(b))).unwrap();
    assert!(!set.has_two_thirds_any());
    assert!(set.has_two_thirds_no_majority());
    assert!(set.has_quorum_of_voters());
    assert_eq!(set.two_thirds_majority(), None);
}

#[test]
fn invalid_txs_are_reported_once() {
    let (_, setup, mut set) = setup(4);
    assert_eq!(setup.validators.invalid_tx_threshold(), 2);
    let tx = TxId("tx-1".into());
    for i in 0..4 {
        let mut vote = setup.vote(i, VoteType::Prevote, H, R, None).msg;
        vote.invalid_txs = vec![tx.clone(), tx.clone()];
        set.add_vote(validator::sign_msg(&setup.signer(i), vote).unwrap())
            .unwrap();
        let reported = set.take_invalid_txs();
        if i == 1 {
            assert_eq!(reported, vec![tx.clone()]);
        } else {
            assert!(reported.is_empty(), "reported {reported:?} after vote {i}");
        }
    }
}

#[test]
fn height_round_vote_set_creates_rounds_on_demand() {
    let (mut rng, setup, _) = setup(4);
    let mut votes = HeightRoundVoteSet::new(H, Arc::new(setup.validators.clone()));
    let hash: BlockHash = rng.gen();
    votes
        .add_vote(setup.vote(1, VoteType::Prevote, H, Round(0), Some(hash)))
        .unwrap();
    votes
        .add_vote(setup.vote(2, VoteType::Precommit, H, Round(3), None))
        .unwrap();
    let rounds: Vec<_> = votes.rounds().map(|(r, _)| *r).collect();
    assert_eq!(rounds, vec![Round(0), Round(3)]);
    assert_eq!(votes.prevotes(Round(0)).unwrap().sum(), 1);
    assert_eq!(votes.precommits(Round(3)).unwrap().sum(), 1);
    assert!(votes.prevotes(Round(1)).is_none());

    let v = setup.vote(1, VoteType::Prevote, H, Round(0), Some(hash)).msg;
    assert!(!votes.is_required(Round(0), &v));
    let v = setup.vote(1, VoteType::Precommit, H, Round(0), Some(hash)).msg;
    assert!(votes.is_required(Round(0), &v));
    let mut v = v;
    v.voter = ValidatorId::from("stranger");
    assert!(!votes.is_required(Round(0), &v));
}
