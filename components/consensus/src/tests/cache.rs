use rand::{rngs::StdRng, Rng as _, SeedableRng as _};
use tbft_roles::validator::{ConsensusMsg, Height, Round, Signed, Step};

use crate::{CacheOutcome, FutureMsgCache, StateCache, StateSnapshot};

fn msg_at(rng: &mut StdRng, height: Height, round: Round) -> Signed<ConsensusMsg> {
    let mut msg: Signed<ConsensusMsg> = rng.gen();
    match &mut msg.msg {
        ConsensusMsg::Proposal(p) => {
            p.height = height;
            p.round = round;
        }
        ConsensusMsg::Prevote(v) | ConsensusMsg::Precommit(v) => {
            v.height = height;
            v.round = round;
        }
    }
    msg
}

#[test]
fn future_rounds_within_limit_are_cached() {
    let rng = &mut StdRng::seed_from_u64(1);
    let mut cache = FutureMsgCache::new(2, 3);
    let (h, r) = (Height(5), Round(1));
    let msg = msg_at(rng, h, Round(4));
    assert_eq!(cache.add(h, r, msg.clone()), CacheOutcome::Cached);
    assert_eq!(cache.add(h, r, msg.clone()), CacheOutcome::Duplicate);
    assert_eq!(cache.add(h, r, msg_at(rng, h, Round(5))), CacheOutcome::Dropped);
    assert_eq!(cache.add(h, r, msg_at(rng, h, r)), CacheOutcome::Dropped);
    assert_eq!(cache.add(h, r, msg_at(rng, Height(4), Round(9))), CacheOutcome::Dropped);
    assert_eq!(cache.len(), 1);

    assert!(cache.take_round(h, Round(3)).is_empty());
    assert_eq!(cache.take_round(h, Round(4)), vec![msg]);
    assert_eq!(cache.len(), 0);
}

#[test]
fn future_heights_within_limit_are_cached() {
    let rng = &mut StdRng::seed_from_u64(2);
    let mut cache = FutureMsgCache::new(2, 3);
    let (h, r) = (Height(5), Round(0));
    let next = msg_at(rng, Height(6), Round(3));
    let after = msg_at(rng, Height(7), Round(0));
    assert_eq!(cache.add(h, r, next.clone()), CacheOutcome::Cached);
    assert_eq!(cache.add(h, r, after.clone()), CacheOutcome::Cached);
    assert_eq!(cache.add(h, r, msg_at(rng, Height(8), Round(0))), CacheOutcome::Dropped);
    assert_eq!(cache.add(h, r, msg_at(rng, Height(6), Round(4))), CacheOutcome::Dropped);
    assert_eq!(cache.add(h, r, msg_at(rng, h, Round(1))), CacheOutcome::Cached);

    // Taking a height drops everything older.
    assert_eq!(cache.take_height(Height(6)), vec![next]);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.take_height(Height(7)), vec![after]);
    assert_eq!(cache.len(), 0);
}

fn snapshot(height: u64) -> StateSnapshot {
    StateSnapshot {
        height: Height(height),
        round: Round(0),
        step: Step::Commit,
        proposal: None,
        locked_round: None,
        locked_hash: None,
        valid_round: None,
        valid_hash: None,
        decision: None,
        rounds: vec![],
    }
}

#[test]
fn state_cache_keeps_recent_heights() {
    let cache = StateCache::new(2);
    assert_eq!(cache.live(), None);
    for h in 1..=3 {
        cache.push_committed(snapshot(h));
    }
    assert_eq!(cache.heights(), vec![Height(2), Height(3)]);
    assert_eq!(cache.get(Height(1)), None);
    assert_eq!(cache.get(Height(3)), Some(snapshot(3)));

    let mut live = snapshot(4);
    live.step = Step::Propose;
    cache.set_live(live.clone());
    assert_eq!(cache.get(Height(4)), Some(live.clone()));
    assert_eq!(cache.live(), Some(live));
}

#[test]
fn future_height_rounds_are_bounded() {
    let rng = &mut StdRng::seed_from_u64(3);
    let mut cache = FutureMsgCache::new(2, 3);
    let (h, r) = (Height(5), Round(0));
    let mut cached = 0;
    for round in 0..1000 {
        if cache.add(h, r, msg_at(rng, Height(6), Round(round))) == CacheOutcome::Cached {
            cached += 1;
        }
    }
    assert_eq!(cached, 4);
    assert_eq!(cache.len(), 4);
    assert_eq!(cache.take_height(Height(6)).len(), 4);
}
