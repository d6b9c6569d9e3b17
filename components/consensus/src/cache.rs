//! Caches of future messages and of past consensus states.
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Mutex, PoisonError},
};

use tbft_roles::validator::{ConsensusMsg, Height, Round, Signed};

use crate::state::StateSnapshot;

/// Maximal number of messages kept for a single (height, round).
const MAX_MSGS_PER_ROUND: usize = 1024;

/// Outcome of [`FutureMsgCache::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Message stored for later.
    Cached,
    /// Message already cached.
    Duplicate,
    /// Message too far in the future, or the round is full.
    Dropped,
}

/// Messages for heights (and proposals for rounds) not reached yet.
#[derive(Debug)]
pub struct FutureMsgCache {
    height_limit: u64,
    round_limit: u32,
    msgs: BTreeMap<(Height, Round), Vec<Signed<ConsensusMsg>>>,
}

impl FutureMsgCache {
    /// Cache accepting messages up to `height_limit` heights and
    /// `round_limit` rounds ahead.
    pub fn new(height_limit: u64, round_limit: u32) -> Self {
        Self {
            height_limit,
            round_limit,
            msgs: BTreeMap::new(),
        }
    }

    /// Caches a message ahead of `(height, round)`.
    /// Messages at or behind the current round are the caller's concern.
    pub fn add(
        &mut self,
        height: Height,
        round: Round,
        msg: Signed<ConsensusMsg>,
    ) -> CacheOutcome {
        let (h, r) = (msg.msg.height(), msg.msg.round());
        // Rounds of a future height are counted from its first round.
        let in_range = if h == height {
            r > round && r.0 - round.0 <= self.round_limit
        } else {
            h > height && h.0 - height.0 <= self.height_limit && r.0 <= self.round_limit
        };
        if !in_range {
            return CacheOutcome::Dropped;
        }
        let msgs = self.msgs.entry((h, r)).or_default();
        if msgs.contains(&msg) {
            return CacheOutcome::Duplicate;
        }
        if msgs.len() >= MAX_MSGS_PER_ROUND {
            return CacheOutcome::Dropped;
        }
        msgs.push(msg);
        CacheOutcome::Cached
    }

    /// Takes all the messages of `height`, dropping everything older.
    pub fn take_height(&mut self, height: Height) -> Vec<Signed<ConsensusMsg>> {
        self.prune(height);
        let rest = self.msgs.split_off(&(height.next(), Round(0)));
        std::mem::replace(&mut self.msgs, rest)
            .into_values()
            .flatten()
            .collect()
    }

    /// Takes the messages of `(height, round)`.
    pub fn take_round(&mut self, height: Height, round: Round) -> Vec<Signed<ConsensusMsg>> {
        self.msgs.remove(&(height, round)).unwrap_or_default()
    }

    /// Drops the messages for heights below `height`.
    pub fn prune(&mut self, height: Height) {
        self.msgs = self.msgs.split_off(&(height, Round(0)));
    }

    /// Number of cached messages.
    pub fn len(&self) -> usize {
        self.msgs.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Default)]
struct StateCacheInner {
    committed: VecDeque<StateSnapshot>,
    live: Option<StateSnapshot>,
}

/// Snapshots of the consensus state of the recently committed heights,
/// plus the live state. Shared with the [`crate::Handle`]s.
#[derive(Debug)]
pub struct StateCache {
    capacity: usize,
    inner: Mutex<StateCacheInner>,
}

impl StateCache {
    /// Cache holding up to `capacity` committed heights.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::default(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StateCacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the live snapshot.
    pub fn set_live(&self, snapshot: StateSnapshot) {
        self.lock().live = Some(snapshot);
    }

    /// Records the final state of a committed height.
    pub fn push_committed(&self, snapshot: StateSnapshot) {
        let mut inner = self.lock();
        inner.committed.retain(|s| s.height != snapshot.height);
        inner.committed.push_back(snapshot);
        while inner.committed.len() > self.capacity {
            inner.committed.pop_front();
        }
    }

    /// Snapshot of the given height: live if it is being decided, cached if committed recently.
    pub fn get(&self, height: Height) -> Option<StateSnapshot> {
        let inner = self.lock();
        if let Some(live) = inner.live.as_ref().filter(|s| s.height == height) {
            return Some(live.clone());
        }
        inner.committed.iter().find(|s| s.height == height).cloned()
    }

    /// Live snapshot.
    pub fn live(&self) -> Option<StateSnapshot> {
        self.lock().live.clone()
    }

    /// Heights with a committed snapshot, in order.
    pub fn heights(&self) -> Vec<Height> {
        self.lock().committed.iter().map(|s| s.height).collect()
    }
}
