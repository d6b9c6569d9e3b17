//! Validator set and proposer selection.
use std::{collections::BTreeSet, fmt};

use super::{BlockVersion, Height, Round, ValidatorId};

/// Block version starting from which the proposer rotates relative to the
/// proposer of the previous block.
pub const PROPOSER_V2_BLOCK_VERSION: BlockVersion = BlockVersion(2300);

/// Error returned by the proposer selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidatorSetError {
    /// The computed proposer index doesn't point into the set.
    #[error("invalid proposer index {index} for a validator set of size {size}")]
    InvalidIndex {
        /// Computed index.
        index: i64,
        /// Size of the set.
        size: usize,
    },
}

/// Ordered set of validators, fixed for a height.
///
/// Validators are kept sorted, so that all the nodes derive the same
/// proposer schedule regardless of the order in the configuration.
/// The set is immutable; a new validator list takes effect by constructing
/// a new set at a height boundary.
#[derive(Clone, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: Vec<ValidatorId>,
    blocks_per_proposer: u64,
    proposer_v2_version: BlockVersion,
}

impl ValidatorSet {
    /// Creates a new set. Fails on duplicate ids or zero `blocks_per_proposer`.
    pub fn new(
        validators: impl IntoIterator<Item = ValidatorId>,
        blocks_per_proposer: u64,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(blocks_per_proposer > 0, "blocks_per_proposer must be positive");
        let mut set = BTreeSet::new();
        for v in validators {
            anyhow::ensure!(set.insert(v.clone()), "duplicate validator {v}");
        }
        Ok(Self {
            validators: set.into_iter().collect(),
            blocks_per_proposer,
            proposer_v2_version: PROPOSER_V2_BLOCK_VERSION,
        })
    }

    /// Overrides the block version at which the v2 proposer selection kicks in.
    pub fn with_proposer_v2_version(mut self, version: BlockVersion) -> Self {
        self.proposer_v2_version = version;
        self
    }

    /// Iterates over the validators in order.
    pub fn iter(&self) -> impl Iterator<Item = &ValidatorId> {
        self.validators.iter()
    }

    /// Number of validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Returns `true` if `id` belongs to the set.
    pub fn contains(&self, id: &ValidatorId) -> bool {
        self.index(id).is_some()
    }

    /// Position of the validator in the set.
    pub fn index(&self, id: &ValidatorId) -> Option<usize> {
        self.validators.binary_search(id).ok()
    }

    /// Validator at the given position.
    pub fn get(&self, index: usize) -> Option<&ValidatorId> {
        self.validators.get(index)
    }

    /// Number of consecutive heights one proposer keeps the role.
    pub fn blocks_per_proposer(&self) -> u64 {
        self.blocks_per_proposer
    }

    /// Number of matching votes needed for a quorum: `n*2/3 + 1`.
    pub fn quorum_threshold(&self) -> usize {
        self.len() * 2 / 3 + 1
    }

    /// Number of reports needed to consider a transaction invalid: `n/3 + 1`.
    pub fn invalid_tx_threshold(&self) -> usize {
        self.len() / 3 + 1
    }

    /// Computes the proposer of `(height, round)`.
    ///
    /// `version` and `prev_proposer` describe the last committed block.
    /// Blocks older than the v2 version select `((height+1)/bpp + round) mod n`.
    /// Newer blocks rotate relative to the previous proposer: the index of
    /// `prev_proposer` (-1 if it is not a member) is advanced by one whenever
    /// `height` is a multiple of `bpp`, and then by `round`.
    pub fn get_proposer(
        &self,
        version: BlockVersion,
        prev_proposer: &ValidatorId,
        height: Height,
        round: Round,
    ) -> Result<&ValidatorId, ValidatorSetError> {
        let size = self.len() as i64;
        let invalid = |index| ValidatorSetError::InvalidIndex {
            index,
            size: self.len(),
        };
        if size == 0 {
            return Err(invalid(0));
        }
        let bpp = self.blocks_per_proposer as i64;
        let height = height.0 as i64;
        let round = i64::from(round.0);
        let index = if version < self.proposer_v2_version {
            ((height + 1) / bpp + round % size) % size
        } else {
            let mut offset = self.index(prev_proposer).map_or(-1, |i| i as i64);
            if height % bpp == 0 {
                offset += 1;
            }
            (offset + round % size).rem_euclid(size)
        };
        usize::try_from(index)
            .ok()
            .and_then(|i| self.validators.get(i))
            .ok_or(invalid(index))
    }
}

impl fmt::Debug for ValidatorSet {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("ValidatorSet")
            .field("validators", &self.validators)
            .field("blocks_per_proposer", &self.blocks_per_proposer)
            .finish()
    }
}
