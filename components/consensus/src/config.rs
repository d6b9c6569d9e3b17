//! Configuration of the consensus engine.
use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Context as _;
use tbft_engine::EngineManager;
use tbft_roles::validator::{BlockVersion, Round, Signer, ValidatorId, ValidatorSet};
use tbft_storage::{FileWal, NoopWal, Wal, WalWriteMode};

/// Chain configuration consumed by the consensus engine.
/// Timeouts are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Ids of the validators. The order doesn't matter.
    pub validators: Vec<String>,
    /// Number of consecutive heights one proposer keeps the role.
    pub blocks_per_proposer: u64,
    /// Time to wait for the proposal in round 0.
    pub timeout_propose: u64,
    /// Increase of `timeout_propose` per round.
    pub timeout_propose_delta: u64,
    /// Time to wait for a prevote quorum in round 0.
    pub timeout_prevote: u64,
    /// Increase of `timeout_prevote` per round.
    pub timeout_prevote_delta: u64,
    /// Time to wait for a precommit quorum in round 0.
    pub timeout_precommit: u64,
    /// Increase of `timeout_precommit` per round.
    pub timeout_precommit_delta: u64,
    /// Time between a commit and the start of the next height.
    /// Also the delay between retries of a failed commit.
    pub timeout_commit: u64,
    /// Short propose timeout used for proposers known to be fast.
    pub timeout_propose_optimal: Option<u64>,
    /// Durability of the write-ahead log.
    pub wal_mode: WalWriteMode,
    /// Block version from which the proposer rotates relative to the previous proposer.
    pub proposer_v2_block_version: u32,
    /// How many heights ahead messages are cached.
    pub future_height_limit: u64,
    /// How many rounds ahead of the current one messages are accepted.
    pub future_round_limit: u32,
    /// Number of committed heights kept in the state cache.
    pub state_cache_capacity: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            validators: vec![],
            blocks_per_proposer: 1,
            timeout_propose: 30_000,
            timeout_propose_delta: 1_000,
            timeout_prevote: 30_000,
            timeout_prevote_delta: 1_000,
            timeout_precommit: 30_000,
            timeout_precommit_delta: 1_000,
            timeout_commit: 1_000,
            timeout_propose_optimal: None,
            wal_mode: WalWriteMode::Sync,
            proposer_v2_block_version: 2300,
            future_height_limit: 10,
            future_round_limit: 10,
            state_cache_capacity: 10,
        }
    }
}

impl ChainConfig {
    /// Parses the configuration from JSON. Missing fields take default values.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_json::from_str(json).context("serde_json::from_str()")?;
        cfg.validate().context("validate()")?;
        Ok(cfg)
    }

    /// Checks the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.validators.is_empty(), "no validators");
        anyhow::ensure!(self.blocks_per_proposer > 0, "blocks_per_proposer must be positive");
        anyhow::ensure!(self.timeout_propose > 0, "timeout_propose must be positive");
        if let Some(optimal) = self.timeout_propose_optimal {
            anyhow::ensure!(
                optimal < self.timeout_propose,
                "timeout_propose_optimal must be shorter than timeout_propose"
            );
        }
        self.validator_set().context("validator_set()")?;
        Ok(())
    }

    /// Validator set described by the configuration.
    pub fn validator_set(&self) -> anyhow::Result<ValidatorSet> {
        self.make_validator_set(self.validators.iter().map(|v| ValidatorId(v.clone())))
    }

    /// Validator set with the given members and the parameters of this configuration.
    pub fn make_validator_set(
        &self,
        validators: impl IntoIterator<Item = ValidatorId>,
    ) -> anyhow::Result<ValidatorSet> {
        Ok(ValidatorSet::new(validators, self.blocks_per_proposer)?
            .with_proposer_v2_version(BlockVersion(self.proposer_v2_block_version)))
    }

    /// Timeouts as durations.
    pub fn timeouts(&self) -> TimeoutConfig {
        let ms = Duration::from_millis;
        TimeoutConfig {
            propose: ms(self.timeout_propose),
            propose_delta: ms(self.timeout_propose_delta),
            prevote: ms(self.timeout_prevote),
            prevote_delta: ms(self.timeout_prevote_delta),
            precommit: ms(self.timeout_precommit),
            precommit_delta: ms(self.timeout_precommit_delta),
            commit: ms(self.timeout_commit),
            propose_optimal: self.timeout_propose_optimal.map(ms),
        }
    }

    /// Opens the WAL at `path` in the configured mode.
    pub fn open_wal(&self, path: &Path) -> anyhow::Result<Box<dyn Wal>> {
        Ok(match self.wal_mode {
            WalWriteMode::Disabled => Box::new(NoopWal),
            mode => Box::new(
                FileWal::open(path, mode).with_context(|| format!("FileWal::open({path:?})"))?,
            ),
        })
    }
}

/// Timeouts of the consensus steps. Every step timeout grows linearly with the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Propose timeout in round 0.
    pub propose: Duration,
    /// Propose timeout increase per round.
    pub propose_delta: Duration,
    /// Prevote timeout in round 0.
    pub prevote: Duration,
    /// Prevote timeout increase per round.
    pub prevote_delta: Duration,
    /// Precommit timeout in round 0.
    pub precommit: Duration,
    /// Precommit timeout increase per round.
    pub precommit_delta: Duration,
    /// Commit timeout.
    pub commit: Duration,
    /// Optimal propose timeout.
    pub propose_optimal: Option<Duration>,
}

impl TimeoutConfig {
    /// Propose timeout of the given round.
    pub fn propose(&self, round: Round) -> Duration {
        self.propose + self.propose_delta * round.0
    }

    /// Prevote timeout of the given round.
    pub fn prevote(&self, round: Round) -> Duration {
        self.prevote + self.prevote_delta * round.0
    }

    /// Precommit timeout of the given round.
    pub fn precommit(&self, round: Round) -> Duration {
        self.precommit + self.precommit_delta * round.0
    }
}

/// Everything needed to run a consensus engine.
#[derive(Debug)]
pub struct Config {
    /// Chain configuration.
    pub chain: ChainConfig,
    /// Signer of the local validator.
    pub signer: Arc<dyn Signer>,
    /// Execution layer.
    pub engine: EngineManager,
    /// Write-ahead log.
    pub wal: Box<dyn Wal>,
}
