//! Test-only utilities.
use tbft_roles::validator::ValidatorId;
use tbft_storage::WalWriteMode;

use crate::ChainConfig;

#[cfg(test)]
mod run;
#[cfg(test)]
mod unit;

#[cfg(test)]
pub(crate) use self::{run::*, unit::*};

/// Installs a tracing subscriber printing to the test output.
/// The filter is taken from `RUST_LOG`. Can be called multiple times.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Chain configuration with the given validators and timeouts short enough for tests.
pub fn test_chain_config(validators: &[ValidatorId]) -> ChainConfig {
    ChainConfig {
        validators: validators.iter().map(|v| v.0.clone()).collect(),
        timeout_propose: 3_000,
        timeout_propose_delta: 500,
        timeout_prevote: 1_000,
        timeout_prevote_delta: 500,
        timeout_precommit: 1_000,
        timeout_precommit_delta: 500,
        timeout_commit: 100,
        wal_mode: WalWriteMode::Sync,
        ..ChainConfig::default()
    }
}
