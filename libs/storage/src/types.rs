//! Defines the schema of the write-ahead log.
use std::{fmt, io};

use anyhow::Context as _;
use tbft_protobuf::{required, ProtoFmt};
use tbft_roles::validator::{
    BlockHash, ConsensusMsg, Height, Proposal, Round, Signed, Step, TxId, Vote,
};
use tbft_utils::enum_util::Variant;

use crate::proto;

/// Durability of the WAL writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalWriteMode {
    /// Every append is fsync-ed before it returns.
    #[default]
    Sync,
    /// Appends are written to the file, but not fsync-ed.
    Async,
    /// No WAL at all. For tests and ephemeral deployments.
    Disabled,
}

/// Record of the write-ahead log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalEntry {
    /// Accepted proposal, own or received.
    Proposal(Signed<Proposal>),
    /// Accepted vote, own or received.
    Vote(Signed<Vote>),
    /// Outcome of the verification of the proposed block.
    Verified {
        /// Height of the proposal.
        height: Height,
        /// Round of the proposal.
        round: Round,
        /// Hash of the verified block.
        hash: BlockHash,
        /// Whether the block is valid.
        ok: bool,
        /// Transactions reported as invalid by the verifier.
        invalid_txs: Vec<TxId>,
    },
    /// Fired timeout.
    Timeout {
        /// Height.
        height: Height,
        /// Round.
        round: Round,
        /// Step the timeout was scheduled for.
        step: Step,
        /// Whether it was the optimal propose timeout.
        optimal: bool,
    },
    /// Everything up to and including `height` has been committed.
    Checkpoint {
        /// Last committed height.
        height: Height,
    },
}

impl WalEntry {
    /// Height the entry refers to.
    pub fn height(&self) -> Height {
        match self {
            Self::Proposal(p) => p.msg.height,
            Self::Vote(v) => v.msg.height,
            Self::Verified { height, .. }
            | Self::Timeout { height, .. }
            | Self::Checkpoint { height } => *height,
        }
    }

    /// Label of the entry type, for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Proposal(_) => "proposal",
            Self::Vote(_) => "vote",
            Self::Verified { .. } => "verified",
            Self::Timeout { .. } => "timeout",
            Self::Checkpoint { .. } => "checkpoint",
        }
    }
}

fn read_signed<V: Variant<ConsensusMsg>>(
    r: &tbft_roles::proto::Signed,
) -> anyhow::Result<Signed<V>> {
    let msg: Signed<ConsensusMsg> = ProtoFmt::read(r)?;
    msg.cast().context("unexpected message type")
}

fn build_signed<V: Variant<ConsensusMsg> + Clone>(
    msg: &Signed<V>,
) -> tbft_roles::proto::Signed {
    let msg: Signed<ConsensusMsg> = Signed {
        msg: msg.msg.clone().insert(),
        signer: msg.signer.clone(),
        sig: msg.sig.clone(),
    };
    msg.build()
}

impl ProtoFmt for WalEntry {
    type Proto = proto::WalEntry;

    fn read(r: &Self::Proto) -> anyhow::Result<Self> {
        use proto::wal_entry::T;
        Ok(match required(&r.t)? {
            T::Proposal(r) => Self::Proposal(read_signed(r).context("proposal")?),
            T::Vote(r) => Self::Vote(read_signed(r).context("vote")?),
            T::Verified(r) => Self::Verified {
                height: Height(*required(&r.height).context("height")?),
                round: Round(*required(&r.round).context("round")?),
                hash: BlockHash::decode(required(&r.hash).context("hash")?).context("hash")?,
                ok: *required(&r.ok).context("ok")?,
                invalid_txs: r.invalid_txs.iter().cloned().map(TxId).collect(),
            },
            T::Timeout(r) => Self::Timeout {
                height: Height(*required(&r.height).context("height")?),
                round: Round(*required(&r.round).context("round")?),
                step: Step::read(*required(&r.step).context("step")?).context("step")?,
                optimal: r.optimal.unwrap_or(false),
            },
            T::Checkpoint(r) => Self::Checkpoint {
                height: Height(*required(&r.height).context("height")?),
            },
        })
    }

    fn build(&self) -> Self::Proto {
        use proto::wal_entry::T;
        let t = match self {
            Self::Proposal(p) => T::Proposal(build_signed(p)),
            Self::Vote(v) => T::Vote(build_signed(v)),
            Self::Verified {
                height,
                round,
                hash,
                ok,
                invalid_txs,
            } => T::Verified(proto::Verified {
                height: Some(height.0),
                round: Some(round.0),
                hash: Some(hash.0.to_vec()),
                ok: Some(*ok),
                invalid_txs: invalid_txs.iter().map(|x| x.0.clone()).collect(),
            }),
            Self::Timeout {
                height,
                round,
                step,
                optimal,
            } => T::Timeout(proto::Timeout {
                height: Some(height.0),
                round: Some(round.0),
                step: Some(step.build() as i32),
                optimal: Some(*optimal),
            }),
            Self::Checkpoint { height } => T::Checkpoint(proto::Checkpoint {
                height: Some(height.0),
            }),
        };
        Self::Proto { t: Some(t) }
    }
}

/// Error returned by the WAL.
#[derive(Debug, thiserror::Error)]
pub enum WalError {
    /// Underlying I/O failure.
    #[error("WAL I/O: {0}")]
    Io(#[from] io::Error),
    /// A complete record failed to decode.
    #[error("WAL record at offset {offset} is corrupted: {err:#}")]
    Decode {
        /// Offset of the record in the log.
        offset: u64,
        /// Decoding error.
        err: anyhow::Error,
    },
}

/// Write-ahead log.
///
/// Calls are made from the consensus core loop only and are expected to be
/// fast, so the interface is synchronous.
pub trait Wal: 'static + fmt::Debug + Send {
    /// Write mode of the log.
    fn mode(&self) -> WalWriteMode;

    /// Appends an entry. In [`WalWriteMode::Sync`] the entry is durable once this returns.
    fn append(&mut self, entry: &WalEntry) -> Result<(), WalError>;

    /// Reads back all the entries, in order of appending.
    fn replay(&mut self) -> Result<Vec<WalEntry>, WalError>;

    /// Drops all the entries and leaves only a checkpoint for `height`.
    fn compact(&mut self, height: Height) -> Result<(), WalError>;
}

/// WAL which doesn't store anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWal;

impl Wal for NoopWal {
    fn mode(&self) -> WalWriteMode {
        WalWriteMode::Disabled
    }

    fn append(&mut self, _entry: &WalEntry) -> Result<(), WalError> {
        Ok(())
    }

    fn replay(&mut self) -> Result<Vec<WalEntry>, WalError> {
        Ok(vec![])
    }

    fn compact(&mut self, _height: Height) -> Result<(), WalError> {
        Ok(())
    }
}
