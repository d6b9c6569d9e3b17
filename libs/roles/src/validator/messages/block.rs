//! Blocks and the primitives they are built from.
use std::fmt;

use sha3::{Digest as _, Keccak256};

use crate::validator::ValidatorId;

/// Sequential number of the block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Height(pub u64);

impl Height {
    /// Returns the next height.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the previous height.
    pub fn prev(self) -> Option<Self> {
        Some(Self(self.0.checked_sub(1)?))
    }
}

impl fmt::Display for Height {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, formatter)
    }
}

/// Version of the block format, set by the block producer.
/// Some protocol rules (like proposer selection) depend on it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockVersion(pub u32);

/// Hash of a block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// Length of the hash in bytes.
    pub const LEN: usize = 32;

    /// Hash of the parent of the genesis block.
    pub const ZERO: Self = Self([0; 32]);

    /// Parses a hash from bytes.
    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        let bytes: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|_| anyhow::format_err!("invalid hash length {}", bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Raw bytes of the hash.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "block:keccak256:{}", hex::encode(self.0))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form for logs.
        fmt.write_str(&hex::encode(&self.0[..6]))
    }
}

/// Id of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(pub String);

impl fmt::Display for TxId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Payload of the block. Consensus does not interpret the payload,
/// building and executing it is up to the block producer and verifier.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Payload(pub Vec<u8>);

impl fmt::Debug for Payload {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Payload")
            .field("len", &self.0.len())
            .finish()
    }
}

impl Payload {
    /// Returns the length of the payload.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A block. Exactly one block gets committed at every height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Height of the block.
    pub height: Height,
    /// Block format version.
    pub version: BlockVersion,
    /// Hash of the parent block.
    pub pre_hash: BlockHash,
    /// Validator which proposed this block.
    /// Empty for the genesis block.
    pub proposer: ValidatorId,
    /// Ids of the transactions included in the block.
    pub txs: Vec<TxId>,
    /// Opaque block content.
    pub payload: Payload,
}

impl Block {
    /// Genesis block: height 0, without a proposer.
    pub fn genesis(version: BlockVersion) -> Self {
        Self {
            height: Height(0),
            version,
            pre_hash: BlockHash::ZERO,
            proposer: ValidatorId::default(),
            txs: vec![],
            payload: Payload::default(),
        }
    }

    /// Hash of the block.
    pub fn hash(&self) -> BlockHash {
        BlockHash(Keccak256::digest(tbft_protobuf::encode(self)).into())
    }
}
