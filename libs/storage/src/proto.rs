//! Wire schema of the WAL records.
use tbft_roles::proto::Signed;

/// Outcome of a block verification.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Verified {
    /// Height of the block.
    #[prost(uint64, optional, tag = "1")]
    pub height: Option<u64>,
    /// Round of the proposal.
    #[prost(uint32, optional, tag = "2")]
    pub round: Option<u32>,
    /// Hash of the block.
    #[prost(bytes = "vec", optional, tag = "3")]
    pub hash: Option<Vec<u8>>,
    /// Whether the block is valid.
    #[prost(bool, optional, tag = "4")]
    pub ok: Option<bool>,
    /// Ids of the transactions found invalid.
    #[prost(string, repeated, tag = "5")]
    pub invalid_txs: Vec<String>,
}

/// Fired timeout.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Timeout {
    /// Height of the timeout.
    #[prost(uint64, optional, tag = "1")]
    pub height: Option<u64>,
    /// Round of the timeout.
    #[prost(uint32, optional, tag = "2")]
    pub round: Option<u32>,
    /// Step of the timeout.
    #[prost(enumeration = "tbft_roles::proto::Step", optional, tag = "3")]
    pub step: Option<i32>,
    /// Set for the optimal propose timeout.
    #[prost(bool, optional, tag = "4")]
    pub optimal: Option<bool>,
}

/// Compaction point.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Checkpoint {
    /// Height of the last committed block.
    #[prost(uint64, optional, tag = "1")]
    pub height: Option<u64>,
}

/// WAL record.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WalEntry {
    /// Record body.
    #[prost(oneof = "wal_entry::T", tags = "1, 2, 3, 4, 5")]
    pub t: Option<wal_entry::T>,
}

/// Nested types of [`WalEntry`].
pub mod wal_entry {
    /// Variants of a WAL record.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum T {
        /// Accepted proposal.
        #[prost(message, tag = "1")]
        Proposal(super::Signed),
        /// Accepted or own vote.
        #[prost(message, tag = "2")]
        Vote(super::Signed),
        /// Verification outcome.
        #[prost(message, tag = "3")]
        Verified(super::Verified),
        /// Fired timeout.
        #[prost(message, tag = "4")]
        Timeout(super::Timeout),
        /// Compaction point.
        #[prost(message, tag = "5")]
        Checkpoint(super::Checkpoint),
    }
}
