//! Wire schema of the validator messages.
//!
//! All the scalar fields have explicit presence, so that the conversion code
//! in `validator::conv` can reject messages with missing fields.

/// Type of a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum VoteType {
    /// Prevote.
    Prevote = 0,
    /// Precommit.
    Precommit = 1,
}

/// Step of a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Step {
    /// NewHeight.
    NewHeight = 0,
    /// NewRound.
    NewRound = 1,
    /// Propose.
    Propose = 2,
    /// Prevote.
    Prevote = 3,
    /// PrevoteWait.
    PrevoteWait = 4,
    /// Precommit.
    Precommit = 5,
    /// PrecommitWait.
    PrecommitWait = 6,
    /// Commit.
    Commit = 7,
}

/// Block.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Block {
    /// Height of the block.
    #[prost(uint64, optional, tag = "1")]
    pub height: Option<u64>,
    /// Block version.
    #[prost(uint32, optional, tag = "2")]
    pub version: Option<u32>,
    /// Hash of the parent block.
    #[prost(bytes = "vec", optional, tag = "3")]
    pub pre_hash: Option<Vec<u8>>,
    /// Validator that proposed the block.
    #[prost(string, optional, tag = "4")]
    pub proposer: Option<String>,
    /// Ids of the transactions in the block.
    #[prost(string, repeated, tag = "5")]
    pub txs: Vec<String>,
    /// Opaque payload.
    #[prost(bytes = "vec", optional, tag = "6")]
    pub payload: Option<Vec<u8>>,
}

/// Proposal.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Proposal {
    /// Proposer.
    #[prost(string, optional, tag = "1")]
    pub voter: Option<String>,
    /// Height.
    #[prost(uint64, optional, tag = "2")]
    pub height: Option<u64>,
    /// Round.
    #[prost(uint32, optional, tag = "3")]
    pub round: Option<u32>,
    /// Proof-of-lock round. Absent if the proposer didn't observe one.
    #[prost(uint32, optional, tag = "4")]
    pub pol_round: Option<u32>,
    /// Proposed block.
    #[prost(message, optional, tag = "5")]
    pub block: Option<Block>,
}

/// Vote.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Vote {
    /// Type of the vote.
    #[prost(enumeration = "VoteType", optional, tag = "1")]
    pub vote_type: Option<i32>,
    /// Voter.
    #[prost(string, optional, tag = "2")]
    pub voter: Option<String>,
    /// Height.
    #[prost(uint64, optional, tag = "3")]
    pub height: Option<u64>,
    /// Round.
    #[prost(uint32, optional, tag = "4")]
    pub round: Option<u32>,
    /// Hash of the block voted for. Absent for a nil vote.
    #[prost(bytes = "vec", optional, tag = "5")]
    pub hash: Option<Vec<u8>>,
    /// Transactions the voter considers invalid.
    #[prost(string, repeated, tag = "6")]
    pub invalid_txs: Vec<String>,
}

/// Consensus message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ConsensusMsg {
    /// Message.
    #[prost(oneof = "consensus_msg::T", tags = "1, 2, 3")]
    pub t: Option<consensus_msg::T>,
}

/// Nested types of [`ConsensusMsg`].
pub mod consensus_msg {
    /// Variants of a consensus message.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum T {
        /// Proposal.
        #[prost(message, tag = "1")]
        Proposal(super::Proposal),
        /// Prevote.
        #[prost(message, tag = "2")]
        Prevote(super::Vote),
        /// Precommit.
        #[prost(message, tag = "3")]
        Precommit(super::Vote),
    }
}

/// Signed consensus message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Signed {
    /// Signed message.
    #[prost(message, optional, tag = "1")]
    pub msg: Option<ConsensusMsg>,
    /// Signer.
    #[prost(string, optional, tag = "2")]
    pub signer: Option<String>,
    /// Signature.
    #[prost(bytes = "vec", optional, tag = "3")]
    pub sig: Option<Vec<u8>>,
}
