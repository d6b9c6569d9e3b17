//! Tendermint-style BFT consensus engine.
//!
//! A fixed validator set decides one block per height. Every height goes
//! through rounds of propose, prevote and precommit steps; a block is
//! committed once more than two thirds of the validators precommit it. A
//! validator which precommitted a block is locked on it and doesn't prevote
//! for another block, unless it sees a newer prevote quorum for that block.
//!
//! The engine runs as a single task ([`ConsensusEngine::run`]). It receives
//! consensus messages through a [`Handle`] and publishes outbound messages
//! and notifications on an event bus. Blocks are built, verified and stored
//! by the execution layer through [`tbft_engine::EngineManager`]. Every
//! input which changes the state is written to a write-ahead log first, so a
//! restarted node resumes the height exactly where it crashed.
mod cache;
mod config;
mod engine;
mod height_round_vote_set;
mod io;
mod metrics;
mod state;
pub mod testonly;
#[cfg(test)]
mod tests;
mod timeout;
mod vote_set;

pub use crate::{
    cache::{CacheOutcome, FutureMsgCache, StateCache},
    config::{ChainConfig, Config, TimeoutConfig},
    engine::ConsensusEngine,
    height_round_vote_set::{HeightRoundVoteSet, RoundVoteSet},
    io::{ConsensusEvent, EventTopic, Handle, NetMessage, NetMsgType},
    state::{ConsensusState, RoundSummary, StateSnapshot, Verdict, VoteSummary},
    timeout::{TimeoutInfo, TimeoutScheduler},
    vote_set::{Error as VoteSetError, VoteSet},
};
