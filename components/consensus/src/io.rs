//! Inputs and outputs of the consensus engine.
use std::sync::Arc;

use anyhow::Context as _;
use tbft_roles::validator::{BlockHash, ConsensusMsg, Height, Round, Signed, Step, TxId, ValidatorId};
use tbft_utils::bus::{Bus, Subscription, Topical};
use tokio::sync::{mpsc, watch};

use crate::{cache::StateCache, state::StateSnapshot};

/// Type of a network message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetMsgType {
    /// Encoded `Signed<ConsensusMsg>`.
    ConsensusMsg,
}

/// Message to be sent over the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetMessage {
    /// Encoded payload.
    pub payload: Vec<u8>,
    /// Type of the payload.
    pub msg_type: NetMsgType,
    /// Recipient; `None` is a broadcast.
    pub to: Option<ValidatorId>,
}

/// Topics of the [`ConsensusEvent`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    /// [`ConsensusEvent::NetMessage`].
    NetMessage,
    /// [`ConsensusEvent::BlockCommitted`].
    BlockCommitted,
    /// [`ConsensusEvent::InvalidTxs`].
    InvalidTxs,
    /// [`ConsensusEvent::RoundChanged`].
    RoundChanged,
}

/// Event published by the consensus engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusEvent {
    /// Outbound message.
    NetMessage(NetMessage),
    /// A block has been committed.
    BlockCommitted {
        /// Height of the block.
        height: Height,
        /// Hash of the block.
        hash: BlockHash,
        /// Round in which the block got its precommit quorum.
        round: Round,
    },
    /// Transactions reported invalid by enough validators to be removed.
    InvalidTxs {
        /// Height of the block containing them.
        height: Height,
        /// Transaction ids.
        tx_ids: Vec<TxId>,
    },
    /// The engine entered a new round (or height).
    RoundChanged {
        /// Height.
        height: Height,
        /// Round.
        round: Round,
        /// Step the engine is at.
        step: Step,
    },
}

impl Topical for ConsensusEvent {
    type Topic = EventTopic;

    fn topic(&self) -> EventTopic {
        match self {
            Self::NetMessage(_) => EventTopic::NetMessage,
            Self::BlockCommitted { .. } => EventTopic::BlockCommitted,
            Self::InvalidTxs { .. } => EventTopic::InvalidTxs,
            Self::RoundChanged { .. } => EventTopic::RoundChanged,
        }
    }
}

/// Request to the engine.
#[derive(Debug)]
pub(crate) enum Input {
    /// Consensus message from a peer.
    Message(Signed<ConsensusMsg>),
    /// New validator list, effective from the next height.
    UpdateValidators(Vec<ValidatorId>),
}

/// Handle to a running consensus engine. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Handle {
    pub(crate) inputs: mpsc::UnboundedSender<Input>,
    pub(crate) stop: Arc<watch::Sender<bool>>,
    pub(crate) bus: Arc<Bus<ConsensusEvent>>,
    pub(crate) states: Arc<StateCache>,
}

impl Handle {
    /// Delivers a consensus message received from a peer.
    /// Signatures are expected to be checked upstream.
    pub fn deliver(&self, msg: Signed<ConsensusMsg>) -> anyhow::Result<()> {
        self.inputs
            .send(Input::Message(msg))
            .map_err(|_| anyhow::format_err!("consensus engine stopped"))
    }

    /// Decodes and delivers a network payload.
    pub fn deliver_raw(&self, payload: &[u8]) -> anyhow::Result<()> {
        let msg: Signed<ConsensusMsg> =
            tbft_protobuf::decode(payload).context("malformed consensus message")?;
        self.deliver(msg)
    }

    /// Replaces the validator list, starting from the next height.
    pub fn update_validators(&self, validators: Vec<ValidatorId>) -> anyhow::Result<()> {
        self.inputs
            .send(Input::UpdateValidators(validators))
            .map_err(|_| anyhow::format_err!("consensus engine stopped"))
    }

    /// Subscribes to the engine events of the given topic.
    pub fn subscribe(&self, topic: EventTopic) -> Subscription<ConsensusEvent> {
        self.bus.subscribe(topic)
    }

    /// Event bus of the engine.
    pub fn bus(&self) -> &Arc<Bus<ConsensusEvent>> {
        &self.bus
    }

    /// State of the given height: the live state or a recently committed one.
    pub fn consensus_state(&self, height: Height) -> Option<StateSnapshot> {
        self.states.get(height)
    }

    /// Live state of the engine.
    pub fn live_state(&self) -> Option<StateSnapshot> {
        self.states.live()
    }

    /// Stops the engine.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }
}
