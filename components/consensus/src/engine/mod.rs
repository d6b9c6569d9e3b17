//! The consensus engine: a single task owning the [`ConsensusState`] and
//! reacting to messages, timeouts and results of the execution layer.
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use anyhow::Context as _;
use tbft_engine::{EngineManager, VerifyError};
use tbft_roles::validator::{
    Block, BlockHash, ConsensusMsg, Height, Round, Signed, Signer, ValidatorId,
};
use tbft_storage::{Wal, WalEntry};
use tbft_utils::bus::Bus;
use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};

use crate::{
    cache::{FutureMsgCache, StateCache},
    config::{ChainConfig, Config, TimeoutConfig},
    io::{ConsensusEvent, Handle, Input, NetMessage, NetMsgType},
    metrics::{self, METRICS},
    state::ConsensusState,
    timeout::{TimeoutInfo, TimeoutScheduler},
};

mod commit;
pub(crate) mod proposal;
mod replay;
mod round;
mod timeout;
pub(crate) mod vote;

/// Result of a task run outside of the core loop.
#[derive(Debug)]
pub(crate) enum Internal {
    /// The block proposer built a block.
    BlockCreated {
        height: Height,
        round: Round,
        result: anyhow::Result<Block>,
    },
    /// The block verifier checked a block.
    Verified {
        height: Height,
        round: Round,
        hash: BlockHash,
        result: Result<(), VerifyError>,
    },
    /// The block committer persisted a block.
    Committed {
        height: Height,
        result: anyhow::Result<()>,
    },
}

/// Progress of the commit of the decided block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommitStatus {
    /// Nothing decided yet, or the decided block is unknown.
    Idle,
    /// Commit has to be started once the replay is over.
    Pending,
    /// `add_block()` is running.
    InFlight,
    /// `add_block()` failed, retried on the commit timeout.
    Failed,
    /// Block committed, waiting for the commit timeout to start the next height.
    Done,
}

/// The consensus engine. Built from a [`Config`]; driven by [`ConsensusEngine::run`].
#[derive(Debug)]
pub struct ConsensusEngine {
    pub(crate) chain: ChainConfig,
    pub(crate) timeouts: TimeoutConfig,
    pub(crate) signer: Arc<dyn Signer>,
    pub(crate) id: ValidatorId,
    pub(crate) engine: EngineManager,
    pub(crate) wal: Box<dyn Wal>,

    /// State of the height being decided.
    pub(crate) state: ConsensusState,
    pub(crate) scheduler: TimeoutScheduler,
    pub(crate) future: FutureMsgCache,
    pub(crate) states: Arc<StateCache>,
    pub(crate) bus: Arc<Bus<ConsensusEvent>>,

    inputs: mpsc::UnboundedReceiver<Input>,
    stop: watch::Receiver<bool>,
    internal_send: mpsc::UnboundedSender<Internal>,
    pub(crate) internal_recv: mpsc::UnboundedReceiver<Internal>,

    /// Messages taken from the future-message cache, waiting to be processed.
    pub(crate) backlog: VecDeque<Signed<ConsensusMsg>>,
    /// Validator list to switch to at the next height.
    pub(crate) pending_validators: Option<Vec<ValidatorId>>,
    /// Set while re-applying the WAL: no outbound messages, no collaborator
    /// calls, no WAL writes, no timers.
    pub(crate) replaying: bool,
    /// Blocks waiting for verification, by hash.
    pub(crate) verifying: HashSet<BlockHash>,
    /// Blocks seen during the replay without a verification outcome.
    pub(crate) unverified: HashMap<BlockHash, (Round, Block)>,
    /// Round for which a block is being built.
    pub(crate) creating: Option<(Height, Round)>,
    pub(crate) commit: CommitStatus,
    /// Proposers which missed the optimal propose timeout.
    pub(crate) slow_proposers: HashSet<ValidatorId>,

    pub(crate) height_start: Instant,
    pub(crate) round_start: Instant,
}

impl ConsensusEngine {
    /// Builds the engine. It starts at the height after the last committed block.
    pub fn new(cfg: Config) -> anyhow::Result<(Self, Handle)> {
        cfg.chain.validate().context("chain.validate()")?;
        let validators = Arc::new(cfg.chain.validator_set()?);
        let last = cfg.engine.last_committed_block();
        let (input_send, input_recv) = mpsc::unbounded_channel();
        let (stop_send, stop_recv) = watch::channel(false);
        let (internal_send, internal_recv) = mpsc::unbounded_channel();
        let bus = Arc::new(Bus::new());
        let states = Arc::new(StateCache::new(cfg.chain.state_cache_capacity));
        let this = Self {
            timeouts: cfg.chain.timeouts(),
            future: FutureMsgCache::new(
                cfg.chain.future_height_limit,
                cfg.chain.future_round_limit,
            ),
            chain: cfg.chain,
            id: cfg.signer.id().clone(),
            signer: cfg.signer,
            engine: cfg.engine,
            wal: cfg.wal,
            state: ConsensusState::new(last, validators),
            scheduler: TimeoutScheduler::new(),
            states: states.clone(),
            bus: bus.clone(),
            inputs: input_recv,
            stop: stop_recv,
            internal_send,
            internal_recv,
            backlog: VecDeque::new(),
            pending_validators: None,
            replaying: false,
            verifying: HashSet::new(),
            unverified: HashMap::new(),
            creating: None,
            commit: CommitStatus::Idle,
            slow_proposers: HashSet::new(),
            height_start: Instant::now(),
            round_start: Instant::now(),
        };
        let handle = Handle {
            inputs: input_send,
            stop: Arc::new(stop_send),
            bus,
            states,
        };
        Ok((this, handle))
    }

    /// Id of the local validator.
    pub fn id(&self) -> &ValidatorId {
        &self.id
    }

    /// Current state.
    pub fn state(&self) -> &ConsensusState {
        &self.state
    }

    /// Recovers the state from the WAL, then processes events until stopped.
    /// Returns an error only on a failure the engine cannot safely continue after.
    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!(id = %self.id, "starting consensus engine");
        self.recover().context("recover()")?;
        loop {
            self.drain_backlog()?;
            self.states.set_live(self.state.snapshot());
            METRICS.future_msgs.set(self.future.len());
            tokio::select! {
                res = self.stop.changed() => {
                    if res.is_err() || *self.stop.borrow() {
                        tracing::info!(id = %self.id, "stopping consensus engine");
                        return Ok(());
                    }
                }
                input = self.inputs.recv() => match input {
                    Some(Input::Message(msg)) => self.on_message(msg)?,
                    Some(Input::UpdateValidators(validators)) => {
                        tracing::info!(?validators, "validator set update queued for the next height");
                        self.pending_validators = Some(validators);
                    }
                    None => return Ok(()),
                },
                Some(event) = self.internal_recv.recv() => self.on_internal(event)?,
                Some(info) = self.scheduler.recv() => self.on_timeout(info)?,
            }
        }
    }

    /// Processes the messages taken from the future-message cache.
    pub(crate) fn drain_backlog(&mut self) -> anyhow::Result<()> {
        while let Some(msg) = self.backlog.pop_front() {
            self.on_message(msg)?;
        }
        Ok(())
    }

    /// Processes a consensus message. Protocol violations are logged,
    /// only internal errors are returned.
    pub(crate) fn on_message(&mut self, msg: Signed<ConsensusMsg>) -> anyhow::Result<()> {
        let now = Instant::now();
        let label = match &msg.msg {
            ConsensusMsg::Proposal(_) => metrics::ConsensusMsgLabel::Proposal,
            ConsensusMsg::Prevote(_) => metrics::ConsensusMsgLabel::Prevote,
            ConsensusMsg::Precommit(_) => metrics::ConsensusMsgLabel::Precommit,
        };
        let res = match label {
            metrics::ConsensusMsgLabel::Proposal => {
                match self.on_proposal(msg.cast().context("cast()")?) {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        match err {
                            // If the error is internal, we stop here.
                            proposal::Error::Internal(err) => {
                                tracing::error!("on_proposal: internal error: {err:#}");
                                return Err(err);
                            }
                            // If the error is due to an old message, we log it at a lower level.
                            proposal::Error::Old { .. } => {
                                tracing::debug!("on_proposal: {err:#}");
                            }
                            _ => {
                                tracing::warn!("on_proposal: {err:#}");
                            }
                        }
                        Err(())
                    }
                }
            }
            metrics::ConsensusMsgLabel::Prevote | metrics::ConsensusMsgLabel::Precommit => {
                match self.on_vote(msg.cast().context("cast()")?) {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        METRICS.rejected_votes[&err.label()].inc();
                        match err {
                            vote::Error::Internal(err) => {
                                tracing::error!("on_vote: internal error: {err:#}");
                                return Err(err);
                            }
                            vote::Error::Old { .. } => {
                                tracing::debug!("on_vote: {err:#}");
                            }
                            _ => {
                                tracing::warn!("on_vote: {err:#}");
                            }
                        }
                        Err(())
                    }
                }
            }
        };
        METRICS.message_processing_latency[&label.with_result(&res)].observe(now.elapsed());
        Ok(())
    }

    /// Processes the result of a task run outside of the core loop.
    pub(crate) fn on_internal(&mut self, event: Internal) -> anyhow::Result<()> {
        match event {
            Internal::BlockCreated {
                height,
                round,
                result,
            } => self.on_block_created(height, round, result),
            Internal::Verified {
                height,
                round,
                hash,
                result,
            } => self.on_verified(height, round, hash, result),
            Internal::Committed { height, result } => self.on_committed(height, result),
        }
    }

    /// Appends an entry to the WAL. No-op during the replay.
    pub(crate) fn wal_append(&mut self, entry: &WalEntry) -> anyhow::Result<()> {
        if self.replaying {
            return Ok(());
        }
        self.wal
            .append(entry)
            .with_context(|| format!("wal.append({})", entry.label()))
    }

    /// Schedules a timer. No-op during the replay; timers are re-armed afterwards.
    pub(crate) fn schedule(&mut self, info: TimeoutInfo, duration: std::time::Duration) {
        if self.replaying {
            return;
        }
        self.scheduler.schedule(info, duration);
    }

    /// Publishes an event. No-op during the replay.
    pub(crate) fn publish(&self, event: ConsensusEvent) {
        if self.replaying {
            return;
        }
        self.bus.publish(event);
    }

    /// Broadcasts a message to the other validators.
    pub(crate) fn broadcast(&self, msg: Signed<ConsensusMsg>) {
        self.publish(ConsensusEvent::NetMessage(NetMessage {
            payload: tbft_protobuf::encode(&msg),
            msg_type: NetMsgType::ConsensusMsg,
            to: None,
        }));
    }

    /// Spawns a task whose result comes back to the core loop.
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = Internal> + Send + 'static,
    {
        let send = self.internal_send.clone();
        tokio::spawn(async move {
            // The receiver is gone only if the engine stopped.
            let _ = send.send(task.await);
        });
    }
}
