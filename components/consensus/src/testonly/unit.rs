use std::sync::Arc;

use rand::{rngs::StdRng, SeedableRng as _};
use tbft_engine::{
    testonly::{Engine, PayloadManager},
    EngineManager,
};
use tbft_roles::validator::{
    self, testonly::Setup, Block, BlockHash, BlockVersion, ConsensusMsg, Height, Proposal,
    Round, Signed, Step, ValidatorId, Vote, VoteType,
};
use tbft_storage::testonly::InMemoryWal;
use tbft_utils::bus::Subscription;

use super::test_chain_config;
use crate::{
    engine::{proposal, vote},
    ChainConfig, Config, ConsensusEngine, ConsensusEvent, EventTopic, Handle, TimeoutInfo,
};

/// `UTHarness` drives a single engine by hand: messages, timeouts and results
/// of the execution layer are fed one by one, and the outbound messages are
/// collected. The engine is validator 0 of the setup.
///
/// It should be instantiated once for every test case.
pub(crate) struct UTHarness {
    pub(crate) engine: ConsensusEngine,
    pub(crate) handle: Handle,
    pub(crate) setup: Setup,
    pub(crate) exec: Engine,
    pub(crate) wal: InMemoryWal,
    pub(crate) chain: ChainConfig,
    pub(crate) rng: StdRng,
    net: Subscription<ConsensusEvent>,
}

impl UTHarness {
    /// Harness with `n` validators, starting from the genesis.
    pub(crate) fn new(n: usize) -> Self {
        Self::with_last_block(n, Block::genesis(BlockVersion(2300)))
    }

    /// Harness with `n` validators, starting after `last`.
    pub(crate) fn with_last_block(n: usize, last: Block) -> Self {
        Self::with_payload_manager(n, last, PayloadManager::Random(100))
    }

    pub(crate) fn with_payload_manager(
        n: usize,
        last: Block,
        payload_manager: PayloadManager,
    ) -> Self {
        Self::with_config(n, last, payload_manager, |_| {})
    }

    /// Harness with a chain configuration adjusted by `tweak`.
    pub(crate) fn with_config(
        n: usize,
        last: Block,
        payload_manager: PayloadManager,
        tweak: impl FnOnce(&mut ChainConfig),
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(1234 + n as u64);
        let setup = Setup::new(&mut rng, n);
        let exec = Engine::new(setup.ids()[0].clone(), last, payload_manager);
        let mut chain = test_chain_config(&setup.ids());
        tweak(&mut chain);
        Self::start(setup, exec, InMemoryWal::default(), chain, rng)
    }

    fn start(setup: Setup, exec: Engine, wal: InMemoryWal, chain: ChainConfig, rng: StdRng) -> Self {
        let cfg = Config {
            chain: chain.clone(),
            signer: Arc::new(setup.signer(0)),
            engine: EngineManager::from_engine(Arc::new(exec.clone())),
            wal: Box::new(wal.clone()),
        };
        let (mut engine, handle) = ConsensusEngine::new(cfg).unwrap();
        let net = handle.subscribe(EventTopic::NetMessage);
        engine.recover().unwrap();
        Self {
            engine,
            handle,
            setup,
            exec,
            wal,
            chain,
            rng,
            net,
        }
    }

    /// Simulates a crash and a restart on top of the same WAL and ledger.
    pub(crate) fn restart(self) -> Self {
        let Self {
            engine,
            setup,
            exec,
            wal,
            chain,
            rng,
            ..
        } = self;
        drop(engine);
        Self::start(setup, exec, wal, chain, rng)
    }

    pub(crate) fn id(&self, i: usize) -> ValidatorId {
        self.setup.ids()[i].clone()
    }

    pub(crate) fn index_of(&self, id: &ValidatorId) -> usize {
        self.setup.validators.index(id).unwrap()
    }

    pub(crate) fn height(&self) -> Height {
        self.engine.state.height
    }

    pub(crate) fn round(&self) -> Round {
        self.engine.state.round
    }

    pub(crate) fn step(&self) -> Step {
        self.engine.state.step
    }

    /// Index of the proposer of `round` at the current height.
    pub(crate) fn proposer(&self, round: Round) -> usize {
        self.index_of(&self.engine.proposer(round).unwrap())
    }

    /// New block on top of the last committed block, by validator `i`.
    pub(crate) fn new_block(&mut self, i: usize) -> Block {
        self.setup
            .make_block(&mut self.rng, i, &self.engine.state.last_block)
    }

    /// Proposal of `block` for `round`, signed by the proposer of that round.
    pub(crate) fn proposal(
        &self,
        round: Round,
        block: Block,
        pol_round: Option<Round>,
    ) -> Signed<Proposal> {
        let i = self.proposer(round);
        let proposal = Proposal {
            voter: self.id(i),
            height: self.height(),
            round,
            pol_round,
            block,
        };
        validator::sign_msg(&self.setup.signer(i), proposal).unwrap()
    }

    /// Vote of validator `i` at the current height.
    pub(crate) fn vote(
        &self,
        i: usize,
        vote_type: VoteType,
        round: Round,
        hash: Option<BlockHash>,
    ) -> Signed<Vote> {
        self.setup.vote(i, vote_type, self.height(), round, hash)
    }

    pub(crate) fn process_proposal(&mut self, p: Signed<Proposal>) -> Result<(), proposal::Error> {
        self.engine.on_proposal(p)
    }

    pub(crate) fn process_vote(&mut self, v: Signed<Vote>) -> Result<(), vote::Error> {
        self.engine.on_vote(v)
    }

    /// Delivers the votes of the given validators for the current round.
    pub(crate) fn process_votes(
        &mut self,
        validators: impl IntoIterator<Item = usize>,
        vote_type: VoteType,
        hash: Option<BlockHash>,
    ) {
        let round = self.round();
        for i in validators {
            let v = self.vote(i, vote_type, round, hash);
            self.process_vote(v).unwrap();
        }
    }

    /// Waits for the next result of the execution layer and processes it.
    pub(crate) async fn process_internal(&mut self) {
        let event = self.engine.internal_recv.recv().await.unwrap();
        self.engine.on_internal(event).unwrap();
    }

    /// Waits for the next timer and processes it.
    pub(crate) async fn process_timeout(&mut self) -> TimeoutInfo {
        let info = self.engine.scheduler.recv().await.unwrap();
        self.engine.on_timeout(info).unwrap();
        info
    }

    /// Processes timers until the given step fires.
    pub(crate) async fn process_timeouts_until(&mut self, step: Step) -> TimeoutInfo {
        loop {
            let info = self.process_timeout().await;
            if info.step == step && !info.optimal {
                return info;
            }
        }
    }

    /// Messages broadcast since the last call.
    pub(crate) fn sent(&mut self) -> Vec<Signed<ConsensusMsg>> {
        let mut msgs = vec![];
        while let Ok(event) = self.net.try_recv() {
            if let ConsensusEvent::NetMessage(msg) = event {
                msgs.push(tbft_protobuf::decode(&msg.payload).unwrap());
            }
        }
        msgs
    }

    /// Our vote of the given type for the current round.
    pub(crate) fn own_vote(&self, vote_type: VoteType) -> Option<Vote> {
        self.engine
            .state
            .votes
            .round(self.round())?
            .get(vote_type)
            .get(&self.id(0))
            .map(|v| v.msg.clone())
    }
}
