use std::sync::Arc;

use anyhow::Context as _;
use rand::{rngs::StdRng, SeedableRng as _};
use tbft_engine::{testonly::Engine, EngineManager};
use tbft_roles::validator::{testonly::Setup, BlockVersion, Height};
use tbft_storage::NoopWal;
use tokio::task::JoinSet;
use tracing::Instrument as _;

use super::test_chain_config;
use crate::{Config, ConsensusEngine, ConsensusEvent, EventTopic};

/// Enum representing the behavior of the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Behavior {
    /// A validator that is always online and behaves honestly.
    Honest,
    /// A validator that is always offline and does not produce any messages.
    Offline,
}

/// Config for the test. Determines the parameters to run the test with.
pub(crate) struct Test {
    pub(crate) nodes: Vec<Behavior>,
    pub(crate) blocks_to_finalize: u64,
}

impl Test {
    /// Runs the nodes over an in-process network until every honest node
    /// committed `blocks_to_finalize` blocks, then checks that they committed
    /// the same blocks. Returns the execution layers of the honest nodes.
    pub(crate) async fn run(&self) -> anyhow::Result<Vec<Engine>> {
        let rng = &mut StdRng::seed_from_u64(self.nodes.len() as u64);
        let setup = Setup::new(rng, self.nodes.len());
        let chain = test_chain_config(&setup.ids());
        let version = BlockVersion(chain.proposer_v2_block_version);

        let mut tasks = JoinSet::new();
        let mut handles = vec![];
        let mut nets = vec![];
        let mut honest = vec![];
        for (i, behavior) in self.nodes.iter().enumerate() {
            if *behavior == Behavior::Offline {
                continue;
            }
            let id = setup.ids()[i].clone();
            let exec = Engine::new_random(id.clone(), version);
            let cfg = Config {
                chain: chain.clone(),
                signer: Arc::new(setup.signer(i)),
                engine: EngineManager::from_engine(Arc::new(exec.clone())),
                wal: Box::new(NoopWal),
            };
            let (engine, handle) = ConsensusEngine::new(cfg)?;
            let committed = handle.subscribe(EventTopic::BlockCommitted);
            nets.push(handle.subscribe(EventTopic::NetMessage));
            tasks.spawn(engine.run().instrument(tracing::info_span!("node", %id)));
            handles.push(handle);
            honest.push((exec, committed));
        }
        anyhow::ensure!(!honest.is_empty(), "no honest nodes");

        // Every outbound message of a node is delivered to all the other nodes.
        for (i, mut net) in nets.into_iter().enumerate() {
            let others: Vec<_> = handles
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, h)| h.clone())
                .collect();
            tasks.spawn(async move {
                while let Some(event) = net.recv().await {
                    let ConsensusEvent::NetMessage(msg) = event else {
                        continue;
                    };
                    for other in &others {
                        // A stopped node simply misses the message.
                        let _ = other.deliver_raw(&msg.payload);
                    }
                }
                Ok(())
            });
        }

        // Run the nodes until all honest nodes committed enough blocks.
        let last = Height(self.blocks_to_finalize);
        for (_, committed) in &mut honest {
            loop {
                let event = committed.recv().await.context("engine stopped")?;
                if let ConsensusEvent::BlockCommitted { height, .. } = event {
                    if height >= last {
                        break;
                    }
                }
            }
        }
        for handle in &handles {
            handle.stop();
        }
        tasks.abort_all();

        // Check that the committed blocks are consistent.
        let engines: Vec<_> = honest.into_iter().map(|(exec, _)| exec).collect();
        for h in 1..=self.blocks_to_finalize {
            let want = engines[0].block(Height(h)).context("missing block")?;
            for exec in &engines[1..] {
                let got = exec.block(Height(h)).context("missing block")?;
                anyhow::ensure!(want == got, "committed conflicting blocks at height {h}");
            }
        }
        Ok(engines)
    }
}
