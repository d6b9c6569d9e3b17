use anyhow::Context as _;
use tbft_protobuf::{read_required, required, ProtoFmt};

use super::{
    Block, BlockHash, BlockVersion, ConsensusMsg, Height, Payload, Proposal, Round, Signature,
    Signed, Step, TxId, ValidatorId, Vote, VoteType,
};
use crate::proto;

impl VoteType {
    /// Converts into the wire representation.
    pub fn build(self) -> proto::VoteType {
        match self {
            Self::Prevote => proto::VoteType::Prevote,
            Self::Precommit => proto::VoteType::Precommit,
        }
    }

    /// Parses from the wire representation.
    pub fn read(r: i32) -> anyhow::Result<Self> {
        Ok(match proto::VoteType::try_from(r).context("unknown vote type")? {
            proto::VoteType::Prevote => Self::Prevote,
            proto::VoteType::Precommit => Self::Precommit,
        })
    }
}

impl Step {
    /// Converts into the wire representation.
    pub fn build(self) -> proto::Step {
        match self {
            Self::NewHeight => proto::Step::NewHeight,
            Self::NewRound => proto::Step::NewRound,
            Self::Propose => proto::Step::Propose,
            Self::Prevote => proto::Step::Prevote,
            Self::PrevoteWait => proto::Step::PrevoteWait,
            Self::Precommit => proto::Step::Precommit,
            Self::PrecommitWait => proto::Step::PrecommitWait,
            Self::Commit => proto::Step::Commit,
        }
    }

    /// Parses from the wire representation.
    pub fn read(r: i32) -> anyhow::Result<Self> {
        Ok(match proto::Step::try_from(r).context("unknown step")? {
            proto::Step::NewHeight => Self::NewHeight,
            proto::Step::NewRound => Self::NewRound,
            proto::Step::Propose => Self::Propose,
            proto::Step::Prevote => Self::Prevote,
            proto::Step::PrevoteWait => Self::PrevoteWait,
            proto::Step::Precommit => Self::Precommit,
            proto::Step::PrecommitWait => Self::PrecommitWait,
            proto::Step::Commit => Self::Commit,
        })
    }
}

impl ProtoFmt for Block {
    type Proto = proto::Block;
    fn read(r: &Self::Proto) -> anyhow::Result<Self> {
        Ok(Self {
            height: Height(*required(&r.height).context("height")?),
            version: BlockVersion(*required(&r.version).context("version")?),
            pre_hash: BlockHash::decode(required(&r.pre_hash).context("pre_hash")?)
                .context("pre_hash")?,
            proposer: ValidatorId(required(&r.proposer).context("proposer")?.clone()),
            txs: r.txs.iter().cloned().map(TxId).collect(),
            payload: Payload(required(&r.payload).context("payload")?.clone()),
        })
    }
    fn build(&self) -> Self::Proto {
        Self::Proto {
            height: Some(self.height.0),
            version: Some(self.version.0),
            pre_hash: Some(self.pre_hash.0.to_vec()),
            proposer: Some(self.proposer.0.clone()),
            txs: self.txs.iter().map(|x| x.0.clone()).collect(),
            payload: Some(self.payload.0.clone()),
        }
    }
}

impl ProtoFmt for Proposal {
    type Proto = proto::Proposal;
    fn read(r: &Self::Proto) -> anyhow::Result<Self> {
        Ok(Self {
            voter: ValidatorId(required(&r.voter).context("voter")?.clone()),
            height: Height(*required(&r.height).context("height")?),
            round: Round(*required(&r.round).context("round")?),
            pol_round: r.pol_round.map(Round),
            block: read_required(&r.block).context("block")?,
        })
    }
    fn build(&self) -> Self::Proto {
        Self::Proto {
            voter: Some(self.voter.0.clone()),
            height: Some(self.height.0),
            round: Some(self.round.0),
            pol_round: self.pol_round.map(|r| r.0),
            block: Some(self.block.build()),
        }
    }
}

impl ProtoFmt for Vote {
    type Proto = proto::Vote;
    fn read(r: &Self::Proto) -> anyhow::Result<Self> {
        Ok(Self {
            vote_type: VoteType::read(*required(&r.vote_type).context("vote_type")?)
                .context("vote_type")?,
            voter: ValidatorId(required(&r.voter).context("voter")?.clone()),
            height: Height(*required(&r.height).context("height")?),
            round: Round(*required(&r.round).context("round")?),
            hash: r
                .hash
                .as_deref()
                .map(BlockHash::decode)
                .transpose()
                .context("hash")?,
            invalid_txs: r.invalid_txs.iter().cloned().map(TxId).collect(),
        })
    }
    fn build(&self) -> Self::Proto {
        Self::Proto {
            vote_type: Some(self.vote_type.build() as i32),
            voter: Some(self.voter.0.clone()),
            height: Some(self.height.0),
            round: Some(self.round.0),
            hash: self.hash.map(|h| h.0.to_vec()),
            invalid_txs: self.invalid_txs.iter().map(|x| x.0.clone()).collect(),
        }
    }
}

impl ProtoFmt for ConsensusMsg {
    type Proto = proto::ConsensusMsg;

    fn read(r: &Self::Proto) -> anyhow::Result<Self> {
        use proto::consensus_msg::T;
        Ok(match r.t.as_ref().context("missing")? {
            T::Proposal(r) => Self::Proposal(ProtoFmt::read(r).context("Proposal")?),
            T::Prevote(r) => {
                let v: Vote = ProtoFmt::read(r).context("Prevote")?;
                anyhow::ensure!(v.vote_type == VoteType::Prevote, "Prevote: wrong vote type");
                Self::Prevote(v)
            }
            T::Precommit(r) => {
                let v: Vote = ProtoFmt::read(r).context("Precommit")?;
                anyhow::ensure!(
                    v.vote_type == VoteType::Precommit,
                    "Precommit: wrong vote type"
                );
                Self::Precommit(v)
            }
        })
    }

    fn build(&self) -> Self::Proto {
        use proto::consensus_msg::T;

        let t = match self {
            Self::Proposal(x) => T::Proposal(x.build()),
            Self::Prevote(x) => T::Prevote(x.build()),
            Self::Precommit(x) => T::Precommit(x.build()),
        };

        Self::Proto { t: Some(t) }
    }
}

impl ProtoFmt for Signed<ConsensusMsg> {
    type Proto = proto::Signed;
    fn read(r: &Self::Proto) -> anyhow::Result<Self> {
        Ok(Self {
            msg: read_required(&r.msg).context("msg")?,
            signer: ValidatorId(required(&r.signer).context("signer")?.clone()),
            sig: Signature(required(&r.sig).context("sig")?.clone()),
        })
    }
    fn build(&self) -> Self::Proto {
        Self::Proto {
            msg: Some(self.msg.build()),
            signer: Some(self.signer.0.clone()),
            sig: Some(self.sig.0.clone()),
        }
    }
}
