//! Metrics of the consensus engine.

use std::time::Duration;

use tbft_roles::validator::Step;
use vise::{
    Buckets, Counter, EncodeLabelSet, EncodeLabelValue, Family, Gauge, Histogram, LabeledFamily,
    Metrics, Unit,
};

/// Label for a consensus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
#[metrics(rename_all = "snake_case")]
pub(crate) enum ConsensusMsgLabel {
    /// Label for a `Proposal` message.
    Proposal,
    /// Label for a `Prevote` message.
    Prevote,
    /// Label for a `Precommit` message.
    Precommit,
}

impl ConsensusMsgLabel {
    /// Attaches a result to this label.
    pub(crate) fn with_result<E>(self, result: &Result<(), E>) -> ProcessingLatencyLabels {
        ProcessingLatencyLabels {
            r#type: self,
            result: match result {
                Ok(()) => ResultLabel::Ok,
                Err(_) => ResultLabel::Err,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
#[metrics(rename_all = "snake_case")]
enum ResultLabel {
    Ok,
    Err,
}

/// Labels for processing latency metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelSet)]
pub(crate) struct ProcessingLatencyLabels {
    r#type: ConsensusMsgLabel,
    result: ResultLabel,
}

/// Label for the step of a fired timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
#[metrics(rename_all = "snake_case")]
pub(crate) enum StepLabel {
    Propose,
    ProposeOptimal,
    Prevote,
    PrevoteWait,
    Precommit,
    PrecommitWait,
    Commit,
    Other,
}

impl StepLabel {
    pub(crate) fn new(step: Step, optimal: bool) -> Self {
        match step {
            Step::Propose if optimal => Self::ProposeOptimal,
            Step::Propose => Self::Propose,
            Step::Prevote => Self::Prevote,
            Step::PrevoteWait => Self::PrevoteWait,
            Step::Precommit => Self::Precommit,
            Step::PrecommitWait => Self::PrecommitWait,
            Step::Commit => Self::Commit,
            Step::NewHeight | Step::NewRound => Self::Other,
        }
    }
}

/// Reason for rejecting a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
#[metrics(rename_all = "snake_case")]
pub(crate) enum RejectLabel {
    Old,
    TooFarAhead,
    InvalidValidator,
    InvalidSigner,
    Equivocation,
    Other,
}

/// Metrics defined by the consensus module.
#[derive(Debug, Metrics)]
#[metrics(prefix = "tbft_consensus")]
pub(crate) struct ConsensusMetrics {
    /// Height being decided.
    pub(crate) height: Gauge<u64>,
    /// Current round.
    pub(crate) round: Gauge<u64>,
    /// Height of the last block committed by this node.
    pub(crate) committed_height: Gauge<u64>,
    /// Latency of receiving a proposal. Measures from the start of the round
    /// until the proposal is accepted.
    #[metrics(buckets = Buckets::exponential(0.125..=64.0, 2.0), unit = Unit::Seconds)]
    pub(crate) proposal_latency: Histogram<Duration>,
    /// Latency of deciding a height. Measures from the start of the height
    /// until the precommit quorum.
    #[metrics(buckets = Buckets::exponential(0.125..=64.0, 2.0), unit = Unit::Seconds)]
    pub(crate) commit_latency: Histogram<Duration>,
    /// Latency of a single round.
    #[metrics(buckets = Buckets::exponential(0.125..=64.0, 2.0), unit = Unit::Seconds)]
    pub(crate) round_latency: Histogram<Duration>,
    /// Latency of processing messages.
    #[metrics(buckets = Buckets::LATENCIES, unit = Unit::Seconds)]
    pub(crate) message_processing_latency: Family<ProcessingLatencyLabels, Histogram<Duration>>,
    /// Fired timeouts, by step.
    #[metrics(labels = ["step"])]
    pub(crate) timeouts: LabeledFamily<StepLabel, Counter>,
    /// Rejected votes, by reason.
    #[metrics(labels = ["reason"])]
    pub(crate) rejected_votes: LabeledFamily<RejectLabel, Counter>,
    /// Number of failed commit attempts.
    pub(crate) commit_failures: Counter,
    /// Number of messages in the future-message cache.
    pub(crate) future_msgs: Gauge<usize>,
}

/// Global instance of [`ConsensusMetrics`].
#[vise::register]
pub(crate) static METRICS: vise::Global<ConsensusMetrics> = vise::Global::new();
