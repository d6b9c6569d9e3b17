//! Metrics of the write-ahead log.
use std::time::Duration;

use vise::{Buckets, Counter, EncodeLabelValue, Gauge, Histogram, LabeledFamily, Metrics, Unit};

use crate::WalEntry;

/// Label for a WAL entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
#[metrics(rename_all = "snake_case")]
pub(crate) enum WalEntryLabel {
    Proposal,
    Vote,
    Verified,
    Timeout,
    Checkpoint,
}

impl From<&WalEntry> for WalEntryLabel {
    fn from(entry: &WalEntry) -> Self {
        match entry {
            WalEntry::Proposal(_) => Self::Proposal,
            WalEntry::Vote(_) => Self::Vote,
            WalEntry::Verified { .. } => Self::Verified,
            WalEntry::Timeout { .. } => Self::Timeout,
            WalEntry::Checkpoint { .. } => Self::Checkpoint,
        }
    }
}

#[derive(Debug, Metrics)]
#[metrics(prefix = "tbft_wal")]
pub(crate) struct WalMetrics {
    /// Latency of appending a record, fsync included.
    #[metrics(buckets = Buckets::LATENCIES, unit = Unit::Seconds)]
    pub(crate) append_latency: Histogram<Duration>,
    /// Number of appended records, by entry type.
    #[metrics(labels = ["type"])]
    pub(crate) appended: LabeledFamily<WalEntryLabel, Counter>,
    /// Number of records read back on replay.
    pub(crate) replayed: Counter,
    /// Number of truncated partial records.
    pub(crate) truncated_tails: Counter,
    /// Size of the log file.
    #[metrics(unit = Unit::Bytes)]
    pub(crate) size: Gauge<u64>,
}

#[vise::register]
pub(crate) static METRICS: vise::Global<WalMetrics> = vise::Global::new();
