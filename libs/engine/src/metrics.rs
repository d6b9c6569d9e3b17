use std::time;

#[vise::register]
pub(super) static ENGINE_INTERFACE: vise::Global<EngineInterface> = vise::Global::new();

#[derive(Debug, vise::Metrics)]
#[metrics(prefix = "tbft_engine_interface")]
pub(super) struct EngineInterface {
    /// Latency of a successful `create_block()` call.
    #[metrics(unit = vise::Unit::Seconds, buckets = vise::Buckets::LATENCIES)]
    pub(super) create_block_latency: vise::Histogram<time::Duration>,
    /// Latency of a `verify_block()` call.
    #[metrics(unit = vise::Unit::Seconds, buckets = vise::Buckets::LATENCIES)]
    pub(super) verify_block_latency: vise::Histogram<time::Duration>,
    /// Latency of a successful `add_block()` call.
    #[metrics(unit = vise::Unit::Seconds, buckets = vise::Buckets::LATENCIES)]
    pub(super) add_block_latency: vise::Histogram<time::Duration>,
    /// Number of rejected blocks.
    pub(super) rejected_blocks: vise::Counter,
    /// Height of the last committed block.
    pub(super) committed_height: vise::Gauge<u64>,
}
