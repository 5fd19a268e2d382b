pub mod report;
pub mod sink;

pub use report::{ChunkReport, LatencyStats, RunReport, SessionReport, StepReport};
pub use sink::{MetricsSink, SessionOutcome};
