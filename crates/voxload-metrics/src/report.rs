use serde::Serialize;
use std::collections::BTreeMap;
use voxload_core::Step;

/// End-of-run summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub elapsed_secs: f64,
    pub total_calls: u64,
    pub sessions: SessionReport,
    pub chunks: ChunkReport,
    pub steps: Vec<StepReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub interrupted: u64,
    pub success_rate: f64,
}

/// Chunk completeness. `missed` covers every planned chunk whose upload
/// cycle was dropped, whatever step failed.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub planned: u64,
    pub uploaded: u64,
    pub missed: u64,
    pub completion_rate: f64,
    pub degraded_selections: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: Step,
    pub name: String,
    pub count: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub transport_failures: u64,
    pub protocol_failures: u64,
    pub parse_failures: u64,
    pub no_response: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub latency: LatencyStats,
}

/// Latency statistics for a single step, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencyStats {
    pub fn from_samples(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable_by(|a, b| a.total_cmp(b));
        let sum: f64 = samples.iter().sum();
        Self {
            min_ms: samples[0],
            max_ms: samples[samples.len() - 1],
            avg_ms: sum / samples.len() as f64,
            p50_ms: percentile(&samples, 0.50),
            p95_ms: percentile(&samples, 0.95),
            p99_ms: percentile(&samples, 0.99),
        }
    }
}

/// Nearest-rank percentile over an ascending slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

impl RunReport {
    pub fn step(&self, step: Step) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == step)
    }

    /// Emit the summary through `tracing`, one line per section.
    pub fn log_summary(&self) {
        tracing::info!(
            elapsed_secs = self.elapsed_secs,
            calls = self.total_calls,
            "run finished"
        );
        tracing::info!(
            started = self.sessions.started,
            succeeded = self.sessions.succeeded,
            failed = self.sessions.failed,
            interrupted = self.sessions.interrupted,
            "conversations: {:.1}% succeeded",
            self.sessions.success_rate * 100.0,
        );
        tracing::info!(
            planned = self.chunks.planned,
            uploaded = self.chunks.uploaded,
            missed = self.chunks.missed,
            degraded_selections = self.chunks.degraded_selections,
            "chunks: {:.1}% completed",
            self.chunks.completion_rate * 100.0,
        );
        for step in &self.steps {
            tracing::info!(
                step = %step.name,
                count = step.count,
                failed = step.failed,
                transport = step.transport_failures,
                protocol = step.protocol_failures,
                parse = step.parse_failures,
                "{:.1}% ok, latency avg={:.0}ms p50={:.0}ms p95={:.0}ms p99={:.0}ms max={:.0}ms",
                step.success_rate * 100.0,
                step.latency.avg_ms,
                step.latency.p50_ms,
                step.latency.p95_ms,
                step.latency.p99_ms,
                step.latency.max_ms,
            );
        }
    }
}
