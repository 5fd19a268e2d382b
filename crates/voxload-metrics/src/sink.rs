use crate::report::{ChunkReport, LatencyStats, RunReport, SessionReport, StepReport};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use voxload_core::{CallOutcome, FailureKind, Step};

/// How a conversation ended, from the report's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Succeeded,
    Failed,
    /// Stopped at a step boundary after the graceful-drain window ran out.
    Interrupted,
}

/// Append-only collector shared by every virtual user.
pub struct MetricsSink {
    started_at: Instant,
    outcomes: Mutex<Vec<CallOutcome>>,
    sessions_started: AtomicU64,
    sessions_succeeded: AtomicU64,
    sessions_failed: AtomicU64,
    sessions_interrupted: AtomicU64,
    chunks_planned: AtomicU64,
    chunks_uploaded: AtomicU64,
    degraded_selections: AtomicU64,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            outcomes: Mutex::new(Vec::new()),
            sessions_started: AtomicU64::new(0),
            sessions_succeeded: AtomicU64::new(0),
            sessions_failed: AtomicU64::new(0),
            sessions_interrupted: AtomicU64::new(0),
            chunks_planned: AtomicU64::new(0),
            chunks_uploaded: AtomicU64::new(0),
            degraded_selections: AtomicU64::new(0),
        }
    }

    pub fn record_call(&self, outcome: CallOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(outcome);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the end of a conversation together with its chunk tally.
    pub fn record_session_end(&self, outcome: SessionOutcome, planned: usize, uploaded: usize) {
        let counter = match outcome {
            SessionOutcome::Succeeded => &self.sessions_succeeded,
            SessionOutcome::Failed => &self.sessions_failed,
            SessionOutcome::Interrupted => &self.sessions_interrupted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.chunks_planned.fetch_add(planned as u64, Ordering::Relaxed);
        self.chunks_uploaded
            .fetch_add(uploaded as u64, Ordering::Relaxed);
    }

    pub fn record_degraded_selection(&self) {
        self.degraded_selections.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of every call outcome recorded so far, in insertion order.
    pub fn outcomes(&self) -> Vec<CallOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn report(&self) -> RunReport {
        let outcomes = self.outcomes();

        let steps = Step::ALL
            .iter()
            .filter_map(|step| {
                let calls: Vec<&CallOutcome> =
                    outcomes.iter().filter(|o| o.step == *step).collect();
                if calls.is_empty() {
                    None
                } else {
                    Some(step_report(*step, &calls))
                }
            })
            .collect();

        let started = self.sessions_started.load(Ordering::Relaxed);
        let succeeded = self.sessions_succeeded.load(Ordering::Relaxed);
        let failed = self.sessions_failed.load(Ordering::Relaxed);
        let interrupted = self.sessions_interrupted.load(Ordering::Relaxed);
        let planned = self.chunks_planned.load(Ordering::Relaxed);
        let uploaded = self.chunks_uploaded.load(Ordering::Relaxed);

        RunReport {
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
            total_calls: outcomes.len() as u64,
            sessions: SessionReport {
                started,
                succeeded,
                failed,
                interrupted,
                success_rate: ratio(succeeded, succeeded + failed + interrupted),
            },
            chunks: ChunkReport {
                planned,
                uploaded,
                missed: planned.saturating_sub(uploaded),
                completion_rate: ratio(uploaded, planned),
                degraded_selections: self.degraded_selections.load(Ordering::Relaxed),
            },
            steps,
        }
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn step_report(step: Step, calls: &[&CallOutcome]) -> StepReport {
    let count = calls.len() as u64;
    let succeeded = calls.iter().filter(|c| c.succeeded).count() as u64;

    let mut status_codes = BTreeMap::new();
    let mut no_response = 0;
    for call in calls {
        match call.http_status {
            Some(status) => *status_codes.entry(status).or_insert(0) += 1,
            None => no_response += 1,
        }
    }

    let failures_of = |kind: FailureKind| calls.iter().filter(|c| c.failure == Some(kind)).count() as u64;

    let latencies: Vec<f64> = calls.iter().map(|c| c.latency_ms()).collect();

    StepReport {
        step,
        name: step.as_str().to_string(),
        count,
        succeeded,
        failed: count - succeeded,
        success_rate: ratio(succeeded, count),
        transport_failures: failures_of(FailureKind::Transport),
        protocol_failures: failures_of(FailureKind::Protocol),
        parse_failures: failures_of(FailureKind::Parse),
        no_response,
        status_codes,
        latency: LatencyStats::from_samples(latencies),
    }
}
