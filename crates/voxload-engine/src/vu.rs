use crate::signal::{VuControl, VuSignal};
use crate::workflow::{ConversationReport, ConversationWorkflow, WorkflowSettings};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voxload_audio::ChunkPool;
use voxload_client::ParticipantApi;
use voxload_core::{AppConfig, AudioChunk, SelectionMode};
use voxload_metrics::{MetricsSink, SessionOutcome};

/// Settings every virtual user of a run reads.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub workflow: WorkflowSettings,
    pub conversation_name: String,
    pub selection: SelectionMode,
    pub min_chunks: usize,
    pub max_chunks: usize,
    pub think_time: Duration,
    pub failure_backoff: Duration,
}

impl RunSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            workflow: WorkflowSettings {
                project_id: config.target.project_id.clone(),
                content_type: config.target.content_type.clone(),
                record_interval: config.pacing.record_interval(),
                call_finish: config.load.call_finish,
            },
            conversation_name: config.target.conversation_name.clone(),
            selection: config.chunks.selection,
            min_chunks: config.chunks.min_chunks,
            max_chunks: config.chunks.max_chunks,
            think_time: config.pacing.think_time(),
            failure_backoff: config.pacing.failure_backoff(),
        }
    }
}

/// Read-only state shared by all virtual users.
pub struct VuContext {
    pub api: Arc<dyn ParticipantApi>,
    pub pool: Arc<ChunkPool>,
    pub metrics: Arc<MetricsSink>,
    pub settings: RunSettings,
}

/// Global iteration budget for the shared-iterations executor.
#[derive(Debug)]
pub struct SharedIterations {
    claimed: AtomicUsize,
    total: usize,
}

impl SharedIterations {
    pub fn new(total: usize) -> Self {
        Self {
            claimed: AtomicUsize::new(0),
            total,
        }
    }

    /// Claim the next iteration number, if any are left.
    pub fn claim(&self) -> Option<usize> {
        let n = self.claimed.fetch_add(1, Ordering::Relaxed);
        (n < self.total).then_some(n)
    }

    pub fn is_exhausted(&self) -> bool {
        self.claimed.load(Ordering::Relaxed) >= self.total
    }
}

#[derive(Debug, Clone)]
pub enum IterationBudget {
    /// Run until retired; iterations are numbered per VU.
    Unbounded,
    Shared(Arc<SharedIterations>),
}

impl IterationBudget {
    fn is_exhausted(&self) -> bool {
        match self {
            IterationBudget::Unbounded => false,
            IterationBudget::Shared(shared) => shared.is_exhausted(),
        }
    }
}

/// Pick this conversation's chunks. Synchronous so the thread-local RNG is
/// never held across an await.
fn plan_chunks(context: &VuContext, vu: usize, iteration: usize) -> Vec<Arc<AudioChunk>> {
    let settings = &context.settings;
    let selection = match settings.selection {
        SelectionMode::All => context.pool.select_all(),
        SelectionMode::Random => {
            let picked = context.pool.select_random_range(
                settings.min_chunks,
                settings.max_chunks,
                &mut rand::thread_rng(),
            );
            if picked.degraded {
                context.metrics.record_degraded_selection();
                tracing::warn!(
                    vu,
                    iteration,
                    pool = context.pool.len(),
                    min_chunks = settings.min_chunks,
                    "chunk pool smaller than min_chunks, uploading the whole pool"
                );
            }
            picked.selection
        }
    };
    tracing::debug!(
        vu,
        iteration,
        start = selection.start_index,
        count = selection.count,
        "chunks selected"
    );
    context.pool.planned_chunks(selection)
}

/// One full conversation for `vu`, recorded into the metrics sink.
pub async fn run_conversation(
    context: &VuContext,
    vu: usize,
    iteration: usize,
    control: &mut VuControl,
) -> ConversationReport {
    let planned = plan_chunks(context, vu, iteration);
    let name = format!(
        "{} - VU{vu} - Iter{iteration}",
        context.settings.conversation_name
    );

    context.metrics.record_session_started();
    let report = ConversationWorkflow::new(
        context.api.as_ref(),
        &context.settings.workflow,
        name,
        planned,
    )
    .run(control)
    .await;
    context.metrics.record_session_end(
        report.outcome(),
        report.chunks_planned,
        report.chunks_completed,
    );
    report
}

/// Virtual user loop: conversation, pause, repeat until retired, halted or
/// out of iterations.
pub async fn run_vu(
    context: Arc<VuContext>,
    vu: usize,
    mut control: VuControl,
    budget: IterationBudget,
) {
    tracing::debug!(vu, "virtual user started");
    let mut local_iteration = 0usize;

    loop {
        if control.current() != VuSignal::Run {
            break;
        }
        let iteration = match &budget {
            IterationBudget::Unbounded => {
                local_iteration += 1;
                local_iteration - 1
            }
            IterationBudget::Shared(shared) => match shared.claim() {
                Some(iteration) => iteration,
                None => break,
            },
        };

        let report = run_conversation(&context, vu, iteration, &mut control).await;
        let pause = match report.outcome() {
            SessionOutcome::Succeeded => context.settings.think_time,
            SessionOutcome::Failed => context.settings.failure_backoff,
            SessionOutcome::Interrupted => break,
        };
        if budget.is_exhausted() {
            break;
        }
        if !control.pause(pause, VuSignal::Retire).await {
            break;
        }
    }

    tracing::debug!(vu, signal = ?control.current(), "virtual user stopped");
}
