use crate::signal::{VuControl, VuSignal};
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use voxload_client::ParticipantApi;
use voxload_core::{ApiError, AudioChunk, Step};
use voxload_metrics::SessionOutcome;

/// Per-conversation knobs shared by every workflow of a run.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub project_id: String,
    pub content_type: String,
    pub record_interval: Duration,
    pub call_finish: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Initiate(ApiError),
    Finish(ApiError),
    /// Halted at a step boundary after the graceful-drain window.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Initiating,
    /// Index into the planned chunks of the chunk about to be uploaded.
    Recording(usize),
    Finishing,
    Done,
    Failed(FailureReason),
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Done | WorkflowState::Failed(_))
    }
}

/// A conversation that the API has accepted. Exists only after a
/// successful initiate.
#[derive(Debug)]
pub struct ConversationSession {
    id: String,
    chunks_planned: Vec<Arc<AudioChunk>>,
    chunks_completed: usize,
}

impl ConversationSession {
    fn new(id: String, chunks_planned: Vec<Arc<AudioChunk>>) -> Self {
        Self {
            id,
            chunks_planned,
            chunks_completed: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn chunks_planned(&self) -> &[Arc<AudioChunk>] {
        &self.chunks_planned
    }

    pub fn chunks_completed(&self) -> usize {
        self.chunks_completed
    }

    fn complete_chunk(&mut self) {
        if self.chunks_completed < self.chunks_planned.len() {
            self.chunks_completed += 1;
        }
    }
}

/// Result of one chunk upload cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Uploaded,
    Dropped { step: Step, error: ApiError },
}

/// Summary handed back to the VU loop once the workflow is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationReport {
    pub conversation_id: Option<String>,
    pub state: WorkflowState,
    /// Zero when initiate never succeeded.
    pub chunks_planned: usize,
    pub chunks_completed: usize,
}

impl ConversationReport {
    pub fn outcome(&self) -> SessionOutcome {
        match self.state {
            WorkflowState::Failed(FailureReason::Interrupted) => SessionOutcome::Interrupted,
            WorkflowState::Failed(_) => SessionOutcome::Failed,
            _ => SessionOutcome::Succeeded,
        }
    }
}

/// Drives one simulated conversation: initiate, one upload cycle per
/// planned chunk, then finish.
///
/// Steps run strictly in order. A failed chunk is dropped and the next one
/// is still attempted after the record interval; only initiate, finish and
/// a halt signal end the conversation early.
pub struct ConversationWorkflow<'a> {
    api: &'a dyn ParticipantApi,
    settings: &'a WorkflowSettings,
    display_name: String,
    planned: Vec<Arc<AudioChunk>>,
    state: WorkflowState,
    session: Option<ConversationSession>,
}

impl<'a> ConversationWorkflow<'a> {
    pub fn new(
        api: &'a dyn ParticipantApi,
        settings: &'a WorkflowSettings,
        display_name: String,
        planned: Vec<Arc<AudioChunk>>,
    ) -> Self {
        Self {
            api,
            settings,
            display_name,
            planned,
            state: WorkflowState::Initiating,
            session: None,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn session(&self) -> Option<&ConversationSession> {
        self.session.as_ref()
    }

    /// Run until `Done` or `Failed`.
    pub async fn run(mut self, control: &mut VuControl) -> ConversationReport {
        while !self.state.is_terminal() {
            self.step(control).await;
        }
        self.into_report()
    }

    /// Perform one transition. No-op once terminal.
    pub async fn step(&mut self, control: &mut VuControl) -> &WorkflowState {
        let next = match self.state.clone() {
            WorkflowState::Initiating => self.initiate(control).await,
            WorkflowState::Recording(index) => self.record(index, control).await,
            WorkflowState::Finishing => self.finish(control).await,
            terminal => terminal,
        };
        self.state = next;
        &self.state
    }

    pub fn into_report(self) -> ConversationReport {
        let (conversation_id, chunks_planned, chunks_completed) = match self.session {
            Some(session) => (
                Some(session.id),
                session.chunks_planned.len(),
                session.chunks_completed,
            ),
            None => (None, 0, 0),
        };
        ConversationReport {
            conversation_id,
            state: self.state,
            chunks_planned,
            chunks_completed,
        }
    }

    async fn initiate(&mut self, control: &VuControl) -> WorkflowState {
        if control.is_halted() {
            return WorkflowState::Failed(FailureReason::Interrupted);
        }

        match self
            .api
            .initiate(&self.settings.project_id, &self.display_name)
            .await
        {
            Ok(id) => {
                tracing::debug!(
                    conversation_id = %id,
                    chunks = self.planned.len(),
                    "conversation initiated"
                );
                let planned = std::mem::take(&mut self.planned);
                self.session = Some(ConversationSession::new(id, planned));
                WorkflowState::Recording(0)
            }
            Err(e) => {
                tracing::error!(name = %self.display_name, "initiate failed: {e}");
                WorkflowState::Failed(FailureReason::Initiate(e))
            }
        }
    }

    async fn record(&mut self, index: usize, control: &mut VuControl) -> WorkflowState {
        let Some(session) = self.session.as_ref() else {
            return WorkflowState::Failed(FailureReason::Interrupted);
        };
        let planned = session.chunks_planned.len();
        if index >= planned {
            return WorkflowState::Finishing;
        }
        if control.is_halted() {
            return WorkflowState::Failed(FailureReason::Interrupted);
        }

        let conversation_id = session.id.clone();
        let chunk = Arc::clone(&session.chunks_planned[index]);

        match self.upload_chunk(&conversation_id, &chunk).await {
            ChunkOutcome::Uploaded => {
                if let Some(session) = self.session.as_mut() {
                    session.complete_chunk();
                }
                tracing::debug!(
                    conversation_id = %conversation_id,
                    chunk = chunk.index,
                    "chunk uploaded ({}/{planned})",
                    index + 1
                );
            }
            ChunkOutcome::Dropped { step, error } => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    chunk = chunk.index,
                    step = step.as_str(),
                    "chunk dropped: {error}"
                );
            }
        }

        if index + 1 >= planned {
            return WorkflowState::Finishing;
        }
        if !control
            .pause(self.settings.record_interval, VuSignal::Halt)
            .await
        {
            return WorkflowState::Failed(FailureReason::Interrupted);
        }
        WorkflowState::Recording(index + 1)
    }

    /// Slot request, storage upload and confirm for one chunk. The ticket
    /// never outlives this call, and a started cycle always runs to confirm.
    async fn upload_chunk(&self, conversation_id: &str, chunk: &AudioChunk) -> ChunkOutcome {
        let now = Utc::now();
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let slot_name = format!("chunk-{}.webm", now.timestamp_millis());

        let ticket = match self
            .api
            .request_upload_slot(conversation_id, &slot_name, &self.settings.content_type)
            .await
        {
            Ok(ticket) => ticket,
            Err(error) => {
                return ChunkOutcome::Dropped {
                    step: Step::GetUploadUrl,
                    error,
                }
            }
        };

        if let Err(error) = self
            .api
            .upload_bytes(&ticket, &chunk.bytes, &chunk.filename)
            .await
        {
            return ChunkOutcome::Dropped {
                step: Step::UploadToStorage,
                error,
            };
        }

        match self
            .api
            .confirm_upload(conversation_id, &ticket, &timestamp)
            .await
        {
            Ok(()) => ChunkOutcome::Uploaded,
            Err(error) => ChunkOutcome::Dropped {
                step: Step::ConfirmUpload,
                error,
            },
        }
    }

    async fn finish(&mut self, control: &VuControl) -> WorkflowState {
        if !self.settings.call_finish {
            return WorkflowState::Done;
        }
        if control.is_halted() {
            return WorkflowState::Failed(FailureReason::Interrupted);
        }
        let Some(session) = self.session.as_ref() else {
            return WorkflowState::Failed(FailureReason::Interrupted);
        };

        match self.api.finish(&session.id).await {
            Ok(()) => {
                tracing::debug!(
                    conversation_id = %session.id,
                    uploaded = session.chunks_completed,
                    planned = session.chunks_planned.len(),
                    "conversation finished"
                );
                WorkflowState::Done
            }
            Err(e) => {
                tracing::error!(conversation_id = %session.id, "finish failed: {e}");
                WorkflowState::Failed(FailureReason::Finish(e))
            }
        }
    }
}
