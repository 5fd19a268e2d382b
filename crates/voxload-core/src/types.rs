use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// One pre-recorded audio segment, loaded once and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub index: u32,
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// A contiguous sub-range of the chunk pool, picked per conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSelection {
    pub start_index: usize,
    pub count: usize,
}

impl ChunkSelection {
    pub fn end(&self) -> usize {
        self.start_index + self.count
    }
}

/// Pre-signed storage destination for exactly one chunk upload cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTicket {
    pub chunk_id: String,
    pub upload_url: String,
    pub form_fields: BTreeMap<String, String>,
    pub file_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Initiate,
    GetUploadUrl,
    UploadToStorage,
    ConfirmUpload,
    Finish,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Initiate,
        Step::GetUploadUrl,
        Step::UploadToStorage,
        Step::ConfirmUpload,
        Step::Finish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Initiate => "initiate_conversation",
            Step::GetUploadUrl => "get_upload_url",
            Step::UploadToStorage => "upload_to_storage",
            Step::ConfirmUpload => "confirm_upload",
            Step::Finish => "finish_conversation",
        }
    }

    /// True for the three calls that make up one chunk upload cycle.
    pub fn is_chunk_step(&self) -> bool {
        matches!(
            self,
            Step::GetUploadUrl | Step::UploadToStorage | Step::ConfirmUpload
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Protocol,
    Parse,
}

/// Timing and result of one API call. Written once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub step: Step,
    /// `None` when no response arrived (transport failure or timeout).
    pub http_status: Option<u16>,
    pub latency: Duration,
    pub succeeded: bool,
    pub failure: Option<FailureKind>,
}

impl CallOutcome {
    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

/// A window of the run during which the scheduler ramps towards `target_vus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampStage {
    pub start_offset: Duration,
    pub duration: Duration,
    pub target_vus: usize,
}

impl RampStage {
    pub fn end_offset(&self) -> Duration {
        self.start_offset + self.duration
    }
}
