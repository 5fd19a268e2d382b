pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, ConfigOverrides, ExecutorKind, SelectionMode};
pub use error::{ApiError, ConfigError, PoolError};
pub use types::{
    AudioChunk, CallOutcome, ChunkSelection, FailureKind, RampStage, Step, UploadTicket,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_chunk_selection_end() {
        let selection = ChunkSelection {
            start_index: 3,
            count: 5,
        };
        assert_eq!(selection.end(), 8);
    }

    #[test]
    fn test_step_names_match_request_tags() {
        let names: Vec<_> = Step::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "initiate_conversation",
                "get_upload_url",
                "upload_to_storage",
                "confirm_upload",
                "finish_conversation",
            ]
        );
    }

    #[test]
    fn test_only_upload_cycle_steps_are_chunk_steps() {
        assert!(!Step::Initiate.is_chunk_step());
        assert!(Step::GetUploadUrl.is_chunk_step());
        assert!(Step::UploadToStorage.is_chunk_step());
        assert!(Step::ConfirmUpload.is_chunk_step());
        assert!(!Step::Finish.is_chunk_step());
    }

    #[test]
    fn test_api_error_kind() {
        assert_eq!(
            ApiError::Transport("timed out".into()).kind(),
            FailureKind::Transport
        );
        assert_eq!(ApiError::Protocol { status: 502 }.kind(), FailureKind::Protocol);
        assert_eq!(ApiError::Parse("eof".into()).kind(), FailureKind::Parse);
    }

    #[test]
    fn test_call_outcome_latency_ms() {
        let outcome = CallOutcome {
            step: Step::Finish,
            http_status: Some(200),
            latency: Duration::from_micros(12_500),
            succeeded: true,
            failure: None,
        };
        assert_eq!(outcome.latency_ms(), 12.5);
    }

    #[test]
    fn test_ramp_stage_end_offset() {
        let stage = RampStage {
            start_offset: Duration::from_secs(60),
            duration: Duration::from_secs(60),
            target_vus: 5,
        };
        assert_eq!(stage.end_offset(), Duration::from_secs(120));
    }
}
