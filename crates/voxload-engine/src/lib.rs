pub mod executor;
pub mod host;
pub mod ramp;
pub mod signal;
pub mod vu;
pub mod workflow;

pub use executor::{run_load, run_load_until};
pub use host::VuHost;
pub use ramp::{compute_stages, target_at, RampScheduler};
pub use signal::{VuControl, VuSignal};
pub use vu::{run_conversation, run_vu, IterationBudget, RunSettings, SharedIterations, VuContext};
pub use workflow::{
    ChunkOutcome, ConversationReport, ConversationSession, ConversationWorkflow, FailureReason,
    WorkflowSettings, WorkflowState,
};
