use async_trait::async_trait;
use voxload_core::{ApiError, UploadTicket};

/// The five participant calls a simulated conversation is made of.
///
/// Implementations never retry: a failed call is reported once as an
/// [`ApiError`] and the workflow decides whether the session continues.
/// Every call records exactly one [`CallOutcome`](voxload_core::CallOutcome).
#[async_trait]
pub trait ParticipantApi: Send + Sync {
    /// Start a conversation and return its id.
    async fn initiate(&self, project_id: &str, display_name: &str) -> Result<String, ApiError>;

    /// Ask for a pre-signed storage slot for the next chunk.
    async fn request_upload_slot(
        &self,
        conversation_id: &str,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadTicket, ApiError>;

    /// Post the chunk straight to storage. Succeeds on `204` only.
    async fn upload_bytes(
        &self,
        ticket: &UploadTicket,
        chunk_bytes: &[u8],
        filename: &str,
    ) -> Result<(), ApiError>;

    /// Tell the API the chunk landed. Succeeds on `200` only.
    async fn confirm_upload(
        &self,
        conversation_id: &str,
        ticket: &UploadTicket,
        timestamp: &str,
    ) -> Result<(), ApiError>;

    /// Close the conversation. Succeeds on `200` only.
    async fn finish(&self, conversation_id: &str) -> Result<(), ApiError>;
}
