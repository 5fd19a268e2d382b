pub mod api_trait;
pub mod http_client;
pub mod schema;

pub use api_trait::ParticipantApi;
pub use http_client::HttpParticipantApi;
