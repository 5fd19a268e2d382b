use crate::api_trait::ParticipantApi;
use crate::schema::{
    ordered_form_fields, ConfirmUploadRequest, InitiateRequest, InitiateResponse,
    UploadUrlRequest, UploadUrlResponse,
};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use voxload_core::config::TargetConfig;
use voxload_core::{ApiError, CallOutcome, Step, UploadTicket};
use voxload_metrics::MetricsSink;

const ACCEPT_VALUE: &str = "application/json, text/plain, */*";

/// Status code and body of a completed HTTP exchange.
struct Exchange {
    status: u16,
    body: Vec<u8>,
}

/// `reqwest`-backed participant API client.
///
/// Times every call and feeds one [`CallOutcome`] per call into the shared
/// [`MetricsSink`], whether the call succeeded or not.
pub struct HttpParticipantApi {
    client: reqwest::Client,
    api_base: String,
    user_agent: String,
    source: String,
    content_type: String,
    metrics: Arc<MetricsSink>,
}

impl HttpParticipantApi {
    pub fn new(target: &TargetConfig, metrics: Arc<MetricsSink>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(target.request_timeout())
            .user_agent(target.user_agent.clone())
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: target.api_base.trim_end_matches('/').to_string(),
            user_agent: target.user_agent.clone(),
            source: target.source.clone(),
            content_type: target.content_type.clone(),
            metrics,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/participant{}", self.api_base, path)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Exchange, ApiError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport_error)?;
        Ok(Exchange {
            status,
            body: body.to_vec(),
        })
    }

    /// Send `request`, interpret the response and record the outcome.
    async fn observe<T>(
        &self,
        step: Step,
        request: RequestBuilder,
        interpret: impl FnOnce(&Exchange) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let started = Instant::now();
        let exchange = self.execute(request).await;
        let latency = started.elapsed();

        let (http_status, result) = match exchange {
            Ok(exchange) => (Some(exchange.status), interpret(&exchange)),
            Err(e) => (None, Err(e)),
        };

        self.metrics.record_call(CallOutcome {
            step,
            http_status,
            latency,
            succeeded: result.is_ok(),
            failure: result.as_ref().err().map(ApiError::kind),
        });

        if let Err(e) = &result {
            tracing::debug!(step = step.as_str(), status = ?http_status, "call failed: {e}");
        }
        result
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Transport(format!("request timed out: {e}"))
    } else {
        ApiError::Transport(e.to_string())
    }
}

fn expect_status(expected: u16) -> impl FnOnce(&Exchange) -> Result<(), ApiError> {
    move |exchange| {
        if exchange.status == expected {
            Ok(())
        } else {
            Err(ApiError::Protocol {
                status: exchange.status,
            })
        }
    }
}

fn parse_json<T: DeserializeOwned>(exchange: &Exchange) -> Result<T, ApiError> {
    if !(200..300).contains(&exchange.status) {
        return Err(ApiError::Protocol {
            status: exchange.status,
        });
    }
    serde_json::from_slice(&exchange.body).map_err(|e| ApiError::Parse(e.to_string()))
}

#[async_trait]
impl ParticipantApi for HttpParticipantApi {
    async fn initiate(&self, project_id: &str, display_name: &str) -> Result<String, ApiError> {
        let body = InitiateRequest {
            name: display_name,
            pin: "",
            tag_id_list: Vec::new(),
            user_agent: &self.user_agent,
            source: &self.source,
        };
        let request = self
            .client
            .post(self.url(&format!("/projects/{project_id}/conversations/initiate")))
            .header(ACCEPT, ACCEPT_VALUE)
            .json(&body);

        self.observe(Step::Initiate, request, |exchange| {
            parse_json::<InitiateResponse>(exchange)?
                .into_id()
                .ok_or_else(|| ApiError::Parse("response has no conversation id".to_string()))
        })
        .await
    }

    async fn request_upload_slot(
        &self,
        conversation_id: &str,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadTicket, ApiError> {
        let body = UploadUrlRequest {
            filename,
            content_type,
            conversation_id,
        };
        let request = self
            .client
            .post(self.url(&format!("/conversations/{conversation_id}/get-upload-url")))
            .header(ACCEPT, ACCEPT_VALUE)
            .json(&body);

        self.observe(Step::GetUploadUrl, request, |exchange| {
            parse_json::<UploadUrlResponse>(exchange).map(UploadTicket::from)
        })
        .await
    }

    async fn upload_bytes(
        &self,
        ticket: &UploadTicket,
        chunk_bytes: &[u8],
        filename: &str,
    ) -> Result<(), ApiError> {
        let mut form = Form::new();
        for (name, value) in ordered_form_fields(&ticket.form_fields) {
            form = form.text(name.to_string(), value.to_string());
        }
        let file_part = || Part::bytes(chunk_bytes.to_vec()).file_name(filename.to_string());
        let file = file_part()
            .mime_str(&self.content_type)
            .unwrap_or_else(|_| file_part());
        form = form.part("file", file);

        let request = self.client.post(&ticket.upload_url).multipart(form);
        self.observe(Step::UploadToStorage, request, expect_status(204))
            .await
    }

    async fn confirm_upload(
        &self,
        conversation_id: &str,
        ticket: &UploadTicket,
        timestamp: &str,
    ) -> Result<(), ApiError> {
        let body = ConfirmUploadRequest {
            chunk_id: &ticket.chunk_id,
            file_url: &ticket.file_url,
            timestamp,
            source: &self.source,
        };
        let request = self
            .client
            .post(self.url(&format!("/conversations/{conversation_id}/confirm-upload")))
            .header(ACCEPT, ACCEPT_VALUE)
            .json(&body);

        self.observe(Step::ConfirmUpload, request, expect_status(200))
            .await
    }

    async fn finish(&self, conversation_id: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.url(&format!("/conversations/{conversation_id}/finish")))
            .header(ACCEPT, ACCEPT_VALUE);

        self.observe(Step::Finish, request, expect_status(200)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpParticipantApi {
        let target = TargetConfig {
            api_base: base.to_string(),
            ..Default::default()
        };
        HttpParticipantApi::new(&target, Arc::new(MetricsSink::new())).unwrap()
    }

    #[test]
    fn test_url_strips_trailing_slash() {
        let api = api("https://api.example.test/");
        assert_eq!(
            api.url("/conversations/abc/finish"),
            "https://api.example.test/api/participant/conversations/abc/finish"
        );
    }

    #[test]
    fn test_expect_status_exact_match_only() {
        let ok = Exchange {
            status: 204,
            body: Vec::new(),
        };
        assert!(expect_status(204)(&ok).is_ok());
        assert_eq!(
            expect_status(200)(&ok),
            Err(ApiError::Protocol { status: 204 })
        );
    }

    #[test]
    fn test_parse_json_rejects_non_success_status() {
        let exchange = Exchange {
            status: 503,
            body: br#"{"id":"abc"}"#.to_vec(),
        };
        let result = parse_json::<InitiateResponse>(&exchange);
        assert!(matches!(result, Err(ApiError::Protocol { status: 503 })));
    }

    #[test]
    fn test_parse_json_malformed_body() {
        let exchange = Exchange {
            status: 200,
            body: b"<html>gateway</html>".to_vec(),
        };
        let result = parse_json::<InitiateResponse>(&exchange);
        assert!(matches!(result, Err(ApiError::Parse(_))));
    }
}
