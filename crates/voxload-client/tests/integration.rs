use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use voxload_client::{HttpParticipantApi, ParticipantApi};
use voxload_core::config::TargetConfig;
use voxload_core::{ApiError, FailureKind, Step, UploadTicket};
use voxload_metrics::MetricsSink;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn target(base: &str) -> TargetConfig {
    TargetConfig {
        api_base: base.to_string(),
        user_agent: "voxload-test".to_string(),
        ..Default::default()
    }
}

fn client(base: &str) -> (HttpParticipantApi, Arc<MetricsSink>) {
    let metrics = Arc::new(MetricsSink::new());
    let api = HttpParticipantApi::new(&target(base), Arc::clone(&metrics)).unwrap();
    (api, metrics)
}

fn ticket(upload_url: String) -> UploadTicket {
    let fields: BTreeMap<String, String> = [
        ("signature", "sig"),
        ("policy", "pol"),
        ("key", "uploads/abc/chunk.webm"),
        ("acl", "private"),
        ("AWSAccessKeyId", "AKIATEST"),
        ("Content-Type", "audio/webm"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    UploadTicket {
        chunk_id: "chunk-1".to_string(),
        upload_url,
        form_fields: fields,
        file_url: "https://storage.test/uploads/abc/chunk.webm".to_string(),
    }
}

#[tokio::test]
async fn test_initiate_posts_metadata_and_returns_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/participant/projects/proj-1/conversations/initiate"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "name": "Mass Test - VU1 - Iter0",
            "pin": "",
            "tag_id_list": [],
            "user_agent": "voxload-test",
            "source": "PORTAL_AUDIO",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "abc"})))
        .expect(1)
        .mount(&server)
        .await;

    let (api, metrics) = client(&server.uri());
    let id = api.initiate("proj-1", "Mass Test - VU1 - Iter0").await.unwrap();
    assert_eq!(id, "abc");

    let outcomes = metrics.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].step, Step::Initiate);
    assert_eq!(outcomes[0].http_status, Some(200));
    assert!(outcomes[0].succeeded);
    assert!(outcomes[0].failure.is_none());
}

#[tokio::test]
async fn test_initiate_unparseable_body_is_parse_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/participant/projects/proj-1/conversations/initiate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let (api, metrics) = client(&server.uri());
    let err = api.initiate("proj-1", "x").await.unwrap_err();
    assert!(matches!(err, ApiError::Parse(_)));

    let outcomes = metrics.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].succeeded);
    assert_eq!(outcomes[0].http_status, Some(200));
    assert_eq!(outcomes[0].failure, Some(FailureKind::Parse));
}

#[tokio::test]
async fn test_initiate_missing_id_is_parse_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    let (api, _metrics) = client(&server.uri());
    let err = api.initiate("proj-1", "x").await.unwrap_err();
    assert!(matches!(err, ApiError::Parse(_)));
}

#[tokio::test]
async fn test_initiate_server_error_is_protocol_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (api, metrics) = client(&server.uri());
    let err = api.initiate("proj-1", "x").await.unwrap_err();
    assert_eq!(err, ApiError::Protocol { status: 500 });
    assert_eq!(metrics.outcomes()[0].failure, Some(FailureKind::Protocol));
}

#[tokio::test]
async fn test_connection_refused_is_transport_failure() {
    let (api, metrics) = client("http://127.0.0.1:1");
    let err = api.initiate("proj-1", "x").await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));

    let outcomes = metrics.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].http_status, None);
    assert_eq!(outcomes[0].failure, Some(FailureKind::Transport));
}

#[tokio::test]
async fn test_timeout_is_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let metrics = Arc::new(MetricsSink::new());
    let mut config = target(&server.uri());
    config.request_timeout_secs = 0.2;
    let api = HttpParticipantApi::new(&config, Arc::clone(&metrics)).unwrap();

    let err = api.finish("abc").await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
    assert_eq!(metrics.outcomes()[0].http_status, None);
}

#[tokio::test]
async fn test_request_upload_slot_returns_ticket() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/participant/conversations/abc/get-upload-url"))
        .and(body_json(json!({
            "filename": "chunk-1700000000000.webm",
            "content_type": "audio/webm",
            "conversation_id": "abc",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chunk_id": "chunk-1",
            "upload_url": "https://storage.test/bucket",
            "fields": {"key": "uploads/abc/chunk.webm", "acl": "private"},
            "file_url": "https://storage.test/bucket/uploads/abc/chunk.webm",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, metrics) = client(&server.uri());
    let ticket = api
        .request_upload_slot("abc", "chunk-1700000000000.webm", "audio/webm")
        .await
        .unwrap();
    assert_eq!(ticket.chunk_id, "chunk-1");
    assert_eq!(ticket.upload_url, "https://storage.test/bucket");
    assert_eq!(
        ticket.form_fields.get("acl").map(String::as_str),
        Some("private")
    );
    assert_eq!(
        ticket.file_url,
        "https://storage.test/bucket/uploads/abc/chunk.webm"
    );
    assert_eq!(metrics.outcomes()[0].step, Step::GetUploadUrl);
}

#[tokio::test]
async fn test_request_upload_slot_incomplete_ticket_is_parse_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"chunk_id": "c"})))
        .mount(&server)
        .await;

    let (api, _metrics) = client(&server.uri());
    let err = api
        .request_upload_slot("abc", "chunk-1.webm", "audio/webm")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Parse(_)));
}

#[tokio::test]
async fn test_upload_bytes_sends_ordered_multipart_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bucket"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (api, metrics) = client("http://unused.invalid");
    let ticket = ticket(format!("{}/bucket", server.uri()));
    api.upload_bytes(&ticket, b"WEBMDATA", "chunk_003.webm")
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).to_string();
    let position = |needle: &str| {
        body.find(needle)
            .unwrap_or_else(|| panic!("{needle} missing from body"))
    };

    let order = [
        position("name=\"acl\""),
        position("name=\"Content-Type\""),
        position("name=\"key\""),
        position("name=\"AWSAccessKeyId\""),
        position("name=\"policy\""),
        position("name=\"signature\""),
        position("name=\"file\""),
    ];
    assert!(order.windows(2).all(|w| w[0] < w[1]));
    assert!(body.contains("filename=\"chunk_003.webm\""));
    assert!(body.contains("WEBMDATA"));
    assert!(body.contains("uploads/abc/chunk.webm"));

    let outcomes = metrics.outcomes();
    assert_eq!(outcomes[0].step, Step::UploadToStorage);
    assert_eq!(outcomes[0].http_status, Some(204));
    assert!(outcomes[0].succeeded);
}

#[tokio::test]
async fn test_upload_bytes_requires_204() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (api, metrics) = client("http://unused.invalid");
    let err = api
        .upload_bytes(&ticket(server.uri()), b"x", "chunk_000.webm")
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::Protocol { status: 200 });
    assert!(!metrics.outcomes()[0].succeeded);
}

#[tokio::test]
async fn test_confirm_upload_posts_ticket_details() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/participant/conversations/abc/confirm-upload"))
        .and(body_json(json!({
            "chunk_id": "chunk-1",
            "file_url": "https://storage.test/uploads/abc/chunk.webm",
            "timestamp": "2026-01-01T00:00:00.000Z",
            "source": "PORTAL_AUDIO",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (api, metrics) = client(&server.uri());
    api.confirm_upload(
        "abc",
        &ticket("https://storage.test/bucket".to_string()),
        "2026-01-01T00:00:00.000Z",
    )
    .await
    .unwrap();
    assert_eq!(metrics.outcomes()[0].step, Step::ConfirmUpload);
}

#[tokio::test]
async fn test_confirm_upload_requires_exactly_200() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let (api, _metrics) = client(&server.uri());
    let err = api
        .confirm_upload("abc", &ticket("https://s".to_string()), "t")
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::Protocol { status: 201 });
}

#[tokio::test]
async fn test_finish_posts_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/participant/conversations/abc/finish"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (api, metrics) = client(&server.uri());
    api.finish("abc").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].body.is_empty());
    assert_eq!(metrics.outcomes()[0].step, Step::Finish);
    assert!(metrics.outcomes()[0].succeeded);
}

#[tokio::test]
async fn test_finish_failure_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let (api, metrics) = client(&server.uri());
    assert_eq!(
        api.finish("abc").await.unwrap_err(),
        ApiError::Protocol { status: 409 }
    );
    assert_eq!(metrics.report().step(Step::Finish).unwrap().failed, 1);
}
