//! End-to-end relay tests: in-process axum server against a mocked
//! upstream endpoint.

use axum_test::TestServer;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use solver_core::relay::{build_relay_router_with_shared_state, AppState, RelayConfig};
use solver_core::relay::security::RelaySecurityConfig;

const BOUNDARY: &str = "solver-test-boundary-7MA4YWxkTrZu0gW";
const MODEL: &str = "gemini-3-flash-preview";

fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

fn multipart_body(fields: &[(&str, &str)], images: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (file_name, mime, bytes) in images {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
                 filename=\"{file_name}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn config_for(upstream: &MockServer) -> RelayConfig {
    RelayConfig {
        upstream_url: Some(upstream.uri()),
        default_api_key: Some("env-default-key".to_string()),
        ..Default::default()
    }
}

fn server_for(config: &RelayConfig) -> (TestServer, AppState) {
    let state = AppState::new(config).expect("state");
    let app = build_relay_router_with_shared_state(state.clone());
    (TestServer::new(app).expect("test server"), state)
}

fn gemini_answer(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"parts": [{"text": text}], "role": "model"},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"totalTokenCount": 5}
    })
}

fn sse_frames(frames: &[Value]) -> String {
    frames.iter().map(|f| format!("data: {f}\n\n")).collect()
}

/// Split a collected SSE body into (event, payload) pairs.
fn parse_sse(text: &str) -> Vec<(String, Value)> {
    text.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .map(|block| {
            let mut event = String::new();
            let mut data = String::new();
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event: ") {
                    event = v.to_string();
                } else if let Some(v) = line.strip_prefix("data: ") {
                    data = v.to_string();
                }
            }
            let payload = serde_json::from_str(&data).expect("event payload is JSON");
            (event, payload)
        })
        .collect()
}

#[tokio::test]
async fn blocking_solve_returns_answer_and_usage() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:generateContent")))
        .and(header("x-goog-api-key", "env-default-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_answer("4")))
        .expect(1)
        .mount(&upstream)
        .await;

    let (server, _) = server_for(&config_for(&upstream));
    let response = server
        .post("/api/solve")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[("prompt", "2+2=")], &[]).into())
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["answer"], "4");
    assert_eq!(body["usage"]["totalTokenCount"], 5);
    assert_eq!(body["model"], MODEL);
}

#[tokio::test]
async fn blocking_solve_substitutes_placeholder_for_empty_answer() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:generateContent")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"candidates": [{"finishReason": "STOP"}]})),
        )
        .mount(&upstream)
        .await;

    let (server, _) = server_for(&config_for(&upstream));
    let response = server
        .post("/api/solve")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[("prompt", "anything")], &[]).into())
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["answer"], "No answer returned.");
}

#[tokio::test]
async fn upstream_failure_passes_through_status_message_and_details() {
    let upstream = MockServer::start().await;
    let error_body = json!({
        "error": {"code": 429, "message": "RESOURCE_EXHAUSTED", "status": "RESOURCE_EXHAUSTED"}
    });
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:generateContent")))
        .respond_with(ResponseTemplate::new(429).set_body_json(error_body.clone()))
        .mount(&upstream)
        .await;

    let (server, _) = server_for(&config_for(&upstream));
    let response = server
        .post("/api/solve")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[("prompt", "2+2=")], &[]).into())
        .await;

    response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    let body: Value = response.json();
    assert_eq!(body["error"], "RESOURCE_EXHAUSTED");
    assert_eq!(body["details"], error_body);
}

#[tokio::test]
async fn empty_request_is_rejected_before_upstream() {
    let upstream = MockServer::start().await;
    // No mocks mounted: any upstream call would 404 and fail the test below.
    let (server, _) = server_for(&config_for(&upstream));

    let response = server
        .post("/api/solve")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[("prompt", "   ")], &[]).into())
        .await;

    response.assert_status_bad_request();
    assert_eq!(upstream.received_requests().await.unwrap_or_default().len(), 0);
}

#[tokio::test]
async fn unsupported_image_type_is_rejected_locally() {
    let upstream = MockServer::start().await;
    let (server, _) = server_for(&config_for(&upstream));

    let response = server
        .post("/api/solve")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[], &[("anim.gif", "image/gif", b"GIF89a")]).into())
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("PNG/JPEG/WebP"));
    assert_eq!(upstream.received_requests().await.unwrap_or_default().len(), 0);
}

#[tokio::test]
async fn missing_configuration_is_a_server_error() {
    let config = RelayConfig::default();
    let (server, _) = server_for(&config);

    let response = server
        .post("/api/solve")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[("prompt", "2+2=")], &[]).into())
        .await;

    response.assert_status(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("no upstream API key"));
}

#[tokio::test]
async fn privileged_caller_overrides_the_shared_key() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:generateContent")))
        .and(header("x-goog-api-key", "caller-own-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_answer("ok")))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut config = config_for(&upstream);
    config.shared_api_key = Some("shared-key".to_string());
    config.security = RelaySecurityConfig {
        caller_key: Some("caller-secret".to_string()),
        admin_key: Some("admin-secret".to_string()),
    };
    let (server, _) = server_for(&config);

    let response = server
        .post("/api/solve")
        .authorization_bearer("admin-secret")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[("prompt", "2+2="), ("apiKey", "caller-own-key")], &[]).into())
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn regular_caller_supplied_key_is_ignored() {
    let upstream = MockServer::start().await;
    // The mock only matches the shared key; a leaked caller key would 404.
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:generateContent")))
        .and(header("x-goog-api-key", "shared-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_answer("ok")))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut config = config_for(&upstream);
    config.shared_api_key = Some("shared-key".to_string());
    config.security =
        RelaySecurityConfig { caller_key: Some("caller-secret".to_string()), admin_key: None };
    let (server, _) = server_for(&config);

    let response = server
        .post("/api/solve")
        .authorization_bearer("caller-secret")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[("prompt", "2+2="), ("apiKey", "caller-own-key")], &[]).into())
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn unauthenticated_caller_is_rejected() {
    let upstream = MockServer::start().await;
    let mut config = config_for(&upstream);
    config.security =
        RelaySecurityConfig { caller_key: Some("caller-secret".to_string()), admin_key: None };
    let (server, _) = server_for(&config);

    let response = server
        .post("/api/solve")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[("prompt", "2+2=")], &[]).into())
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn health_probe_needs_no_auth() {
    let upstream = MockServer::start().await;
    let mut config = config_for(&upstream);
    config.security =
        RelaySecurityConfig { caller_key: Some("caller-secret".to_string()), admin_key: None };
    let (server, _) = server_for(&config);

    let response = server.get("/health").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn stream_relays_chunks_then_done_with_usage() {
    let upstream = MockServer::start().await;
    let frames = sse_frames(&[
        json!({"candidates": [{"content": {"parts": [{"text": "4"}]}}]}),
        json!({"usageMetadata": {"totalTokenCount": 5}}),
    ]);
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:streamGenerateContent")))
        .and(query_param("alt", "sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(frames, "text/event-stream"))
        .expect(1)
        .mount(&upstream)
        .await;
    // The fallback guard must not fire when the stream carried text.
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:generateContent")))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_answer("unused")))
        .expect(0)
        .mount(&upstream)
        .await;

    let (server, _) = server_for(&config_for(&upstream));
    let response = server
        .post("/api/solve-stream")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[("prompt", "2+2=")], &[]).into())
        .await;

    response.assert_status_ok();
    assert!(response
        .headers()
        .get("content-type")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .starts_with("text/event-stream"));

    let events = parse_sse(&response.text());
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], ("chunk".to_string(), json!({"text": "4"})));
    assert_eq!(
        events[1],
        ("done".to_string(), json!({"usage": {"totalTokenCount": 5}, "model": MODEL})),
    );
}

#[tokio::test]
async fn empty_stream_falls_back_to_exactly_one_blocking_call() {
    let upstream = MockServer::start().await;
    let frames = sse_frames(&[json!({"candidates": [{"finishReason": "STOP"}]})]);
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:streamGenerateContent")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(frames, "text/event-stream"))
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:generateContent")))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_answer("fallback answer")))
        .expect(1)
        .mount(&upstream)
        .await;

    let (server, _) = server_for(&config_for(&upstream));
    let response = server
        .post("/api/solve-stream")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[("prompt", "2+2=")], &[]).into())
        .await;

    response.assert_status_ok();
    let events = parse_sse(&response.text());
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], ("chunk".to_string(), json!({"text": "fallback answer"})));
    assert_eq!(events[1].0, "done");
    assert_eq!(events[1].1["usage"]["totalTokenCount"], 5);
}

#[tokio::test]
async fn failed_fallback_emits_error_event_with_block_reason() {
    let upstream = MockServer::start().await;
    let frames = sse_frames(&[json!({"promptFeedback": {"blockReason": "SAFETY"}})]);
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:streamGenerateContent")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(frames, "text/event-stream"))
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:generateContent")))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"code": 500, "message": "Internal error"}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let (server, _) = server_for(&config_for(&upstream));
    let response = server
        .post("/api/solve-stream")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[("prompt", "2+2=")], &[]).into())
        .await;

    response.assert_status_ok();
    let events = parse_sse(&response.text());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "error");
    assert_eq!(events[0].1["status"], 500);
    // The streaming attempt's block reason outranks the generic message.
    assert!(events[0].1["message"].as_str().unwrap().contains("SAFETY"));
}

#[tokio::test]
async fn textless_fallback_emits_no_displayable_text_error() {
    let upstream = MockServer::start().await;
    let frames = sse_frames(&[json!({"candidates": [{"finishReason": "MAX_TOKENS"}]})]);
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:streamGenerateContent")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(frames, "text/event-stream"))
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:generateContent")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"candidates": [{"finishReason": "MAX_TOKENS"}]})),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let (server, _) = server_for(&config_for(&upstream));
    let response = server
        .post("/api/solve-stream")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[("prompt", "2+2=")], &[]).into())
        .await;

    response.assert_status_ok();
    let events = parse_sse(&response.text());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "error");
    let message = events[0].1["message"].as_str().unwrap();
    assert!(message.contains("no displayable text"));
    assert!(message.contains("MAX_TOKENS"));
}

#[tokio::test]
async fn stream_upstream_rejection_is_plain_json_not_sse() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:streamGenerateContent")))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "API key not valid"}
        })))
        .mount(&upstream)
        .await;

    let (server, _) = server_for(&config_for(&upstream));
    let response = server
        .post("/api/solve-stream")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&[("prompt", "2+2=")], &[]).into())
        .await;

    response.assert_status(axum::http::StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"], "API key not valid");
}

#[tokio::test]
async fn image_parts_reach_upstream_in_order() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{MODEL}:generateContent")))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_answer("seen")))
        .expect(1)
        .mount(&upstream)
        .await;

    let (server, _) = server_for(&config_for(&upstream));
    let response = server
        .post("/api/solve")
        .content_type(&multipart_content_type())
        .bytes(
            multipart_body(
                &[("prompt", "what is in the picture")],
                &[("a.png", "image/png", b"png-bytes"), ("b.webp", "image/webp", b"webp-bytes")],
            )
            .into(),
        )
        .await;
    response.assert_status_ok();

    let requests = upstream.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0]["text"], "what is in the picture");
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
    assert_eq!(parts[2]["inline_data"]["mime_type"], "image/webp");
}
