//! API endpoint integration tests

use std::path::PathBuf;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use chatvoice::api::{ApiServer, ApiState};
use chatvoice::config::ServerConfig;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header as header_eq, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOUNDARY: &str = "chatvoice-test-boundary";

/// Build a test API router against a mock upstream
fn build_test_router(
    upstream: &str,
    api_key: Option<&str>,
    static_dir: Option<PathBuf>,
) -> axum::Router {
    let server = ServerConfig {
        upstream_url: upstream.to_string(),
        api_key: api_key.map(|k| SecretString::from(k.to_string())),
        workflow_id: Some("wf_test".to_string()),
        domain_key: Some("domain_pk_test".to_string()),
        default_user: "guest".to_string(),
        ..ServerConfig::default()
    };
    let state = ApiState::new(&server, "whisper-1").unwrap();
    ApiServer::new(state, 0, static_dir).router()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn session_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chatkit/session")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart_request(parts: &[(&str, Option<(&str, &str)>, &str)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, file, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file {
            Some((filename, mime)) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {mime}\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/transcribe")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_router("http://127.0.0.1:9", None, None);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["timestamp"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn test_session_forwards_to_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chatkit/sessions"))
        .and(header_eq("authorization", "Bearer sk-test"))
        .and(header_eq("openai-beta", "chatkit_beta=v1"))
        .and(header_eq("openai-domain-key", "domain_pk_test"))
        .and(body_partial_json(json!({"workflow": {"id": "wf_test"}, "user": "u1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"client_secret": "cs_123"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = build_test_router(&upstream.uri(), Some("sk-test"), None);
    let response = app
        .oneshot(session_request(r#"{"origin":"http://localhost:3000","userId":"u1"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"client_secret": "cs_123", "origin": "http://localhost:3000"})
    );
}

#[tokio::test]
async fn test_session_defaults_user_and_origin_header() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chatkit/sessions"))
        .and(body_partial_json(json!({"user": "guest"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"client_secret": "cs_456"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = build_test_router(&upstream.uri(), Some("sk-test"), None);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chatkit/session")
                .header(header::ORIGIN, "http://page.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["origin"], "http://page.test");
}

#[tokio::test]
async fn test_session_maps_upstream_unauthorized() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chatkit/sessions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&upstream)
        .await;

    let app = build_test_router(&upstream.uri(), Some("sk-wrong"), None);
    let response = app.oneshot(session_request("{}")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "Invalid OpenAI API key");
}

#[tokio::test]
async fn test_session_maps_upstream_forbidden() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chatkit/sessions"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&upstream)
        .await;

    let app = build_test_router(&upstream.uri(), Some("sk-test"), None);
    let response = app.oneshot(session_request("{}")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        json_body(response).await["error"],
        "ChatKit access not enabled for this API key"
    );
}

#[tokio::test]
async fn test_session_without_secret_is_bad_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chatkit/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "sess_1"})))
        .mount(&upstream)
        .await;

    let app = build_test_router(&upstream.uri(), Some("sk-test"), None);
    let response = app.oneshot(session_request("{}")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn test_session_without_api_key() {
    let app = build_test_router("http://127.0.0.1:9", None, None);
    let response = app.oneshot(session_request("{}")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "OPENAI_API_KEY is not set");
}

#[tokio::test]
async fn test_session_rejects_invalid_json() {
    let app = build_test_router("http://127.0.0.1:9", Some("sk-test"), None);
    let response = app.oneshot(session_request("{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transcribe_forwards_upload() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .and(header_eq("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "hello world"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = build_test_router(&upstream.uri(), Some("sk-test"), None);
    let response = app
        .oneshot(multipart_request(&[
            ("file", Some(("recording.m4a", "audio/mp4")), "audio-bytes"),
            ("model", None, "whisper-1"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"text": "hello world"}));

    let requests = upstream.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).into_owned();
    assert!(body.contains(r#"filename="recording.m4a""#));
    assert!(body.contains("audio-bytes"));
    assert!(body.contains("whisper-1"));
}

#[tokio::test]
async fn test_transcribe_keeps_client_filename() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "ok"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = build_test_router(&upstream.uri(), Some("sk-test"), None);
    let response = app
        .oneshot(multipart_request(&[(
            "file",
            Some(("clip.m4a", "application/octet-stream")),
            "audio-bytes",
        )]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let requests = upstream.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).into_owned();
    assert!(body.contains(r#"filename="clip.m4a""#));
    assert!(!body.contains("recording.webm"));
}

#[tokio::test]
async fn test_transcribe_without_file() {
    let app = build_test_router("http://127.0.0.1:9", Some("sk-test"), None);
    let response = app
        .oneshot(multipart_request(&[("model", None, "whisper-1")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "No audio file provided");
}

#[tokio::test]
async fn test_transcribe_upstream_failure() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&upstream)
        .await;

    let app = build_test_router(&upstream.uri(), Some("sk-test"), None);
    let response = app
        .oneshot(multipart_request(&[(
            "file",
            Some(("recording.webm", "audio/webm")),
            "audio-bytes",
        )]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let error = json_body(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("overloaded"));
}

#[tokio::test]
async fn test_static_dir_falls_back_to_index() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<html>chat</html>").unwrap();

    let app = build_test_router("http://127.0.0.1:9", None, Some(dir.path().to_path_buf()));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/some/client/route")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"<html>chat</html>");
}
