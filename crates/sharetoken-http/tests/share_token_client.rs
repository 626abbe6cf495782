//! `ShareTokenClient` against a mock HTTP server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sharetoken_core::policy::{RateLimiterConfig, RetryConfig};
use sharetoken_core::store::read_rows;
use sharetoken_core::{
    BatchProcessor, Credentials, IssueError, Mode, ProcessorConfig, Signer, TokenIssuer,
    SHARE_TOKEN_PATH,
};
use sharetoken_http::{HttpClientConfig, ShareTokenClient};
use wiremock::matchers::{body_string, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn credentials() -> Credentials {
    Credentials::new(Some("test-app-token".into()), Some("test-secret".into())).unwrap()
}

/// Millisecond backoff so retry tests finish quickly.
fn fast_config(base_url: &str) -> HttpClientConfig {
    HttpClientConfig {
        base_url: base_url.into(),
        retry: RetryConfig {
            base_backoff: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
            ..Default::default()
        },
        rate_limiter: RateLimiterConfig::default(),
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn client(server: &MockServer) -> ShareTokenClient {
    ShareTokenClient::new(&credentials(), fast_config(&server.uri())).unwrap()
}

fn token_body(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "token": token,
        "forClientId": "reap.global_116803",
    }))
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sends_signed_compact_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SHARE_TOKEN_PATH))
        .and(header("X-App-Token", "test-app-token"))
        .and(header("Content-Type", "application/json"))
        .and(header_exists("X-App-Access-Ts"))
        .and(header_exists("X-App-Access-Sig"))
        .and(body_string(
            r#"{"applicantId":"68c276d1827b5c7a72ec620e","forClientId":"reap.global_116803","ttlInSecs":1814400}"#,
        ))
        .respond_with(token_body("_act-123"))
        .expect(1)
        .mount(&server)
        .await;

    let grant = client(&server).issue("68c276d1827b5c7a72ec620e").await.unwrap();
    assert_eq!(grant.token, "_act-123");
    assert_eq!(grant.client_id.as_deref(), Some("reap.global_116803"));

    // The signature must verify against the bytes that actually arrived.
    let requests = server.received_requests().await.unwrap();
    let req = &requests[0];
    let ts: i64 = req.headers.get("x-app-access-ts").unwrap().to_str().unwrap().parse().unwrap();
    let sig = req.headers.get("x-app-access-sig").unwrap().to_str().unwrap();
    let expected = Signer::new(&credentials())
        .unwrap()
        .sign_at(ts, "POST", SHARE_TOKEN_PATH, &req.body);
    assert_eq!(sig, expected.signature);
}

#[tokio::test]
async fn retries_server_errors_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(token_body("after-retries"))
        .mount(&server)
        .await;

    let grant = client(&server).issue("app").await.unwrap();
    assert_eq!(grant.token, "after-retries");
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn gives_up_after_five_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client(&server).issue("app").await.unwrap_err();
    assert!(matches!(err, IssueError::Rejected { status: 503, ref body } if body == "maintenance"));
    assert_eq!(request_count(&server).await, 5);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad applicant"))
        .mount(&server)
        .await;

    let err = client(&server).issue("app").await.unwrap_err();
    assert!(matches!(err, IssueError::Rejected { status: 400, .. }));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn honours_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(token_body("ok"))
        .mount(&server)
        .await;

    assert_eq!(client(&server).issue("app").await.unwrap().token, "ok");
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn success_without_token_is_unusable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"forClientId": "x"})))
        .mount(&server)
        .await;

    let err = client(&server).issue("app").await.unwrap_err();
    assert!(matches!(err, IssueError::Unusable(_)));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn unreachable_service_fails_after_retries() {
    // Nothing listens on the discard port.
    let client = ShareTokenClient::new(&credentials(), fast_config("http://127.0.0.1:9")).unwrap();
    let err = client.issue("app").await.unwrap_err();
    assert!(matches!(err, IssueError::Unreachable(_)), "{err:?}");
}

#[tokio::test]
async fn batch_run_against_mock_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string(
            r#"{"applicantId":"bad","forClientId":"reap.global_116803","ttlInSecs":1814400}"#,
        ))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(token_body("issued"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.csv");
    std::fs::write(
        &input,
        "applicantId,externalId,applicantLevel\nok1,e1,basic\nbad,e2,basic\n,e3,basic\nok2,e4,basic\n",
    )
    .unwrap();
    let output = dir.path().join("output.csv");

    let issuer: Arc<dyn TokenIssuer> = Arc::new(client(&server));
    let summary = BatchProcessor::new(ProcessorConfig::default(), Mode::Live(issuer))
        .unwrap()
        .run(&input, &output)
        .await
        .unwrap();

    assert_eq!(summary.totals(), (2, 2));
    assert_eq!(request_count(&server).await, 3, "invalid row sends nothing");

    let rows = read_rows(&output).unwrap().unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].token, "issued");
    assert_eq!(rows[1].error_message, "Token generation failed");
    assert!(rows[2].error_message.contains("Missing"));
    assert_eq!(rows[3].token, "issued");
}
