//! HTTP-level tests of the client against a mock server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use dashsync_core::api::{ApiClient, ErrorCode, ReqwestTransport, RequestDescriptor, RetryPolicy};
use dashsync_core::auth::{Credential, CredentialManager, Login, MemoryTokenStore, TokenStore, TransportTokenSource};
use dashsync_core::dashboard::series_key;
use dashsync_core::models::HealthStatus;
use dashsync_core::{Config, Dashboard};

const OLD_TOKEN: &str = "old.old.old";
const NEW_TOKEN: &str = "new.new.new";

fn client_for(server: &MockServer, store: Arc<MemoryTokenStore>, login: Option<Login>) -> ApiClient {
    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(2)).unwrap());
    let source = Arc::new(TransportTokenSource::new(
        transport.clone(),
        format!("{}/auth/token", server.uri()),
        login,
    ));
    let credentials = CredentialManager::new(source, store, Duration::from_secs(30));
    credentials.load();
    ApiClient::new(
        transport,
        server.uri(),
        "/auth/token",
        RetryPolicy::new(3, Duration::from_millis(10)),
        credentials,
    )
}

fn stored(token: &str) -> Arc<MemoryTokenStore> {
    Arc::new(MemoryTokenStore::with_credential(Credential::new(token)))
}

#[tokio::test]
async fn test_requests_carry_bearer_and_distinct_request_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health"))
        .and(header("authorization", "Bearer old.old.old"))
        .and(header_exists("x-request-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, stored(OLD_TOKEN), None);
    client.submit(RequestDescriptor::get("/v1/health")).await.unwrap();
    client.submit(RequestDescriptor::get("/v1/health")).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let ids: Vec<&str> = requests
        .iter()
        .map(|r| r.headers.get("x-request-id").unwrap().to_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn test_unauthorized_refreshes_and_replays_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_json(json!({"username": "ops", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": NEW_TOKEN})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/metrics/mps"))
        .and(header("authorization", "Bearer new.new.new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 3.5})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/metrics/mps"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "token expired"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = stored(OLD_TOKEN);
    let login = Login {
        username: "ops".to_string(),
        password: "pw".to_string(),
    };
    let client = client_for(&server, store.clone(), Some(login));

    let value: Value = client.get_json(RequestDescriptor::get("/v1/metrics/mps")).await.unwrap();

    assert_eq!(value["value"], 3.5);
    assert_eq!(client.credentials().current().unwrap().token, NEW_TOKEN);
    assert_eq!(store.load().unwrap().unwrap().token, NEW_TOKEN);
    assert_eq!(client.stats().auth_replays, 1);

    let auth = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/auth/token")
        .unwrap();
    assert!(auth.headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_failed_refresh_surfaces_first_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "not-a-token"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/health"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "token expired"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, stored(OLD_TOKEN), None);
    let err = client.submit(RequestDescriptor::get("/v1/health")).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::Unauthorized);
    assert_eq!(err.status, Some(401));
    assert_eq!(err.message, "token expired");
    assert_eq!(client.credentials().current().unwrap().token, OLD_TOKEN);
}

#[tokio::test]
async fn test_server_error_is_retried_for_get() {
    let server = MockServer::start().await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();
    Mock::given(method("GET"))
        .and(path("/v1/health"))
        .respond_with(move |_req: &Request| -> ResponseTemplate {
            if attempts_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(503)
            } else {
                ResponseTemplate::new(200).set_body_json(json!({"status": "ok"}))
            }
        })
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, stored(OLD_TOKEN), None);
    let response = client.submit(RequestDescriptor::get("/v1/health")).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(client.stats().retries, 1);
}

#[tokio::test]
async fn test_post_is_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/jobs"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, stored(OLD_TOKEN), None);
    let err = client
        .post_json::<Value, _>("/v1/jobs", &json!({"kind": "reindex"}))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::Internal);
    assert_eq!(err.status, Some(503));
    assert_eq!(err.message, "upstream unavailable");
}

#[tokio::test]
async fn test_error_statuses_are_normalized() {
    let server = MockServer::start().await;
    Mock::given(path("/v1/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "no such run"})))
        .mount(&server)
        .await;
    Mock::given(path("/v1/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(path("/v1/bad"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(json!({"message": "invalid range", "errors": {"range": "unknown"}})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, stored(OLD_TOKEN), None);

    let missing = client.submit(RequestDescriptor::get("/v1/missing")).await.unwrap_err();
    assert_eq!(missing.code, ErrorCode::NotFound);
    assert_eq!(missing.message, "no such run");

    let busy = client.submit(RequestDescriptor::get("/v1/busy")).await.unwrap_err();
    assert_eq!(busy.code, ErrorCode::RateLimit);

    let bad = client.submit(RequestDescriptor::get("/v1/bad")).await.unwrap_err();
    assert_eq!(bad.code, ErrorCode::Validation);
    assert_eq!(bad.details, Some(json!({"range": "unknown"})));

    assert_eq!(client.stats().errors, 3);
}

#[derive(Debug, Deserialize, PartialEq)]
struct Run {
    id: u32,
}

#[tokio::test]
async fn test_list_envelopes() {
    let server = MockServer::start().await;
    Mock::given(path("/v1/runs/bare"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
        .mount(&server)
        .await;
    Mock::given(path("/v1/runs/paged"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"items": [{"id": 3}], "nextOffset": 20})),
        )
        .mount(&server)
        .await;
    Mock::given(path("/v1/runs/odd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = client_for(&server, stored(OLD_TOKEN), None);

    let bare = client.get_list::<Run>(RequestDescriptor::get("/v1/runs/bare")).await.unwrap();
    assert_eq!(bare.items, vec![Run { id: 1 }, Run { id: 2 }]);
    assert!(!bare.has_more());

    let paged = client.get_list::<Run>(RequestDescriptor::get("/v1/runs/paged")).await.unwrap();
    assert_eq!(paged.items, vec![Run { id: 3 }]);
    assert_eq!(paged.next_offset, Some(20));

    let odd = client.get_list::<Run>(RequestDescriptor::get("/v1/runs/odd")).await.unwrap_err();
    assert_eq!(odd.code, ErrorCode::Internal);
    assert!(odd.message.contains("unrecognized list envelope"));
}

#[tokio::test]
async fn test_dashboard_over_http() {
    let server = MockServer::start().await;
    Mock::given(path("/v1/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "crit"})))
        .mount(&server)
        .await;
    let points: Vec<Value> = (0..500)
        .map(|i| json!({"ts": format!("2026-02-01T{:02}:{:02}:00Z", i / 60 % 24, i % 60), "value": i}))
        .collect();
    Mock::given(path("/v1/metrics/rps"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"series": [{"metric": "rps", "points": points}], "range": "7d"})),
        )
        .mount(&server)
        .await;

    let config = Config {
        api_base_url: server.uri(),
        series_max_points: 100,
        backoff_base_ms: 10,
        ..Config::default()
    };
    let dashboard = Dashboard::with_transport(
        config,
        Arc::new(ReqwestTransport::new(Duration::from_secs(2)).unwrap()),
        Arc::new(MemoryTokenStore::new()),
    );

    let health = dashboard.fetch_health().await.unwrap();
    assert_eq!(health.status, HealthStatus::Crit);
    assert_eq!(health.crit, 1);

    dashboard.fetch_metric_series("rps", "7d").await.unwrap();
    let series = dashboard.select_series(&series_key("rps", "7d")).unwrap();
    assert!(series.series[0].points.len() <= 100);
    assert_eq!(series.series[0].points.last().unwrap().value, 499.0);

    let requests = server.received_requests().await.unwrap();
    let rps = requests.iter().find(|r| r.url.path() == "/v1/metrics/rps").unwrap();
    assert_eq!(rps.url.query(), Some("range=7d"));
}
