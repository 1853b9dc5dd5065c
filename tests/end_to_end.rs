//! End-to-end scenarios spanning resolution, the retry/circuit-breaker stack, and adapter
//! dispatch, against a mock resolver and mock source.

use std::collections::HashMap;

use serde_json::json;
use wayfare::client::{ReadOptions, WayfareClient};
use wayfare::Config;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_against(server: &MockServer) -> WayfareClient {
    let mut config = Config::default();
    config.service_url = server.uri();
    config.report_telemetry = false;
    WayfareClient::new(config).unwrap()
}

/// After five consecutive 500s from `/resolve/...`, the breaker trips open and the next call
/// fails fast, never reaching the server.
#[tokio::test]
async fn breaker_opens_after_five_consecutive_failures_then_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resolve/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_against(&server).await;

    for _ in 0..5 {
        let err = client.resolve("flaky").await.unwrap_err();
        assert!(!err.is_not_found());
    }

    let requests_before = server.received_requests().await.unwrap().len();

    let err = client.resolve("flaky").await.unwrap_err();
    assert!(err.to_string().contains("circuit breaker"), "unexpected error: {err}");

    let requests_after = server.received_requests().await.unwrap().len();
    assert_eq!(
        requests_before, requests_after,
        "the 6th call must fail fast without issuing an HTTP request"
    );
}

/// A moniker resolving to an HTTP binding, with exactly two HTTP requests: the resolver's
/// `/resolve` and the adapter's dispatched GET against the bound source.
#[tokio::test]
async fn read_end_to_end_through_http_adapter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resolve/sales/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "moniker": "moniker://sales/orders",
            "path": "sales/orders",
            "source_type": "http",
            "connection": {"base_url": server.uri()},
            "query": "/v1/orders",
            "binding_path": "sales/orders",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_against(&server).await;
    let data = client.read("sales/orders", ReadOptions::default()).await.unwrap();
    assert_eq!(data, json!([{"id": 1}, {"id": 2}]));
}

/// `fetch` retries a transient 503 exactly once before succeeding, per `retry_max_attempts=3`.
#[tokio::test]
async fn fetch_retries_503_then_succeeds_after_exactly_two_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fetch/orders"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fetch/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "moniker": "moniker://orders",
            "path": "orders",
            "source_type": "http",
            "row_count": 1,
            "columns": ["success"],
            "data": [{"success": true}],
        })))
        .mount(&server)
        .await;

    let client = client_against(&server).await;
    let result = client.fetch("orders", None, &HashMap::new()).await.unwrap();
    assert_eq!(result.data, vec![json!({"success": true})]);

    let requests = server.received_requests().await.unwrap();
    let fetch_requests = requests.iter().filter(|r| r.url.path() == "/fetch/orders").count();
    assert_eq!(fetch_requests, 2);
}
