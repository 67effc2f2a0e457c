use super::common;

use common::test_server::{closed_port, TestServer, Upstream, TRICKLE_CHUNKS, TRICKLE_GAP};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const USERS_JSON: &str = r#"{
    "get": { "statusCode": 201, "name": "ada" },
    "get/:id": { "id|+1": 1, "role": "admin" }
}"#;

const ORDERS_RHAI: &str = r#"
fn post(params, query, body) {
    #{ statusCode: 202, received: body.item, page: query.page }
}
"#;

#[tokio::test]
async fn test_mock_hit_through_proxy_prefix() {
    let upstream = Upstream::start().await;
    let server = TestServer::start(&[("users.json", USERS_JSON)], |s| {
        s.upstream.target_url = Some(upstream.base_url.clone());
    })
    .await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/proxy/users"))
        .header("Origin", "http://app.local")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert_eq!(response.headers()["access-control-allow-origin"], "http://app.local");
    assert_eq!(response.headers()["access-control-allow-credentials"], "true");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "name": "ada" }));
    assert!(upstream.hits().is_empty());
}

#[tokio::test]
async fn test_parent_template_answers_by_id() {
    let server = TestServer::start(&[("users.json", USERS_JSON)], |_| {}).await;

    let body: Value = reqwest::get(server.url("/users/42")).await.unwrap().json().await.unwrap();
    assert_eq!(body, json!({ "id": 1, "role": "admin" }));
}

#[tokio::test]
async fn test_script_receives_query_and_form_body() {
    let server = TestServer::start(&[("shop/orders.rhai", ORDERS_RHAI)], |_| {}).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/shop/orders?page=3"))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body("item=book")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 202);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "received": "book", "page": "3" }));
}

#[tokio::test]
async fn test_use_mock_false_forwards_upstream() {
    let upstream = Upstream::start().await;
    let templates = [
        ("users.json", r#"{ "useMock": false, "get": { "mocked": true } }"#),
    ];
    let server = TestServer::start(&templates, |s| {
        s.upstream.target_url = Some(upstream.base_url.clone());
    })
    .await;

    let response = reqwest::get(server.url("/users/list?page=2")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-upstream"], "yes");

    let hits = upstream.hits();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path_and_query, "/users/list?page=2");
}

#[tokio::test]
async fn test_proxy_404_falls_back_once_to_direct_path() {
    let upstream = Upstream::start().await;
    let server = TestServer::start(&[], |s| {
        s.upstream.target_url = Some(upstream.base_url.clone());
    })
    .await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/proxy/accounts?x=1"))
        .json(&json!({ "name": "ada" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["path"], "/accounts?x=1");

    let hits = upstream.hits();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].path_and_query, "/proxy/accounts?x=1");
    assert_eq!(hits[1].path_and_query, "/accounts?x=1");
    for hit in &hits {
        assert_eq!(hit.method, "POST");
        assert_eq!(hit.body.as_ref(), br#"{"name":"ada"}"#);
    }
}

#[tokio::test]
async fn test_second_404_is_relayed_without_third_attempt() {
    let upstream = Upstream::start().await;
    let server = TestServer::start(&[], |s| {
        s.upstream.target_url = Some(upstream.base_url.clone());
    })
    .await;

    let response = reqwest::get(server.url("/proxy/gone")).await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(upstream.hits().len(), 2);
}

#[tokio::test]
async fn test_direct_404_is_not_retried() {
    let upstream = Upstream::start().await;
    let server = TestServer::start(&[], |s| {
        s.upstream.target_url = Some(upstream.base_url.clone());
    })
    .await;

    let response = reqwest::get(server.url("/gone")).await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(upstream.hits().len(), 1);
}

#[tokio::test]
async fn test_host_header_is_not_forwarded() {
    let upstream = Upstream::start().await;
    let server = TestServer::start(&[], |s| {
        s.upstream.target_url = Some(upstream.base_url.clone());
    })
    .await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/profile"))
        .header("Host", "gateway.example")
        .header("Origin", "http://app.local")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "http://app.local");

    let hits = upstream.hits();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].headers["host"], upstream.addr.to_string().as_str());
}

#[tokio::test]
async fn test_connection_refused_is_structured_500() {
    let port = closed_port().await;
    let server = TestServer::start(&[], |s| {
        s.upstream.target_url = Some(format!("http://127.0.0.1:{}", port));
    })
    .await;

    let response = reqwest::get(server.url("/proxy/anything")).await.unwrap();
    assert_eq!(response.status(), 500);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Upstream request failed");
    assert!(body["error"].as_str().unwrap().contains(&port.to_string()));
}

#[tokio::test]
async fn test_upstream_timeout_is_structured_500() {
    let upstream = Upstream::start().await;
    let server = TestServer::start(&[], |s| {
        s.upstream.target_url = Some(upstream.base_url.clone());
        s.upstream.timeout_ms = 300;
    })
    .await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/stall/report"))
        .header("Origin", "http://app.local")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(response.headers()["access-control-allow-origin"], "http://app.local");

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Upstream request timed out");
    assert!(body["error"].as_str().unwrap().contains("/stall/report"));
    assert_eq!(upstream.hits().len(), 1);
}

#[tokio::test]
async fn test_slow_streamed_body_is_relayed_whole() {
    let upstream = Upstream::start().await;
    let server = TestServer::start(&[], |s| {
        s.upstream.target_url = Some(upstream.base_url.clone());
        // Shorter than the whole stream, longer than the time to first byte
        s.upstream.timeout_ms = 500;
    })
    .await;

    let started = Instant::now();
    let response = reqwest::get(server.url("/trickle/export")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = response.text().await.unwrap();
    assert_eq!(body, "chunk0;chunk1;chunk2;chunk3;");
    assert!(started.elapsed() >= TRICKLE_GAP * TRICKLE_CHUNKS as u32);
}

#[tokio::test]
async fn test_mock_delay_is_applied() {
    let server = TestServer::start(&[("users.json", USERS_JSON)], |s| {
        s.mock.delay_ms = 150;
    })
    .await;

    let started = Instant::now();
    let response = reqwest::get(server.url("/users")).await.unwrap();
    assert_eq!(response.status(), 201);
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn test_preflight_is_answered_without_upstream() {
    let upstream = Upstream::start().await;
    let server = TestServer::start(&[], |s| {
        s.upstream.target_url = Some(upstream.base_url.clone());
    })
    .await;
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, server.url("/proxy/users"))
        .header("Origin", "http://app.local")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "http://app.local");
    assert!(response.headers().contains_key("access-control-allow-methods"));
    assert!(upstream.hits().is_empty());
}

#[tokio::test]
async fn test_script_error_is_structured_500() {
    let templates = [("broken.rhai", "fn get() { throw \"boom\"; }")];
    let server = TestServer::start(&templates, |_| {}).await;

    let response = reqwest::get(server.url("/broken")).await.unwrap();
    assert_eq!(response.status(), 500);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Mock template failed");
}
