use super::common;

use common::test_server::TestServer;

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start(&[("users.json", r#"{ "get": {} }"#)], |_| {}).await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["templates_loaded"], 1);
    assert!(body["uptime_seconds"].is_number());
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_health_ready_endpoint() {
    let empty = TestServer::start(&[], |_| {}).await;
    let response = reqwest::get(empty.url("/health/ready")).await.unwrap();
    assert_eq!(response.status(), 503);

    let with_target = TestServer::start(&[], |s| {
        s.upstream.target_url = Some("http://127.0.0.1:9".to_string());
    })
    .await;
    let response = reqwest::get(with_target.url("/health/ready")).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_health_live_endpoint() {
    let server = TestServer::start(&[], |_| {}).await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/health/live"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "alive");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let server = TestServer::start(&[("users.json", r#"{ "get": { "ok": true } }"#)], |_| {}).await;
    let client = reqwest::Client::new();

    let mocked = client.get(server.url("/users")).send().await.unwrap();
    assert_eq!(mocked.status(), 200);

    let response = client
        .get(server.url("/metrics"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);

    let text = response.text().await.unwrap();
    assert!(text.contains("gproxy_requests_total"));
    assert!(text.contains("gproxy_mock_hits_total"));
    assert!(text.contains("gproxy_templates_loaded 1"));
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let server = TestServer::start(&[], |_| {}).await;

    let response = reqwest::get(server.url("/health/live")).await.unwrap();
    let id = response.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(id.len(), 8);
}
