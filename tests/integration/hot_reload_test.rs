use super::common;

use common::test_server::{write_templates, TestServer};
use gproxy::adapters::mock_resolver::MockResolver;
use gproxy::adapters::script_engine::ScriptEngine;
use gproxy::adapters::static_routes::StaticRoutes;
use gproxy::adapters::template_loader::TemplateLoader;
use gproxy::adapters::template_store::TemplateStore;
use gproxy::domain::{Handler, RequestDescriptor, TemplateSet, TemplateUnit};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Polls `check` until it holds or five seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

/// Generation `a` mocks `root/leaf`; generation `b` disables mocking on
/// `root` and would answer `b` if its flag were ignored.
fn generation(tag: &str, use_mock: bool) -> TemplateSet {
    let root = TemplateUnit::new("root").with_use_mock(use_mock);
    let leaf = TemplateUnit::new("root/leaf").with_handler("get", Handler::Static(json!({ "gen": tag })));
    [root, leaf]
        .into_iter()
        .map(|u| (u.resource_path.clone(), Arc::new(u)))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolves_during_reload_see_whole_snapshots() {
    let store = Arc::new(TemplateStore::with_templates(generation("a", true)));
    let resolver = Arc::new(MockResolver::new(
        store.clone(),
        Arc::new(StaticRoutes::new()),
        Arc::new(ScriptEngine::default()),
    ));

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let store = store.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            let mut flip = false;
            while !done.load(Ordering::SeqCst) {
                store.replace(if flip { generation("a", true) } else { generation("b", false) });
                flip = !flip;
            }
        })
    };

    let tasks = (0..100).map(|_| {
        let resolver = resolver.clone();
        tokio::spawn(async move {
            let request = RequestDescriptor::new("GET", "/root/leaf");
            resolver.resolve(&request, true)
        })
    });

    for outcome in futures::future::join_all(tasks).await {
        let outcome = outcome.unwrap().unwrap();
        match outcome {
            None => {}
            Some(response) => assert_eq!(response.body, json!({ "gen": "a" })),
        }
    }

    done.store(true, Ordering::SeqCst);
    writer.join().unwrap();
    assert!(store.reload_count() > 0);
}

#[test]
fn test_reload_is_idempotent() {
    let dir = tempfile::TempDir::new().unwrap();
    write_templates(
        dir.path(),
        &[
            ("users.json", r#"{ "get": {}, "get/:id": {} }"#),
            ("users/orders.rhai", "let use_mock = false; fn post(params, query, body) { #{} }"),
        ],
    );
    let loader = TemplateLoader::new(dir.path(), Arc::new(ScriptEngine::default()));

    let shape = |set: &TemplateSet| {
        let mut entries: Vec<(String, Option<bool>, Vec<String>)> = set
            .values()
            .map(|u| (u.resource_path.clone(), u.use_mock, u.verbs()))
            .collect();
        entries.sort();
        entries
    };

    let first = loader.load().unwrap();
    let second = loader.load().unwrap();
    assert_eq!(shape(&first), shape(&second));
    assert_eq!(first.len(), 2);
}

#[test]
fn test_failing_template_drops_out_on_reload() {
    let dir = tempfile::TempDir::new().unwrap();
    write_templates(
        dir.path(),
        &[("users.json", r#"{ "get": {} }"#), ("orders.json", r#"{ "get": {} }"#)],
    );
    let loader = TemplateLoader::new(dir.path(), Arc::new(ScriptEngine::default()));
    let store = TemplateStore::new();
    assert_eq!(loader.reload_into(&store).unwrap(), 2);

    std::fs::write(dir.path().join("orders.json"), "{ not json").unwrap();
    assert_eq!(loader.reload_into(&store).unwrap(), 1);
    assert!(store.get("users").is_some());
    assert!(store.get("orders").is_none());
}

#[tokio::test]
async fn test_watcher_picks_up_templates_and_env() {
    let server = TestServer::start(&[("users.json", r#"{ "get": { "v": 1 } }"#)], |_| {}).await;
    let gateway = &server.gateway;
    gateway.watcher.start().unwrap();

    // Give the OS watcher a moment to register
    tokio::time::sleep(Duration::from_millis(200)).await;

    write_templates(&server.templates_dir(), &[("orders.json", r#"{ "get": { "v": 2 } }"#)]);
    let store = gateway.store.clone();
    assert!(eventually(|| store.get("orders").is_some()).await);

    let body: Value = reqwest::get(server.url("/orders")).await.unwrap().json().await.unwrap();
    assert_eq!(body, json!({ "v": 2 }));

    std::fs::write(
        server.dir.path().join(".env"),
        "TARGET_SERVICE_URL=http://127.0.0.1:9\nMOCK_DELAY=25\nMOCK_ENABLED=false\n",
    )
    .unwrap();
    let runtime = gateway.runtime.clone();
    assert!(
        eventually(|| {
            runtime
                .try_read()
                .map(|r| r.mock_delay_ms == 25 && !r.mock_enabled)
                .unwrap_or(false)
        })
        .await
    );

    gateway.watcher.stop();
    assert!(!gateway.watcher.is_running());

    let reloads = gateway.store.reload_count();
    write_templates(&server.templates_dir(), &[("late.json", r#"{ "get": {} }"#)]);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(gateway.store.reload_count(), reloads);
    assert!(gateway.store.get("late").is_none());
}
