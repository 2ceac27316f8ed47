//! Built-in endpoints served by `HttpHost`.

use super::start_host;
use axum::{Router, routing::get};
use hothost::config::MemoryConfig;
use hothost::server::{HttpHost, UpdateSink};
use hothost::test_utils::{RecordingSink, TestApp};
use hothost::update::TempExecutable;
use reqwest::StatusCode;
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

async fn wait_for_delivery(sink: &RecordingSink) -> bool {
    for _ in 0..50 {
        if !sink.delivered().is_empty() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_version_document() {
    let app = TestApp::new("MyApp", "1.0.0").unwrap();
    let host = start_host(app.config(), RecordingSink::new()).await;

    let response = reqwest::get(host.url("/version")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"].to_str().unwrap().starts_with("text/plain")
    );

    let body = response.text().await.unwrap();
    assert!(body.starts_with("MyApp\t1.0.0\r\n"), "unexpected body: {body:?}");
    assert!(body.contains(&format!("hothost\t{}", env!("CARGO_PKG_VERSION"))));
}

#[tokio::test]
async fn test_infos_allow_list() {
    let app = TestApp::new("MyApp", "1.0.0").unwrap();
    let config = app.config();
    let host = start_host(config.clone(), RecordingSink::new()).await;
    let client = reqwest::Client::new();

    let allowed = client.get(host.url("/infos")).send().await.unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
    assert!(allowed.text().await.unwrap().contains("Application:        MyApp"));

    let denied = client
        .get(host.url("/infos"))
        .header("X-Forwarded-For", "203.0.113.9, 127.0.0.1")
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    config.set("Update:AcceptFrom", "");
    let unconfigured = client.get(host.url("/infos")).send().await.unwrap();
    assert_eq!(unconfigured.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(unconfigured.text().await.unwrap(), "configuration failure");
}

#[tokio::test]
async fn test_upload_is_staged_and_handed_over() {
    let app = TestApp::new("MyApp", "1.0.0").unwrap();
    let sink = RecordingSink::new();
    let host = start_host(app.config(), sink.clone()).await;

    let response = reqwest::Client::new()
        .put(host.url("/autoupdate"))
        .header("UpdateSecret", "test-secret")
        .body(b"MyApp 1.1.0 build".to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "update received");

    assert!(wait_for_delivery(&sink).await, "upload was never handed to the sink");
    let staged = sink.delivered().remove(0);
    assert_eq!(staged.bytes_written, 17);
    assert_eq!(staged.path.parent(), Some(app.path()));
    assert_eq!(std::fs::read(&staged.path).unwrap(), b"MyApp 1.1.0 build");
    assert!(staged.sha256.starts_with("sha256:"));
}

#[tokio::test]
async fn test_upload_with_wrong_secret_is_rejected() {
    let app = TestApp::new("MyApp", "1.0.0").unwrap();
    let sink = RecordingSink::new();
    let host = start_host(app.config(), sink.clone()).await;
    let files_before = app.file_count();

    let response = reqwest::Client::new()
        .put(host.url("/autoupdate"))
        .header("UpdateSecret", "guess")
        .body(b"evil".to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(sink.delivered().is_empty());
    assert_eq!(app.file_count(), files_before);
}

#[tokio::test]
async fn test_empty_upload_fails() {
    let app = TestApp::new("MyApp", "1.0.0").unwrap();
    let sink = RecordingSink::new();
    let host = start_host(app.config(), sink.clone()).await;

    let response = reqwest::Client::new()
        .put(host.url("/autoupdate"))
        .header("UpdateSecret", "test-secret")
        .body(Vec::<u8>::new())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(sink.delivered().is_empty());
}

#[tokio::test]
async fn test_upload_from_outside_allow_list() {
    let app = TestApp::new("MyApp", "1.0.0").unwrap();
    let config = app.config();
    config.set("Update:AcceptFrom", "10.0.0.0/8");
    let host = start_host(config, RecordingSink::new()).await;

    let response = reqwest::Client::new()
        .put(host.url("/autoupdate"))
        .header("UpdateSecret", "test-secret")
        .body(b"payload".to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ignore_prefix_serves_both_paths() {
    let app = TestApp::new("MyApp", "1.0.0").unwrap();
    let config = app.config();
    config.set("Http:IgnorePrefix", "/billing/");
    let host = start_host(config, RecordingSink::new()).await;

    for path in ["/version", "/billing/version"] {
        let response = reqwest::get(host.url(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "GET {path}");
    }
    let response = reqwest::get(host.url("/other/version")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ignore_prefix_follows_configuration() {
    let app = TestApp::new("MyApp", "1.0.0").unwrap();
    let config = app.config();
    config.set("Http:IgnorePrefix", "/billing");
    let host = start_host(config.clone(), RecordingSink::new()).await;

    let response = reqwest::get(host.url("/billing/version")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    config.set("Http:IgnorePrefix", "/invoices");
    let response = reqwest::get(host.url("/invoices/version")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = reqwest::get(host.url("/billing/version")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_listen_change_moves_the_listener() {
    let app = TestApp::new("MyApp", "1.0.0").unwrap();
    let config = app.config();
    let host = start_host(config.clone(), RecordingSink::new()).await;

    let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let moved_to = free.local_addr().unwrap();
    drop(free);
    config.set("Http:Listen", moved_to.to_string());

    let mut answered = false;
    for _ in 0..50 {
        if let Ok(response) = reqwest::get(format!("http://{moved_to}/version")).await
            && response.status() == StatusCode::OK
        {
            answered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(answered, "no answer on {moved_to} after Http:Listen changed");
    assert!(reqwest::get(host.url("/version")).await.is_err());
}

/// Records which thread each delivery ran on.
#[derive(Default)]
struct ThreadRecordingSink {
    threads: Mutex<Vec<ThreadId>>,
}

impl UpdateSink for ThreadRecordingSink {
    fn deliver(&self, _staged: TempExecutable) {
        self.threads.lock().unwrap().push(std::thread::current().id());
    }
}

#[tokio::test]
async fn test_delivery_runs_off_the_runtime_thread() {
    let app = TestApp::new("MyApp", "1.0.0").unwrap();
    let sink = Arc::new(ThreadRecordingSink::default());
    let host = start_host(app.config(), sink.clone()).await;

    let response = reqwest::Client::new()
        .put(host.url("/autoupdate"))
        .header("UpdateSecret", "test-secret")
        .body(b"MyApp 1.1.0 build".to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut threads = Vec::new();
    for _ in 0..50 {
        threads = sink.threads.lock().unwrap().clone();
        if !threads.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    // The test runtime is single-threaded, so any other thread is the blocking pool.
    assert_eq!(threads.len(), 1, "upload was never handed to the sink");
    assert_ne!(threads[0], std::thread::current().id());
}

#[tokio::test]
async fn test_application_routes_are_merged() {
    let app = TestApp::new("MyApp", "1.0.0").unwrap();
    let config: Arc<MemoryConfig> = app.config();
    config.set("Http:Listen", "127.0.0.1:0");

    let routes = Router::new().route("/hello", get(|| async { "hello from the app" }));
    let bound = HttpHost::new(config)
        .with_update_sink(RecordingSink::new())
        .with_routes(routes)
        .bind()
        .await
        .unwrap();
    let addr = bound.local_addrs()[0];
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(bound.run_until(async move {
        let _ = stopped.await;
    }));

    let hello = reqwest::get(format!("http://{addr}/hello")).await.unwrap();
    assert_eq!(hello.text().await.unwrap(), "hello from the app");
    let version = reqwest::get(format!("http://{addr}/version")).await.unwrap();
    assert_eq!(version.status(), StatusCode::OK);

    // Graceful shutdown completes once signalled.
    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap().unwrap();
}
