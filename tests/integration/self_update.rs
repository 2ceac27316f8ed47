//! Orchestrator pushing a build to a live host.

use super::start_host;
use hothost::config::{ConfigReader, MemoryConfig};
use hothost::core::HotError;
use hothost::server::UpdateSink;
use hothost::test_utils::TestApp;
use hothost::update::{Fetch, HttpTransport, TempExecutable, UpdateOrchestrator, UpdateTransport};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pretends the remote restarted on the uploaded build by bumping its version.
struct RestartingSink {
    remote: Arc<MemoryConfig>,
    new_version: String,
    received: Mutex<Vec<Vec<u8>>>,
}

impl UpdateSink for RestartingSink {
    fn deliver(&self, staged: TempExecutable) {
        let bytes = std::fs::read(&staged.path).unwrap_or_default();
        self.received.lock().unwrap().push(bytes);
        self.remote.set("Version", self.new_version.clone());
    }
}

fn local_config(app: &TestApp, remote_url: String, secret: &str) -> Arc<dyn ConfigReader> {
    let config = app.config();
    config.set("Update:URL", remote_url);
    config.set("Update:Secret", secret);
    config
}

#[tokio::test]
async fn test_push_newer_build_and_confirm() {
    let remote = TestApp::new("MyApp", "1.0.0").unwrap();
    let remote_config = remote.config();
    let sink = Arc::new(RestartingSink {
        remote: remote_config.clone(),
        new_version: "1.1.0".to_string(),
        received: Mutex::new(Vec::new()),
    });
    let host = start_host(remote_config.clone(), sink.clone()).await;

    let local = TestApp::new("MyApp", "1.1.0").unwrap();
    let config = local_config(&local, host.url(""), "test-secret");

    let report = UpdateOrchestrator::new(config, HttpTransport::new().unwrap())
        .with_polling(10, Duration::from_millis(100))
        .run_self_update()
        .await
        .unwrap();

    assert!(report.confirmed);
    assert!(report.polls >= 1 && report.polls <= 10);
    assert_eq!(report.remote_before.version, "1.0.0");
    assert_eq!(remote_config.get_or_empty("Version"), "1.1.0");

    let received = sink.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0], std::fs::read(&local.executable).unwrap());
}

#[tokio::test]
async fn test_push_with_wrong_secret_is_unauthorized() {
    let remote = TestApp::new("MyApp", "1.0.0").unwrap();
    let remote_config = remote.config();
    let sink = Arc::new(RestartingSink {
        remote: remote_config.clone(),
        new_version: "1.1.0".to_string(),
        received: Mutex::new(Vec::new()),
    });
    let host = start_host(remote_config.clone(), sink.clone()).await;

    let local = TestApp::new("MyApp", "1.1.0").unwrap();
    let config = local_config(&local, host.url("/"), "not-the-secret");

    let err = UpdateOrchestrator::new(config, HttpTransport::new().unwrap())
        .with_polling(2, Duration::from_millis(10))
        .run_self_update()
        .await
        .unwrap_err();

    assert!(matches!(err, HotError::Unauthorized { .. }));
    assert!(sink.received.lock().unwrap().is_empty());
    assert_eq!(remote_config.get_or_empty("Version"), "1.0.0");
}

#[tokio::test]
async fn test_same_version_is_not_pushed() {
    let remote = TestApp::new("MyApp", "2.0.0").unwrap();
    let sink = Arc::new(RestartingSink {
        remote: remote.config(),
        new_version: "2.0.0".to_string(),
        received: Mutex::new(Vec::new()),
    });
    let host = start_host(remote.config(), sink.clone()).await;

    let local = TestApp::new("MyApp", "2.0.0").unwrap();
    let config = local_config(&local, host.url(""), "test-secret");

    let err = UpdateOrchestrator::new(config, HttpTransport::new().unwrap())
        .run_self_update()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("versions are equal"));
    assert!(sink.received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_remote_is_network_error() {
    let local = TestApp::new("MyApp", "1.1.0").unwrap();
    // Port 9 (discard) on loopback is closed on test machines.
    let config = local_config(&local, "http://127.0.0.1:9".to_string(), "test-secret");

    let err = UpdateOrchestrator::new(config, HttpTransport::new().unwrap())
        .run_self_update()
        .await
        .unwrap_err();
    assert!(matches!(err, HotError::Network { .. }));
}

#[tokio::test]
async fn test_missing_executable_fails_before_upload() {
    let remote = TestApp::new("MyApp", "1.0.0").unwrap();
    let remote_config = remote.config();
    let sink = Arc::new(RestartingSink {
        remote: remote_config.clone(),
        new_version: "1.1.0".to_string(),
        received: Mutex::new(Vec::new()),
    });
    let host = start_host(remote_config.clone(), sink.clone()).await;

    let local = TestApp::new("MyApp", "1.1.0").unwrap();
    let config = local.config();
    config.set("Update:URL", host.url(""));
    config.set("ExecutableFullName", local.path().join("gone").display().to_string());

    let err = UpdateOrchestrator::new(config, HttpTransport::new().unwrap())
        .with_polling(3, Duration::from_millis(10))
        .run_self_update()
        .await
        .unwrap_err();

    assert!(matches!(err, HotError::Io { .. }), "unexpected error: {err:?}");
    assert!(sink.received.lock().unwrap().is_empty());
    assert_eq!(remote_config.get_or_empty("Version"), "1.0.0");
}

#[tokio::test]
async fn test_silent_remote_does_not_hang_version_requests() {
    // Accepts connections and never answers.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let transport = HttpTransport::new()
        .unwrap()
        .with_request_timeout(Duration::from_millis(300));
    let fetch = tokio::time::timeout(
        Duration::from_secs(10),
        transport.get(&format!("http://{addr}/version")),
    )
    .await
    .expect("GET /version was not bounded");

    assert!(matches!(fetch, Fetch::Unreachable(_)), "unexpected answer: {fetch:?}");
}
