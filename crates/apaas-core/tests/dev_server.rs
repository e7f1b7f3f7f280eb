//! Integration tests for the development session server.
//!
//! The router is served on a real loopback port and exercised with reqwest.

use apaas_core::dev::{
    bind_first_free, router, server, ChangeNotification, ClientRegistry, PortRange,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

struct TestServer {
    base: String,
    registry: Arc<ClientRegistry>,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.registry.close_all();
        self.handle.abort();
    }
}

async fn start_server(dir: &Path, output_name: &str) -> TestServer {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let start = probe.local_addr().unwrap().port();
    drop(probe);

    let listener = bind_first_free(PortRange { start, span: 20 }).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let registry = ClientRegistry::new();
    let app = router(dir, output_name, Arc::clone(&registry)).unwrap();
    let handle = tokio::spawn(server::serve(listener, app));

    TestServer {
        base: format!("http://127.0.0.1:{}", port),
        registry,
        handle,
    }
}

fn output_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("static")).unwrap();
    fs::write(dir.path().join("index.js"), "console.log('v1')").unwrap();
    fs::write(dir.path().join("static/logo.svg"), "<svg/>").unwrap();
    dir
}

async fn get_text(url: &str) -> (u16, String) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}

#[tokio::test]
async fn test_same_content_under_every_prefix() {
    let dir = output_dir();
    let server = start_server(dir.path(), "hello").await;

    for prefix in ["", "/app/hello", "/m/hello"] {
        let (status, body) = get_text(&format!("{}{}/static/logo.svg", server.base, prefix)).await;
        assert_eq!(status, 200, "prefix {:?}", prefix);
        assert_eq!(body, "<svg/>");

        let (status, body) = get_text(&format!("{}{}/index.js", server.base, prefix)).await;
        assert_eq!(status, 200);
        assert_eq!(body, "console.log('v1')");
    }
}

#[tokio::test]
async fn test_content_is_read_at_request_time() {
    let dir = output_dir();
    let server = start_server(dir.path(), "hello").await;

    fs::write(dir.path().join("index.js"), "console.log('v2')").unwrap();
    let (_, body) = get_text(&format!("{}/m/hello/index.js", server.base)).await;
    assert_eq!(body, "console.log('v2')");
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let dir = output_dir();
    let server = start_server(dir.path(), "hello").await;

    let (status, _) = get_text(&format!("{}/app/hello/nope.js", server.base)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let dir = output_dir();
    let server = start_server(dir.path(), "hello").await;

    let response = reqwest::Client::new()
        .get(format!("{}/index.js", server.base))
        .header("Origin", "http://localhost:8080")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn test_sse_client_receives_change_and_is_removed_on_disconnect() {
    let dir = output_dir();
    let server = start_server(dir.path(), "hello").await;

    let mut response = reqwest::get(format!("{}/sse", server.base)).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));
    assert_eq!(server.registry.len(), 1);

    let message = ChangeNotification::change("index.js").to_json();
    assert_eq!(server.registry.broadcast(&message), 1);

    let received = timeout(Duration::from_secs(5), async {
        let mut buffer = String::new();
        while let Some(chunk) = response.chunk().await.unwrap() {
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            if buffer.contains("\n\n") {
                break;
            }
        }
        buffer
    })
    .await
    .expect("no event received");
    assert!(received.contains(r#"data: {"event":"change","filePath":"index.js"}"#));

    drop(response);

    // Writes to the dead connection make the server drop the stream
    let removed = timeout(Duration::from_secs(5), async {
        while !server.registry.is_empty() {
            server.registry.broadcast(&message);
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(removed.is_ok(), "client was not unregistered");
}
