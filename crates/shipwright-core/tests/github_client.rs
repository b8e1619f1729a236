//! GitHubClient against a local server replaying canned responses.

use std::path::Path;

use serde_json::json;
use shipwright_core::{GitHubClient, ReleaseConfig, ReleaseError, ReleaseHost, Secret};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

struct Canned {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    /// Content-Length to announce when it should differ from the body.
    declared_length: Option<usize>,
}

impl Canned {
    fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
            declared_length: None,
        }
    }

    /// Announce more body bytes than are sent before the connection closes.
    fn truncated(mut self) -> Self {
        self.declared_length = Some(self.body.len() + 100);
        self
    }

    fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug)]
struct Recorded {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Serve each canned response on its own connection, in order.
async fn serve(responses: Vec<Canned>) -> (String, JoinHandle<Vec<Recorded>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut recorded = Vec::new();
        for canned in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            recorded.push(read_request(&mut socket).await);

            let mut head = format!(
                "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                canned.status,
                canned.declared_length.unwrap_or(canned.body.len())
            );
            for (name, value) in &canned.headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            head.push_str("\r\n");

            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(canned.body.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
        recorded
    });

    (base, handle)
}

async fn read_request(socket: &mut TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Recorded {
        request_line,
        headers,
        body,
    }
}

fn client(base: &str) -> GitHubClient {
    let config = ReleaseConfig::new("kerwood", "confluence-updater")
        .with_product("confluence-updater")
        .with_api_urls(base, base);
    GitHubClient::authenticate(&config, Secret::new("  ghp_test_token\n")).unwrap()
}

fn tag_json(range: std::ops::Range<usize>) -> serde_json::Value {
    json!(range
        .map(|i| json!({ "name": format!("v1.{i}.0") }))
        .collect::<Vec<_>>())
}

#[tokio::test]
async fn list_tags_follows_link_header() {
    let (base, server) = serve(vec![
        Canned::json(200, tag_json(0..100)).header(
            "Link",
            "<http://127.0.0.1/repos/kerwood/confluence-updater/tags?per_page=100&page=2>; rel=\"next\"",
        ),
        Canned::json(200, tag_json(100..150)),
    ])
    .await;

    let tags = client(&base).list_tags().await.expect("listing failed");
    let requests = server.await.unwrap();

    assert_eq!(tags.len(), 150);
    assert!(tags.contains("v1.0.0"));
    assert!(tags.contains("v1.149.0"));

    assert_eq!(requests.len(), 2);
    assert!(requests[0].request_line.starts_with("GET /repos/kerwood/confluence-updater/tags?"));
    assert!(requests[0].request_line.contains("per_page=100"));
    assert!(requests[0].request_line.contains("&page=1 "));
    assert!(requests[1].request_line.contains("&page=2 "));
    assert_eq!(requests[0].header("authorization"), Some("Bearer ghp_test_token"));
    assert_eq!(requests[0].header("accept"), Some("application/vnd.github+json"));
}

#[tokio::test]
async fn list_tags_fails_when_a_page_fails() {
    let (base, server) = serve(vec![
        Canned::json(200, tag_json(0..100)).header(
            "Link",
            "<http://127.0.0.1/tags?per_page=100&page=2>; rel=\"next\"",
        ),
        Canned::json(503, json!({ "message": "Service Unavailable" })),
    ])
    .await;

    let err = client(&base).list_tags().await.unwrap_err();
    server.await.unwrap();

    match err {
        ReleaseError::Host { status, detail } => {
            assert_eq!(status, 503);
            assert!(detail.contains("Service Unavailable"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn list_tags_transport_failure_is_network_error_with_cause() {
    // Bind then drop a listener so the port is known to refuse connections.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = client(&base).list_tags().await.unwrap_err();

    match err {
        ReleaseError::Network(detail) => {
            assert!(detail.starts_with("error sending request"), "{detail}");
            // The cause chain is appended after the top-level message.
            assert!(detail.contains(": "), "{detail}");
            assert!(detail.to_lowercase().contains("connect"), "{detail}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn rejection_with_unreadable_body_keeps_read_error() {
    let (base, server) = serve(vec![Canned::json(
        500,
        json!({ "message": "Server Error" }),
    )
    .truncated()])
    .await;

    let err = client(&base).create_release("v2.0.1").await.unwrap_err();
    server.await.unwrap();

    match err {
        ReleaseError::Host { status, detail } => {
            assert_eq!(status, 500);
            assert!(detail.starts_with("<unreadable response body: "), "{detail}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn create_release_sends_release_fields() {
    let (base, server) = serve(vec![Canned::json(
        201,
        json!({
            "id": 4242,
            "tag_name": "v2.0.1",
            "name": "confluence-updater-v2.0.1",
            "html_url": "https://github.com/kerwood/confluence-updater/releases/tag/v2.0.1"
        }),
    )])
    .await;

    let release = client(&base).create_release("v2.0.1").await.unwrap();
    let requests = server.await.unwrap();

    assert_eq!(release.id, 4242);
    assert_eq!(release.tag_name, "v2.0.1");

    assert!(requests[0]
        .request_line
        .starts_with("POST /repos/kerwood/confluence-updater/releases "));
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["tag_name"], "v2.0.1");
    assert_eq!(body["target_commitish"], "main");
    assert_eq!(body["name"], "confluence-updater-v2.0.1");
    assert_eq!(body["draft"], false);
    assert_eq!(body["prerelease"], false);
    assert_eq!(body["make_latest"], "true");
    assert_eq!(body["generate_release_notes"], true);
}

#[tokio::test]
async fn create_release_maps_existing_tag_to_conflict() {
    let (base, server) = serve(vec![Canned::json(
        422,
        json!({
            "message": "Validation Failed",
            "errors": [{ "resource": "Release", "code": "already_exists", "field": "tag_name" }]
        }),
    )])
    .await;

    let err = client(&base).create_release("v2.0.1").await.unwrap_err();
    server.await.unwrap();

    match err {
        ReleaseError::ReleaseConflict { tag, .. } => assert_eq!(tag, "v2.0.1"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn create_release_other_rejection_is_host_error() {
    let (base, server) = serve(vec![Canned::json(
        403,
        json!({ "message": "Resource not accessible by integration" }),
    )])
    .await;

    let err = client(&base).create_release("v2.0.1").await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, ReleaseError::Host { status: 403, .. }));
}

#[tokio::test]
async fn upload_asset_posts_file_bytes_under_base_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("confluence-updater-x86_64-unknown-linux-musl");
    std::fs::write(&path, b"\x7fELF fake binary").unwrap();

    let (base, server) = serve(vec![Canned::json(
        201,
        json!({
            "id": 7,
            "name": "confluence-updater-x86_64-unknown-linux-musl",
            "size": 17,
            "browser_download_url": "https://github.com/download"
        }),
    )])
    .await;

    let asset = client(&base).upload_asset(4242, &path).await.unwrap();
    let requests = server.await.unwrap();

    assert_eq!(asset.id, 7);
    assert_eq!(asset.sha256.len(), 64);
    assert!(requests[0].request_line.starts_with(
        "POST /repos/kerwood/confluence-updater/releases/4242/assets?name=confluence-updater-x86_64-unknown-linux-musl "
    ));
    assert_eq!(
        requests[0].header("content-type"),
        Some("application/octet-stream")
    );
    assert_eq!(requests[0].body, b"\x7fELF fake binary");
}

#[tokio::test]
async fn upload_asset_missing_file_is_io_error() {
    // Nothing listens here; the file read fails before any request.
    let err = client("http://127.0.0.1:9")
        .upload_asset(1, Path::new("/nonexistent/shipwright-asset"))
        .await
        .unwrap_err();

    assert!(matches!(err, ReleaseError::Io { .. }));
}

#[tokio::test]
async fn upload_asset_rejection_is_host_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("asset");
    std::fs::write(&path, b"bytes").unwrap();

    let (base, server) = serve(vec![Canned::json(
        422,
        json!({ "message": "Validation Failed" }),
    )])
    .await;

    let err = client(&base).upload_asset(1, &path).await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, ReleaseError::Host { status: 422, .. }));
}
