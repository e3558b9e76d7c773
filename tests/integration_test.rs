use std::fs;
use std::sync::Arc;
use std::time::Duration;

use assert_cmd::Command;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::routing::get as route_get;
use axum::Router;
use logview::server::{serve_until, with_middleware};
use logview::{create_router, AppState, Config, SourceEncoding};
use predicates::prelude::*;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Notify};
use tower::ServiceExt;

fn setup_log_directory() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let base_path = temp_dir.path();

    fs::create_dir(base_path.join("archive")).unwrap();
    fs::write(base_path.join("app.log"), "line one\nline two\n").unwrap();
    fs::write(base_path.join("archive/old.log"), "archived\n").unwrap();

    temp_dir
}

fn router(temp_dir: &TempDir, limit: u64, encoding: SourceEncoding) -> Router {
    let config = Config::new()
        .with_log_directory(temp_dir.path())
        .with_preview_size_limit(limit)
        .with_encoding(encoding);
    create_router(AppState::new(config))
}

async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

#[tokio::test]
async fn test_health_reports_configuration() {
    let temp_dir = setup_log_directory();
    let app = router(&temp_dir, 4096, SourceEncoding::Koi8R);

    let (status, _, body) = get(app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["previewSize"], 4096);
    assert_eq!(json["encoding"], "koi8-r");
    assert_eq!(json["serverPort"], "7424");
}

#[tokio::test]
async fn test_config_endpoint() {
    let temp_dir = setup_log_directory();
    let app = router(&temp_dir, 4096, SourceEncoding::Utf8);

    let (status, _, body) = get(app.clone(), "/api/config").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["version"], logview::VERSION);
    assert!(json["startTime"].as_str().unwrap().contains('T'));

    // Process start, not the time of the request.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let (_, _, later) = get(app, "/api/config").await;
    let later: serde_json::Value = serde_json::from_slice(&later).unwrap();
    assert_eq!(later["startTime"], json["startTime"]);
}

#[tokio::test]
async fn test_file_list() {
    let temp_dir = setup_log_directory();
    let app = router(&temp_dir, 4096, SourceEncoding::Utf8);

    let (status, _, body) = get(app, "/api/files").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let paths: Vec<&str> = json["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["fullPath"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["app.log", "archive/old.log"]);
    assert!(json.get("error").is_none());
}

#[tokio::test]
async fn test_file_list_missing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::new().with_log_directory(temp_dir.path().join("gone"));
    let app = create_router(AppState::new(config));

    let (status, _, body) = get(app, "/api/files").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("does not exist"));
}

#[tokio::test]
async fn test_preview_small_file() {
    let temp_dir = setup_log_directory();
    let app = router(&temp_dir, 4096, SourceEncoding::Utf8);

    let (status, headers, body) = get(app, "/api/file?path=app.log").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    assert_eq!(body, b"line one\nline two\n");
}

#[tokio::test]
async fn test_preview_large_file_shows_tail() {
    let temp_dir = setup_log_directory();
    let content: Vec<u8> = (0..2000u32).flat_map(|i| format!("{i:04}\n").into_bytes()).collect();
    fs::write(temp_dir.path().join("big.log"), &content).unwrap();
    let app = router(&temp_dir, 100, SourceEncoding::Utf8);

    let (status, _, body) = get(app, "/api/file?path=big.log").await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    assert!(text.starts_with("⚠️ File too large"));
    assert!(text.contains("Showing the last 100 bytes"));
    assert!(text.ends_with("1999\n"));
    assert!(text.as_bytes().ends_with(&content[content.len() - 100..]));
}

#[tokio::test]
async fn test_preview_converts_windows_1251() {
    let temp_dir = setup_log_directory();
    let (encoded, _, _) = encoding_rs::WINDOWS_1251.encode("Запуск сервиса\n");
    fs::write(temp_dir.path().join("ru.log"), &*encoded).unwrap();
    let app = router(&temp_dir, 4096, SourceEncoding::Windows1251);

    let (status, _, body) = get(app, "/api/file?path=ru.log").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "Запуск сервиса\n");
}

#[tokio::test]
async fn test_preview_request_errors() {
    let temp_dir = setup_log_directory();

    let cases = [
        ("/api/file", StatusCode::BAD_REQUEST),
        ("/api/file?path=", StatusCode::BAD_REQUEST),
        ("/api/file?path=%20%20", StatusCode::BAD_REQUEST),
        ("/api/download?path=%20", StatusCode::BAD_REQUEST),
        ("/api/file?path=..%2Foutside.log", StatusCode::FORBIDDEN),
        ("/api/file?path=%2Fetc%2Fpasswd", StatusCode::FORBIDDEN),
        ("/api/file?path=missing.log", StatusCode::NOT_FOUND),
        ("/api/file?path=archive", StatusCode::NOT_FOUND),
    ];

    for (uri, expected) in cases {
        let app = router(&temp_dir, 4096, SourceEncoding::Utf8);
        let (status, _, _) = get(app, uri).await;
        assert_eq!(status, expected, "{uri}");
    }
}

#[tokio::test]
async fn test_download_returns_whole_file() {
    let temp_dir = setup_log_directory();
    let content = "x".repeat(10_000);
    fs::write(temp_dir.path().join("archive/full.log"), &content).unwrap();
    let app = router(&temp_dir, 100, SourceEncoding::Utf8);

    let (status, headers, body) = get(app, "/api/download?path=archive%2Ffull.log").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"full.log\""
    );
    assert_eq!(headers[header::CONTENT_LENGTH], "10000");
    assert_eq!(body, content.as_bytes());
}

#[tokio::test]
async fn test_download_rejects_traversal() {
    let temp_dir = setup_log_directory();
    let app = router(&temp_dir, 100, SourceEncoding::Utf8);

    let (status, _, _) = get(app, "/api/download?path=archive%2F..%2F..%2Fetc%2Fpasswd").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_index_page() {
    let temp_dir = setup_log_directory();

    for uri in ["/", "/index.html"] {
        let app = router(&temp_dir, 2 * 1024 * 1024, SourceEncoding::Cp866);
        let (status, headers, body) = get(app, uri).await;
        let page = String::from_utf8(body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
        assert!(page.contains("2097152 bytes (2.00 MB)"));
        assert!(page.contains("cp866"));
    }
}

#[tokio::test]
async fn test_gzip_when_accepted() {
    let temp_dir = setup_log_directory();
    fs::write(temp_dir.path().join("wide.log"), "repeated line\n".repeat(500)).unwrap();
    let app = router(&temp_dir, 1024 * 1024, SourceEncoding::Utf8);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/file?path=wide.log")
                .header(header::ACCEPT_ENCODING, "gzip")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
}

#[tokio::test]
async fn test_stalled_request_times_out() {
    let config = Config::new().with_request_timeout(Duration::from_millis(50));
    let stalled = Router::new().route(
        "/stall",
        route_get(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            "late"
        }),
    );
    let app = with_middleware(stalled, &config);

    let (status, _, _) = tokio::time::timeout(Duration::from_secs(5), get(app, "/stall"))
        .await
        .expect("timeout layer did not answer");
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn test_shutdown_drops_stalled_connections_after_deadline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let entered = Arc::new(Notify::new());
    let handler_entered = Arc::clone(&entered);
    let app = Router::new().route(
        "/stall",
        route_get(move || {
            let entered = Arc::clone(&handler_entered);
            async move {
                entered.notify_one();
                tokio::time::sleep(Duration::from_secs(60)).await;
                "late"
            }
        }),
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let shutdown = async move {
        let _ = stop_rx.await;
    };
    let server = tokio::spawn(serve_until(
        listener,
        app,
        shutdown,
        Duration::from_millis(200),
    ));

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"GET /stall HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    entered.notified().await;

    stop_tx.send(()).unwrap();
    let finished = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server kept waiting on the stalled request");
    assert!(finished.unwrap().is_ok());
    drop(client);
}

#[test]
fn test_cli_rejects_unknown_encoding() {
    Command::cargo_bin("logview")
        .unwrap()
        .args(["--encoding", "ebcdic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported encoding"));
}

#[test]
fn test_cli_rejects_zero_preview_limit() {
    Command::cargo_bin("logview")
        .unwrap()
        .args(["--preview-limit", "0"])
        .assert()
        .failure();
}
