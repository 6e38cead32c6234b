//! Acceptance tests for the feed HTTP API
//!
//! Drives the router in-process with a stand-in verification backend:
//! 1. Feed listing order, limits and status annotation
//! 2. Name validation (400) and existence (404) on every name route
//! 3. Annotated, raw and streamed download responses
//! 4. HTML page and health endpoint

use aletheia_core::{signature_path, SignatureVerifier, VerificationStatus};
use aletheia_server::{feed_router, AppState, FeedConfig, FeedResponse};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tower::ServiceExt;

/// Verified when the sidecar says "good", invalid for any other sidecar
struct SidecarVerifier;

impl SignatureVerifier for SidecarVerifier {
    fn verify(&self, artifact: &Path) -> VerificationStatus {
        match fs::read_to_string(signature_path(artifact)) {
            Ok(sig) if sig == "good" => VerificationStatus::Verified,
            Ok(_) => VerificationStatus::Invalid,
            Err(_) => VerificationStatus::Unknown,
        }
    }
}

fn write_answer(outbox: &Path, name: &str, body: &str, age_secs: u64) {
    let path = outbox.join(name);
    fs::write(&path, body).unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
}

fn test_app() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let outbox = dir.path().join("outbox");
    fs::create_dir(&outbox).unwrap();

    let mut config = FeedConfig::new(&outbox, dir.path().join("allowed_signers"));
    config.watch = false;

    let state = AppState::with_verifier(config, Arc::new(SidecarVerifier));
    (dir, feed_router(Arc::new(state)))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

async fn feed(app: &Router, uri: &str) -> FeedResponse {
    let (status, _, body) = get(app, uri).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_feed_lists_newest_first_with_status() {
    let (dir, app) = test_app();
    let outbox = dir.path().join("outbox");

    write_answer(&outbox, "old.answer.txt", "old body", 300);
    write_answer(&outbox, "signed.answer.txt", "signed body", 200);
    write_answer(&outbox, "tampered.answer.txt", "tampered body", 100);
    fs::write(outbox.join("signed.answer.txt.sig"), "good").unwrap();
    fs::write(outbox.join("tampered.answer.txt.sig"), "bad").unwrap();
    fs::write(outbox.join("README.md"), "ignored").unwrap();

    let response = feed(&app, "/api/feed").await;
    assert_eq!(response.count, 3);

    let names: Vec<_> = response.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["tampered.answer.txt", "signed.answer.txt", "old.answer.txt"]
    );

    let statuses: Vec<_> = response.entries.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            VerificationStatus::Invalid,
            VerificationStatus::Verified,
            VerificationStatus::Unknown
        ]
    );
    assert_eq!(response.entries[2].preview, "old body");
}

#[tokio::test]
async fn test_feed_limit_and_ordering() {
    let (dir, app) = test_app();
    let outbox = dir.path().join("outbox");
    for i in 0..12u64 {
        write_answer(&outbox, &format!("n{:02}.answer.txt", i), "x", (i * 5) % 17);
    }

    let response = feed(&app, "/api/feed?limit=5").await;
    assert_eq!(response.entries.len(), 5);
    assert!(response
        .entries
        .windows(2)
        .all(|w| w[0].modified >= w[1].modified));

    let response = feed(&app, "/api/feed?limit=0").await;
    assert_eq!(response.count, 0);
    assert!(response.entries.is_empty());

    let response = feed(&app, "/api/feed?limit=1").await;
    assert_eq!(response.entries.len(), 1);

    let response = feed(&app, "/api/feed?limit=100000").await;
    assert_eq!(response.entries.len(), 12);

    let response = feed(&app, "/api/feed").await;
    assert_eq!(response.entries.len(), 12);
}

#[tokio::test]
async fn test_feed_preview_bounded() {
    let (dir, app) = test_app();
    let body = "y".repeat(1024 * 1024);
    write_answer(&dir.path().join("outbox"), "big.answer.txt", &body, 0);

    let response = feed(&app, "/api/feed").await;
    assert_eq!(response.entries[0].preview.chars().count(), 280);
    assert_eq!(response.entries[0].size, 1024 * 1024);
}

#[tokio::test]
async fn test_missing_outbox_yields_empty_feed() {
    let dir = TempDir::new().unwrap();
    let mut config = FeedConfig::new(dir.path().join("nope"), dir.path().join("signers"));
    config.watch = false;
    let app = feed_router(Arc::new(AppState::with_verifier(
        config,
        Arc::new(SidecarVerifier),
    )));

    let response = feed(&app, "/api/feed").await;
    assert!(response.entries.is_empty());
}

#[tokio::test]
async fn test_bad_names_rejected_on_every_route() {
    let (_dir, app) = test_app();

    for name in ["x.txt", "..%2Fsecret.answer.txt", "a..b.answer.txt", "%2Fetc%2Fpasswd"] {
        for suffix in ["", "/raw", "/download", "/download.sig"] {
            let uri = format!("/ui/answer/{}{}", name, suffix);
            let (status, _, body) = get(&app, &uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["error"], "bad name");
        }
    }
}

#[tokio::test]
async fn test_missing_answer_is_404() {
    let (_dir, app) = test_app();

    for suffix in ["", "/raw", "/download", "/download.sig"] {
        let uri = format!("/ui/answer/missing.answer.txt{}", suffix);
        let (status, _, _) = get(&app, &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn test_annotated_answer() {
    let (dir, app) = test_app();
    write_answer(&dir.path().join("outbox"), "a.answer.txt", "The answer.\n", 0);

    let (status, headers, body) = get(&app, "/ui/answer/a.answer.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_TYPE].to_str().unwrap(),
        "text/plain; charset=utf-8"
    );

    let text = String::from_utf8(body).unwrap();
    assert!(text.starts_with("--- Aletheia Answer ---\nfile: a.answer.txt\ntime: "));
    assert!(text.contains("\nbytes: 12\n"));
    assert!(text.contains("\nsignature: unknown (missing)\n"));
    assert!(text.contains("\nsigner key: unknown\n"));
    assert!(text.ends_with("-----------------------\n\nThe answer.\n"));
}

#[tokio::test]
async fn test_annotated_answer_with_signature() {
    let (dir, app) = test_app();
    let outbox = dir.path().join("outbox");
    write_answer(&outbox, "a.answer.txt", "body", 0);
    fs::write(outbox.join("a.answer.txt.sig"), "good").unwrap();

    let (_, _, body) = get(&app, "/ui/answer/a.answer.txt").await;
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("\nsignature: verified (present)\n"));
}

#[tokio::test]
async fn test_raw_and_downloads() {
    let (dir, app) = test_app();
    let outbox = dir.path().join("outbox");
    write_answer(&outbox, "a.answer.txt", "raw body", 0);

    let (status, _, body) = get(&app, "/ui/answer/a.answer.txt/raw").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"raw body");

    let (status, headers, body) = get(&app, "/ui/answer/a.answer.txt/download").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"raw body");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION].to_str().unwrap(),
        "attachment; filename=\"a.answer.txt\""
    );

    // Missing signature is a 404, not an "unknown" status
    let (status, _, _) = get(&app, "/ui/answer/a.answer.txt/download.sig").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    fs::write(outbox.join("a.answer.txt.sig"), [0u8, 1, 2, 255]).unwrap();
    let (status, headers, body) = get(&app, "/ui/answer/a.answer.txt/download.sig").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, vec![0u8, 1, 2, 255]);
    assert_eq!(
        headers[header::CONTENT_TYPE].to_str().unwrap(),
        "application/octet-stream"
    );
    assert_eq!(
        headers[header::CONTENT_DISPOSITION].to_str().unwrap(),
        "attachment; filename=\"a.answer.txt.sig\""
    );
}

#[tokio::test]
async fn test_large_download_streams_whole_file() {
    let (dir, app) = test_app();
    let outbox = dir.path().join("outbox");

    // Spans several read chunks and ends mid-chunk
    let body: Vec<u8> = (0..300_007u32).map(|i| (i % 251) as u8).collect();
    fs::write(outbox.join("big.answer.txt"), &body).unwrap();
    fs::write(outbox.join("big.answer.txt.sig"), &body[..70_000]).unwrap();

    let (status, headers, downloaded) = get(&app, "/ui/answer/big.answer.txt/download").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_TYPE].to_str().unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(downloaded.len(), body.len());
    assert!(downloaded == body);

    let (status, _, sig) = get(&app, "/ui/answer/big.answer.txt/download.sig").await;
    assert_eq!(status, StatusCode::OK);
    assert!(sig == body[..70_000]);
}

#[tokio::test]
async fn test_download_of_directory_is_404() {
    let (dir, app) = test_app();
    let outbox = dir.path().join("outbox");
    write_answer(&outbox, "a.answer.txt", "body", 0);
    fs::create_dir(outbox.join("a.answer.txt.sig")).unwrap();
    fs::create_dir(outbox.join("d.answer.txt")).unwrap();

    let (status, _, _) = get(&app, "/ui/answer/a.answer.txt/download.sig").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = get(&app, "/ui/answer/d.answer.txt/download").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_recent_page_renders_cards() {
    let (dir, app) = test_app();
    write_answer(&dir.path().join("outbox"), "a.answer.txt", "<b>hi</b>", 0);

    let (status, headers, body) = get(&app, "/ui/recent").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));

    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("a.answer.txt"));
    assert!(html.contains("&lt;b&gt;hi&lt;/b&gt;"));
    assert!(html.contains(r#"<span class="badge unknown">unknown</span>"#));
    assert!(html.contains("new EventSource('/ui/events')"));
}

#[tokio::test]
async fn test_health() {
    let (_dir, app) = test_app();

    let (status, _, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["ok"], true);
    assert_eq!(json["outbox"]["readable"], true);
    assert_eq!(json["trust_store"]["present"], false);
    assert_eq!(json["signer_id"], "aletheia");
}
