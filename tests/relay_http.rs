//! End-to-end relay tests against a stub Telegram API on loopback.
//!
//! The stub implements just enough of the Bot API surface for the relay:
//! `getFile` resolution and range-capable file downloads.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use futures::StreamExt;
use secrecy::SecretString;
use serde_json::json;

use mediaferry::config::{ServerConfig, TelegramConfig};
use mediaferry::server::{AppState, RelayServer, RelayServerConfig, router};
use mediaferry::store::{FileRecord, MediaKind, MemoryStore, MetadataStore};
use mediaferry::telegram::TelegramApi;

const TOKEN: &str = "123:TEST";

#[derive(Clone)]
struct StubEntry {
    file_path: String,
    /// Whether getFile reports the byte size.
    report_size: bool,
    /// Payload served by the file route; `None` makes the route fail with 500.
    body: Option<Bytes>,
    /// Makes getFile answer `ok: false`.
    reject: bool,
}

/// File paths with special serving behavior instead of a fixed body.
const ENDLESS_PATH: &str = "videos/endless.bin";
const TRUNCATED_PATH: &str = "videos/truncated.bin";

#[derive(Clone)]
struct StubTelegram {
    entries: Arc<HashMap<String, StubEntry>>,
    /// Chunks handed out on the endless route, for cancellation tests.
    endless_pulls: Arc<AtomicU64>,
}

async fn stub_get_file(
    State(stub): State<StubTelegram>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let id = params.get("file_id").cloned().unwrap_or_default();
    match stub.entries.get(&id) {
        Some(entry) if !entry.reject => {
            let file_size = entry
                .report_size
                .then(|| entry.body.as_ref().map(|b| b.len()))
                .flatten();
            axum::Json(json!({
                "ok": true,
                "result": {
                    "file_id": id,
                    "file_size": file_size,
                    "file_path": entry.file_path,
                }
            }))
            .into_response()
        }
        _ => axum::Json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: file not found"
        }))
        .into_response(),
    }
}

async fn stub_fetch(
    State(stub): State<StubTelegram>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(entry) = stub.entries.values().find(|e| e.file_path == path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if entry.file_path == ENDLESS_PATH {
        return endless_body(stub.endless_pulls.clone()).into_response();
    }
    if entry.file_path == TRUNCATED_PATH {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(source_bytes(1024)),
            Ok(source_bytes(1024)),
            Err(std::io::Error::other("source died mid-transfer")),
        ];
        // Pace the chunks so hyper flushes the headers and early bytes before
        // the error lands; an immediately-ready erroring stream would abort
        // the connection before anything reaches the wire.
        let stream = futures::stream::iter(chunks).then(|chunk| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            chunk
        });
        return axum::body::Body::from_stream(stream).into_response();
    }
    let Some(body) = &entry.body else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let total = body.len() as u64;

    if let Some((start, end)) = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_stub_range(v, total))
    {
        if start >= total {
            return (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{total}"))],
            )
                .into_response();
        }
        let slice = body.slice(start as usize..=end as usize);
        return (
            StatusCode::PARTIAL_CONTENT,
            [(header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}"))],
            slice,
        )
            .into_response();
    }

    body.clone().into_response()
}

/// A never-ending chunk stream. Each pull is counted and paced so that the
/// counter settling is a reliable signal that the consumer went away.
fn endless_body(pulls: Arc<AtomicU64>) -> axum::body::Body {
    let stream = futures::stream::unfold(pulls, |pulls| async move {
        tokio::time::sleep(Duration::from_millis(2)).await;
        pulls.fetch_add(1, Ordering::SeqCst);
        Some((
            Ok::<_, std::io::Error>(Bytes::from(vec![0u8; 1024])),
            pulls,
        ))
    });
    axum::body::Body::from_stream(stream)
}

/// `bytes=a-b` and `bytes=a-`, which is all the relay ever sends upstream.
fn parse_stub_range(value: &str, total: u64) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = if end.is_empty() {
        total.saturating_sub(1)
    } else {
        end.parse::<u64>().ok()?.min(total.saturating_sub(1))
    };
    Some((start, end))
}

fn source_bytes(n: usize) -> Bytes {
    Bytes::from((0..n).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

fn record(file_id: &str, name: &str, mime: Option<&str>, size: Option<u64>) -> FileRecord {
    FileRecord {
        file_id: file_id.to_string(),
        file_name: name.to_string(),
        mime_type: mime.map(str::to_string),
        size,
        kind: MediaKind::Video,
        caption: None,
        thumb_id: None,
        created_at: chrono::Utc::now(),
    }
}

struct Harness {
    base: String,
    client: reqwest::Client,
    endless_pulls: Arc<AtomicU64>,
    _server: RelayServer,
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

async fn setup() -> Harness {
    let mut entries = HashMap::new();
    entries.insert(
        "KNOWN".to_string(),
        StubEntry {
            file_path: "videos/clip.mp4".to_string(),
            report_size: true,
            body: Some(source_bytes(500)),
            reject: false,
        },
    );
    entries.insert(
        "NOSIZE".to_string(),
        StubEntry {
            file_path: "voice/note.oga".to_string(),
            report_size: false,
            body: Some(source_bytes(300)),
            reject: false,
        },
    );
    entries.insert(
        "GONE".to_string(),
        StubEntry {
            file_path: "documents/gone.bin".to_string(),
            report_size: true,
            body: None,
            reject: true,
        },
    );
    entries.insert(
        "BROKEN".to_string(),
        StubEntry {
            file_path: "documents/broken.bin".to_string(),
            report_size: false,
            body: None,
            reject: false,
        },
    );
    entries.insert(
        "ENDLESS".to_string(),
        StubEntry {
            file_path: ENDLESS_PATH.to_string(),
            report_size: false,
            body: None,
            reject: false,
        },
    );
    entries.insert(
        "TRUNCATED".to_string(),
        StubEntry {
            file_path: TRUNCATED_PATH.to_string(),
            report_size: false,
            body: None,
            reject: false,
        },
    );

    let endless_pulls = Arc::new(AtomicU64::new(0));
    let stub = StubTelegram {
        entries: Arc::new(entries),
        endless_pulls: endless_pulls.clone(),
    };
    let stub_app = Router::new()
        .route(&format!("/bot{TOKEN}/getFile"), get(stub_get_file))
        .route(&format!("/file/bot{TOKEN}/{{*path}}"), get(stub_fetch))
        .with_state(stub);
    let stub_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let stub_addr = stub_listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(stub_listener, stub_app).await.unwrap();
    });

    let store = Arc::new(MemoryStore::new());
    for r in [
        record("KNOWN", "clip.mp4", Some("video/mp4"), Some(500)),
        record("NOSIZE", "note.oga", None, None),
        record("GONE", "gone.bin", None, Some(100)),
        record("BROKEN", "broken.bin", None, None),
        record("ENDLESS", "endless.bin", None, None),
        record("TRUNCATED", "truncated.bin", None, None),
    ] {
        store.upsert(&r).await.unwrap();
    }

    let telegram = Arc::new(TelegramApi::new(&TelegramConfig {
        bot_token: SecretString::from(TOKEN.to_string()),
        api_base: format!("http://{stub_addr}"),
    }));
    let state = AppState::new(
        store,
        telegram,
        &ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            webhook_secret: None,
        },
    );

    let mut server = RelayServer::new(RelayServerConfig {
        addr: "127.0.0.1:0".parse().unwrap(),
    });
    let addr = server.start(router(state)).await.unwrap();

    Harness {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        endless_pulls,
        _server: server,
    }
}

fn header_str<'a>(response: &'a reqwest::Response, name: header::HeaderName) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn full_download_returns_whole_object() {
    let h = setup().await;
    let response = h
        .client
        .get(h.url("/download/KNOWN"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("500"));
    assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("video/mp4"));
    assert_eq!(header_str(&response, header::ACCEPT_RANGES), Some("bytes"));
    let disposition = header_str(&response, header::CONTENT_DISPOSITION).unwrap();
    assert!(disposition.starts_with("attachment"), "{disposition}");
    assert!(disposition.contains("clip.mp4"), "{disposition}");

    assert_eq!(response.bytes().await.unwrap(), source_bytes(500));
}

#[tokio::test]
async fn stream_serves_first_hundred_bytes() {
    let h = setup().await;
    let response = h
        .client
        .get(h.url("/stream/KNOWN"))
        .header(header::RANGE, "bytes=0-99")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 0-99/500")
    );
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("100"));

    let body = response.bytes().await.unwrap();
    assert_eq!(body, source_bytes(500).slice(0..100));
}

#[tokio::test]
async fn stream_uses_inline_disposition() {
    let h = setup().await;
    let response = h.client.get(h.url("/stream/KNOWN")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let disposition = header_str(&response, header::CONTENT_DISPOSITION).unwrap();
    assert!(disposition.starts_with("inline"), "{disposition}");
}

#[tokio::test]
async fn range_past_end_is_416() {
    let h = setup().await;
    let response = h
        .client
        .get(h.url("/stream/KNOWN"))
        .header(header::RANGE, "bytes=500-510")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes */500")
    );
}

#[tokio::test]
async fn multi_range_honors_first_range_only() {
    let h = setup().await;
    let response = h
        .client
        .get(h.url("/stream/KNOWN"))
        .header(header::RANGE, "bytes=0-10,20-30")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 0-10/500")
    );
    assert_eq!(response.bytes().await.unwrap().len(), 11);
}

#[tokio::test]
async fn suffix_range_serves_tail() {
    let h = setup().await;
    let response = h
        .client
        .get(h.url("/stream/KNOWN"))
        .header(header::RANGE, "bytes=-100")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 400-499/500")
    );
    assert_eq!(
        response.bytes().await.unwrap(),
        source_bytes(500).slice(400..500)
    );
}

#[tokio::test]
async fn unknown_size_open_range_mirrors_upstream_framing() {
    let h = setup().await;
    let response = h
        .client
        .get(h.url("/stream/NOSIZE"))
        .header(header::RANGE, "bytes=100-")
        .send()
        .await
        .unwrap();

    // Neither the store nor getFile knows the size; the upstream 206 tells
    // the truth and the relay mirrors it.
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 100-299/300")
    );
    assert_eq!(
        response.bytes().await.unwrap(),
        source_bytes(300).slice(100..300)
    );
}

#[tokio::test]
async fn unknown_id_is_404_with_short_body() {
    let h = setup().await;
    for path in ["/download/MISSING", "/stream/MISSING"] {
        let response = h.client.get(h.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        assert!(response.bytes().await.unwrap().len() < 64);
    }
}

#[tokio::test]
async fn rejected_locator_is_404() {
    let h = setup().await;
    let response = h.client.get(h.url("/download/GONE")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failing_upstream_fetch_is_502() {
    let h = setup().await;
    let response = h
        .client
        .get(h.url("/download/BROKEN"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn dropped_client_stops_upstream_reads() {
    let h = setup().await;
    let mut response = h.client.get(h.url("/stream/ENDLESS")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = response.chunk().await.unwrap();
    assert!(first.is_some());
    drop(response);

    // Let the in-flight buffers on both hops drain, then the stub-side pull
    // counter must stop advancing.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let settled = h.endless_pulls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    let after = h.endless_pulls.load(Ordering::SeqCst);
    assert!(
        after <= settled + 2,
        "upstream reads kept flowing after client disconnect: {settled} -> {after}"
    );
}

#[tokio::test]
async fn mid_stream_failure_truncates_the_transfer() {
    let h = setup().await;
    let response = h
        .client
        .get(h.url("/download/TRUNCATED"))
        .send()
        .await
        .unwrap();
    // Headers are already on the wire when the source dies; the client must
    // see a truncated transfer, never a clean end or rewritten framing.
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.bytes().await.is_err());
}

#[tokio::test]
async fn repeated_downloads_are_byte_identical() {
    let h = setup().await;
    let first = h
        .client
        .get(h.url("/download/KNOWN"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let second = h
        .client
        .get(h.url("/download/KNOWN"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(first, second);
}
