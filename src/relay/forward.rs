//! Stream forwarder: relays remote bytes to the client with correct framing.
//!
//! The object is never buffered; chunks go out as they arrive from the
//! upstream fetch. When the client disconnects, axum drops the response body,
//! which drops the upstream stream and aborts the remote read.

use axum::body::Body;
use axum::http::{HeaderValue, Response as HttpResponse, StatusCode, header};
use axum::response::Response;
use futures::TryStreamExt;

use crate::error::RelayError;
use crate::relay::range::{self, ByteRange, RangeOutcome};
use crate::store::FileRecord;
use crate::telegram::TelegramApi;

/// How the client is told to handle the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Playback in place (`/stream`).
    Inline,
    /// Save to disk under the stored filename (`/download`).
    Attachment,
}

impl Disposition {
    fn as_str(&self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

/// Relay one file to the client, honoring an optional `Range` header.
pub async fn serve(
    telegram: &TelegramApi,
    record: &FileRecord,
    range_header: Option<&str>,
    disposition: Disposition,
) -> Result<Response, RelayError> {
    let resolved = telegram.resolve_file(&record.file_id).await?;
    // The resolution call reports a size for media kinds where ingestion
    // could not; prefer the stored value when both exist.
    let total = record.size.or(resolved.size);

    match range::parse(range_header, total) {
        RangeOutcome::Unsatisfiable { total } => {
            Err(RelayError::RangeNotSatisfiable { size: total })
        }
        RangeOutcome::Full => {
            let upstream = telegram.open_stream(&resolved, None).await?;
            if !upstream.status().is_success() {
                return Err(upstream_error(upstream.status()));
            }
            full_response(record, total, upstream, disposition)
        }
        RangeOutcome::Partial(requested) => {
            let upstream = telegram
                .open_stream(&resolved, Some(&requested.header_value()))
                .await?;
            match upstream.status() {
                StatusCode::PARTIAL_CONTENT => {
                    partial_response(record, requested, upstream, disposition)
                }
                // Upstream ignored the range: serve the whole object rather
                // than mislabel a full body as partial.
                s if s.is_success() => full_response(record, total, upstream, disposition),
                StatusCode::RANGE_NOT_SATISFIABLE => match total {
                    Some(size) => Err(RelayError::RangeNotSatisfiable { size }),
                    None => Err(RelayError::RemoteFetch {
                        reason: "upstream rejected range on object of unknown size".to_string(),
                    }),
                },
                s => Err(upstream_error(s)),
            }
        }
    }
}

/// Relay a thumbnail: whole object, inline, image fallback content type.
pub async fn serve_thumb(telegram: &TelegramApi, thumb_id: &str) -> Result<Response, RelayError> {
    let resolved = telegram.resolve_file(thumb_id).await?;
    let upstream = telegram.open_stream(&resolved, None).await?;
    if !upstream.status().is_success() {
        return Err(upstream_error(upstream.status()));
    }

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("image/jpeg"));

    let mut builder = HttpResponse::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(len) = upstream.content_length() {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }
    builder
        .body(relay_body(upstream))
        .map_err(|e| RelayError::RemoteFetch {
            reason: e.to_string(),
        })
}

fn full_response(
    record: &FileRecord,
    total: Option<u64>,
    upstream: reqwest::Response,
    disposition: Disposition,
) -> Result<Response, RelayError> {
    let mut builder = HttpResponse::builder()
        .status(StatusCode::OK)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_TYPE, content_type(record))
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(disposition, &record.file_name),
        );

    // Trust the upstream's length over stored metadata; a mismatch here
    // would corrupt the client's framing.
    if let Some(len) = upstream.content_length().or(total) {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }

    builder
        .body(relay_body(upstream))
        .map_err(|e| RelayError::RemoteFetch {
            reason: e.to_string(),
        })
}

fn partial_response(
    record: &FileRecord,
    requested: ByteRange,
    upstream: reqwest::Response,
    disposition: Disposition,
) -> Result<Response, RelayError> {
    let mut builder = HttpResponse::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_TYPE, content_type(record))
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(disposition, &record.file_name),
        );

    // The upstream knows the true extent; fall back to the bounds we
    // computed only when it does not say. An upstream may clamp the range
    // differently than we did, so once its Content-Range is mirrored the
    // length must come from those bounds, never from our own.
    let upstream_range = upstream.headers().get(header::CONTENT_RANGE).cloned();
    let fallback_len = match &upstream_range {
        Some(cr) => cr.to_str().ok().and_then(content_range_len),
        None => requested.len(),
    };
    if let Some(cr) = upstream_range {
        builder = builder.header(header::CONTENT_RANGE, cr);
    } else if let Some(cr) = requested.content_range() {
        builder = builder.header(header::CONTENT_RANGE, cr);
    }
    if let Some(len) = upstream.content_length().or(fallback_len) {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }

    builder
        .body(relay_body(upstream))
        .map_err(|e| RelayError::RemoteFetch {
            reason: e.to_string(),
        })
}

/// Wrap the upstream byte stream as a response body.
///
/// A mid-transfer failure becomes a body error, which makes axum abort the
/// connection. Headers are already on the wire at that point so the client
/// sees a truncated transfer, never rewritten framing.
fn relay_body(upstream: reqwest::Response) -> Body {
    let stream = upstream.bytes_stream().map_err(|e| {
        let e = e.without_url();
        tracing::warn!(error = %e, "remote stream failed mid-transfer, aborting response");
        std::io::Error::other(e)
    });
    Body::from_stream(stream)
}

/// Byte count described by a `Content-Range: bytes a-b/x` value.
fn content_range_len(value: &str) -> Option<u64> {
    let spec = value.strip_prefix("bytes ")?;
    let (bounds, _) = spec.split_once('/')?;
    let (start, end) = bounds.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = end.trim().parse().ok()?;
    (end >= start).then(|| end - start + 1)
}

fn upstream_error(status: StatusCode) -> RelayError {
    if status == StatusCode::NOT_FOUND {
        // The resolved path went stale between getFile and the fetch.
        RelayError::LocatorInvalid {
            reason: "upstream returned 404 for resolved path".to_string(),
        }
    } else {
        RelayError::RemoteFetch {
            reason: format!("upstream returned {status}"),
        }
    }
}

fn content_type(record: &FileRecord) -> HeaderValue {
    let value = match &record.mime_type {
        Some(m) => m.clone(),
        None => mime_guess::from_path(&record.file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    };
    HeaderValue::from_str(&value)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

/// Build a `Content-Disposition` value carrying the stored filename.
///
/// The quoted form gets a sanitized ASCII rendition; the original name rides
/// along percent-encoded in the RFC 5987 `filename*` parameter.
fn content_disposition(disposition: Disposition, file_name: &str) -> HeaderValue {
    let ascii: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let value = format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition.as_str(),
        ascii,
        urlencoding::encode(file_name)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MediaKind;
    use pretty_assertions::assert_eq;

    fn record(name: &str, mime: Option<&str>) -> FileRecord {
        FileRecord {
            file_id: "f1".to_string(),
            file_name: name.to_string(),
            mime_type: mime.map(str::to_string),
            size: None,
            kind: MediaKind::Document,
            caption: None,
            thumb_id: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn content_type_prefers_stored_mime() {
        let r = record("movie.mp4", Some("video/webm"));
        assert_eq!(content_type(&r).to_str().unwrap(), "video/webm");
    }

    #[test]
    fn content_type_guesses_from_filename() {
        let r = record("movie.mp4", None);
        assert_eq!(content_type(&r).to_str().unwrap(), "video/mp4");
    }

    #[test]
    fn content_type_falls_back_to_octet_stream() {
        let r = record("mystery.blob", None);
        assert_eq!(
            content_type(&r).to_str().unwrap(),
            "application/octet-stream"
        );
    }

    #[test]
    fn content_range_len_reads_the_mirrored_bounds() {
        assert_eq!(content_range_len("bytes 0-99/500"), Some(100));
        assert_eq!(content_range_len("bytes 100-299/*"), Some(200));
        // Same request after an upstream clamp: 50 bytes, not the 100 asked.
        assert_eq!(content_range_len("bytes 350-399/400"), Some(50));
        assert_eq!(content_range_len("bytes */500"), None);
        assert_eq!(content_range_len("bytes 99-0/500"), None);
        assert_eq!(content_range_len("garbage"), None);
    }

    #[test]
    fn disposition_quotes_and_escapes_filename() {
        let v = content_disposition(Disposition::Attachment, "weekly \"report\".pdf");
        assert_eq!(
            v.to_str().unwrap(),
            "attachment; filename=\"weekly _report_.pdf\"; filename*=UTF-8''weekly%20%22report%22.pdf"
        );
    }

    #[test]
    fn disposition_handles_non_ascii_names() {
        let v = content_disposition(Disposition::Inline, "отчёт.pdf");
        let s = v.to_str().unwrap();
        assert!(s.starts_with("inline; filename=\"_____.pdf\""));
        assert!(s.contains("filename*=UTF-8''%D0%BE"));
    }
}
