//! Metadata store abstraction.
//!
//! The relay only ever reads records; writes come from the webhook ingestion
//! path. Both go through the same narrow trait so the serving code has no
//! process-wide mutable state of its own.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Media category, decided once at ingestion and carried on the record so
/// serve-time code never re-probes message attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Document,
    Video,
    Photo,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Document => "document",
            MediaKind::Video => "video",
            MediaKind::Photo => "photo",
            MediaKind::Audio => "audio",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document" => Some(MediaKind::Document),
            "video" => Some(MediaKind::Video),
            "photo" => Some(MediaKind::Photo),
            "audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }

    /// Fallback filename when the platform does not supply one.
    pub fn default_file_name(&self) -> &'static str {
        match self {
            MediaKind::Document => "file",
            MediaKind::Video => "video.mp4",
            MediaKind::Photo => "image.jpg",
            MediaKind::Audio => "audio.mp3",
        }
    }
}

/// One deliverable object observed by ingestion.
///
/// `file_id` is the opaque Telegram locator token; it doubles as the stable
/// record key. Records are immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    /// Total byte length when the platform reported it at ingestion time.
    pub size: Option<u64>,
    pub kind: MediaKind,
    pub caption: Option<String>,
    /// Locator token of a preview image, when the media has one.
    pub thumb_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Keyed store of [`FileRecord`]s.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch a record by file id. `Ok(None)` is an ordinary miss.
    async fn lookup(&self, file_id: &str) -> Result<Option<FileRecord>, StoreError>;

    /// Insert a record. Re-ingesting an already-known id is a no-op.
    async fn upsert(&self, record: &FileRecord) -> Result<(), StoreError>;

    /// Most recently ingested records, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<FileRecord>, StoreError>;
}
