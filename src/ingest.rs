//! Webhook update parsing and media metadata extraction.
//!
//! The media kind is decided exactly once here and carried on the record;
//! serve-time code never goes back to probing message attributes.

use chrono::Utc;
use serde::Deserialize;

use crate::store::{FileRecord, MediaKind};

/// A Telegram Bot API update, reduced to the fields ingestion consumes.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub channel_post: Option<Message>,
}

impl Update {
    /// Direct messages and channel posts are ingested the same way.
    pub fn into_message(self) -> Option<Message> {
        self.message.or(self.channel_post)
    }
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub document: Option<Document>,
    pub video: Option<Video>,
    pub photo: Option<Vec<PhotoSize>>,
    pub audio: Option<Audio>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Video {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
    pub thumbnail: Option<PhotoSize>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Audio {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
}

/// Extract a [`FileRecord`] from a message carrying media, if any.
///
/// Photos arrive as a size ladder; the last entry is the largest and is the
/// one stored (its own id doubles as the thumbnail locator).
pub fn extract_media(msg: &Message) -> Option<FileRecord> {
    let caption = msg.caption.clone().filter(|c| !c.is_empty());

    let (kind, file_id, file_name, mime_type, size, thumb_id) = if let Some(doc) = &msg.document {
        (
            MediaKind::Document,
            doc.file_id.clone(),
            doc.file_name.clone(),
            doc.mime_type.clone(),
            doc.file_size,
            None,
        )
    } else if let Some(video) = &msg.video {
        (
            MediaKind::Video,
            video.file_id.clone(),
            video.file_name.clone(),
            video.mime_type.clone(),
            video.file_size,
            video.thumbnail.as_ref().map(|t| t.file_id.clone()),
        )
    } else if let Some(largest) = msg.photo.as_ref().and_then(|sizes| sizes.last()) {
        (
            MediaKind::Photo,
            largest.file_id.clone(),
            None,
            Some("image/jpeg".to_string()),
            largest.file_size,
            Some(largest.file_id.clone()),
        )
    } else if let Some(audio) = &msg.audio {
        (
            MediaKind::Audio,
            audio.file_id.clone(),
            audio.file_name.clone(),
            audio.mime_type.clone(),
            audio.file_size,
            None,
        )
    } else {
        return None;
    };

    Some(FileRecord {
        file_id,
        file_name: file_name.unwrap_or_else(|| kind.default_file_name().to_string()),
        mime_type,
        size,
        kind,
        caption,
        thumb_id,
        created_at: Utc::now(),
    })
}
