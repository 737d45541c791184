//! Message-related models

use chrono::NaiveDateTime;
use serde::Serialize;

/// One row of the `message` table, joined with its sender and first
/// attachment. This is the only shape the pipeline reads from storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageRow {
    pub rowid: i64,
    pub guid: String,
    /// Plain-text column; often NULL on newer OS versions.
    pub text: Option<String>,
    /// Serialized rich-text payload, used when `text` is empty.
    pub attributed_body: Option<Vec<u8>>,
    /// Nanoseconds since 2001-01-01 UTC.
    pub date: i64,
    /// Non-zero for tapbacks and other reaction events.
    pub associated_message_type: i64,
    pub thread_originator_guid: Option<String>,
    /// Handle id, `"Me"` for the device owner, `"Unknown"` without a handle.
    pub sender: String,
    pub has_attachments: bool,
    pub attachment_mime_type: Option<String>,
}

/// A resolved chat message (or a merged run of them)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Storage guid of the message (first message of a merged run)
    pub id: String,
    pub sender: String,
    pub text: String,
    /// Local calendar time
    pub timestamp: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_parent_id: Option<String>,
    pub has_attachment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_type: Option<String>,
}

impl Message {
    /// Plain message with no thread or attachment metadata.
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        text: impl Into<String>,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            text: text.into(),
            timestamp,
            thread_parent_id: None,
            has_attachment: false,
            attachment_type: None,
        }
    }

    /// Mark this message as a reply to `parent_id`.
    pub fn reply_to(mut self, parent_id: impl Into<String>) -> Self {
        self.thread_parent_id = Some(parent_id.into());
        self
    }
}
