//! Row normalization: storage rows to canonical messages

use crate::models::{Message, MessageRow};

use super::{attributed_body, timestamp};

/// Knobs for [`normalize_with`].
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Append "... and here's a photo" (etc.) to messages that carry both
    /// text and an attachment.
    pub describe_attachments: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            describe_attachments: true,
        }
    }
}

/// Spoken stand-in for an attachment, chosen by MIME category.
pub fn attachment_placeholder(mime_type: Option<&str>) -> &'static str {
    match mime_type {
        Some(m) if m.starts_with("image/") => "Look at this photo",
        Some(m) if m.starts_with("video/") => "Look at this video",
        Some(m) if m.starts_with("audio/") => "Listen to this audio",
        _ => "Look at this file",
    }
}

/// Normalize a row with default options. `None` means the row is discarded.
pub fn normalize(row: &MessageRow) -> Option<Message> {
    normalize_with(row, NormalizeOptions::default())
}

/// Normalize a row. Reaction rows are discarded; every other row becomes a
/// message, possibly with empty text.
pub fn normalize_with(row: &MessageRow, opts: NormalizeOptions) -> Option<Message> {
    if row.associated_message_type != 0 {
        tracing::trace!(
            "Skipping reaction row {} (type {})",
            row.guid,
            row.associated_message_type
        );
        return None;
    }

    let mime = row.attachment_mime_type.as_deref();
    let text = match resolve_text(row) {
        Some(text) if row.has_attachments && opts.describe_attachments => {
            let noun = attachment_placeholder(mime)
                .rsplit(' ')
                .next()
                .unwrap_or("file");
            format!("{}... and here's a {}", text, noun)
        }
        Some(text) => text,
        None if row.has_attachments => attachment_placeholder(mime).to_string(),
        None => String::new(),
    };

    Some(Message {
        id: row.guid.clone(),
        sender: row.sender.clone(),
        text,
        timestamp: timestamp::to_calendar_time(row.date),
        thread_parent_id: row
            .thread_originator_guid
            .as_deref()
            .filter(|guid| !guid.is_empty())
            .map(String::from),
        has_attachment: row.has_attachments,
        attachment_type: row.attachment_mime_type.clone(),
    })
}

/// Plain text column first, then the rich-text payload.
fn resolve_text(row: &MessageRow) -> Option<String> {
    if let Some(text) = row.text.as_deref().filter(|t| !t.trim().is_empty()) {
        return Some(text.to_string());
    }
    let blob = row.attributed_body.as_deref()?;
    match attributed_body::decode(blob) {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("Could not decode attributedBody of {}: {}", row.guid, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(guid: &str, text: Option<&str>) -> MessageRow {
        MessageRow {
            rowid: 1,
            guid: guid.to_string(),
            text: text.map(String::from),
            date: 726_400_800_000_000_000,
            sender: "+15551234567".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_plain_text() {
        let msg = normalize(&row("m1", Some("Hello everyone!"))).unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.text, "Hello everyone!");
        assert_eq!(msg.sender, "+15551234567");
        assert_eq!(msg.timestamp, timestamp::to_calendar_time(726_400_800_000_000_000));
        assert!(msg.thread_parent_id.is_none());
    }

    #[test]
    fn test_reactions_are_discarded() {
        for kind in [2000, 2001, 2005, 3000, 1000] {
            let mut r = row("m1", Some("Loved \"Hello everyone!\""));
            r.associated_message_type = kind;
            assert!(normalize(&r).is_none(), "type {} should be discarded", kind);
        }
    }

    #[test]
    fn test_attributed_body_used_when_text_missing() {
        let mut r = row("m1", None);
        r.attributed_body = Some(b"streamtyped\x00NSString\x01\x94\x84\x01+\x05Hello".to_vec());
        assert_eq!(normalize(&r).unwrap().text, "Hello");

        r.text = Some("   ".to_string());
        assert_eq!(normalize(&r).unwrap().text, "Hello");
    }

    #[test]
    fn test_undecodable_body_falls_back_to_placeholder() {
        let mut r = row("m1", None);
        r.attributed_body = Some(b"garbage".to_vec());
        r.has_attachments = true;
        r.attachment_mime_type = Some("image/jpeg".to_string());
        assert_eq!(normalize(&r).unwrap().text, "Look at this photo");
    }

    #[test]
    fn test_attachment_placeholders() {
        assert_eq!(attachment_placeholder(Some("image/heic")), "Look at this photo");
        assert_eq!(attachment_placeholder(Some("video/quicktime")), "Look at this video");
        assert_eq!(attachment_placeholder(Some("audio/x-m4a")), "Listen to this audio");
        assert_eq!(attachment_placeholder(Some("application/pdf")), "Look at this file");
        assert_eq!(attachment_placeholder(None), "Look at this file");
    }

    #[test]
    fn test_text_with_attachment_is_described() {
        let mut r = row("m1", Some("Look what I found"));
        r.has_attachments = true;
        r.attachment_mime_type = Some("video/mp4".to_string());
        let msg = normalize(&r).unwrap();
        assert_eq!(msg.text, "Look what I found... and here's a video");
        assert!(msg.has_attachment);
        assert_eq!(msg.attachment_type.as_deref(), Some("video/mp4"));

        let plain = normalize_with(
            &r,
            NormalizeOptions {
                describe_attachments: false,
            },
        )
        .unwrap();
        assert_eq!(plain.text, "Look what I found");
    }

    #[test]
    fn test_unresolvable_row_has_empty_text() {
        let msg = normalize(&row("m1", None)).unwrap();
        assert!(msg.text.is_empty());
    }

    #[test]
    fn test_thread_parent() {
        let mut r = row("m8", Some("reply"));
        r.thread_originator_guid = Some("m1".to_string());
        assert_eq!(normalize(&r).unwrap().thread_parent_id.as_deref(), Some("m1"));

        r.thread_originator_guid = Some(String::new());
        assert!(normalize(&r).unwrap().thread_parent_id.is_none());
    }
}
