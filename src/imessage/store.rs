//! Read-only access to the Messages database (`chat.db`)

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags};

use crate::models::{GroupChat, MessageRow};

use super::timestamp;

const GROUP_CHATS_QUERY: &str = "
    SELECT
        c.ROWID AS chat_id,
        COALESCE(NULLIF(c.display_name, ''), 'Unnamed Group') AS display_name,
        GROUP_CONCAT(h.id, '; ') AS participants,
        COUNT(DISTINCT h.ROWID) AS participant_count
    FROM chat c
    JOIN chat_handle_join chj ON chj.chat_id = c.ROWID
    JOIN handle h ON h.ROWID = chj.handle_id
    GROUP BY c.ROWID
    HAVING COUNT(DISTINCT h.ROWID) > 1
";

const LAST_MESSAGE_QUERY: &str = "
    SELECT cmj.chat_id, MAX(m.date) AS last_date
    FROM chat_message_join cmj
    JOIN message m ON m.ROWID = cmj.message_id
    GROUP BY cmj.chat_id
";

// Reaction rows are selected too; the row normalizer drops them.
const MESSAGES_QUERY: &str = "
    SELECT
        m.ROWID,
        m.guid,
        m.text,
        m.attributedBody,
        m.date,
        COALESCE(m.associated_message_type, 0),
        m.thread_originator_guid,
        CASE
            WHEN m.is_from_me = 1 THEN 'Me'
            ELSE COALESCE(h.id, 'Unknown')
        END AS sender,
        COALESCE(m.cache_has_attachments, 0),
        (SELECT a.mime_type
         FROM attachment a
         JOIN message_attachment_join maj ON maj.attachment_id = a.ROWID
         WHERE maj.message_id = m.ROWID
         LIMIT 1) AS attachment_mime_type
    FROM message m
    JOIN chat_message_join cmj ON cmj.message_id = m.ROWID
    LEFT JOIN handle h ON h.ROWID = m.handle_id
    WHERE cmj.chat_id = ?1
      AND m.date >= ?2
      AND m.date < ?3
    ORDER BY m.date ASC, m.ROWID ASC
";

/// Handle to a Messages database opened read-only.
pub struct MessageStore {
    conn: Connection,
}

impl MessageStore {
    /// Open the database at `path` without taking write locks.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open Messages database at {}", path.display()))?;
        tracing::debug!("Opened {}", path.display());
        Ok(Self { conn })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// List group chats, most recent first. Chats without messages sort last.
    pub fn list_group_chats(&self) -> Result<Vec<GroupChat>> {
        let mut stmt = self
            .conn
            .prepare(GROUP_CHATS_QUERY)
            .context("Failed to prepare group chat query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read group chats")?;

        let last_dates = self.last_message_dates();

        let mut chats: Vec<GroupChat> = rows
            .into_iter()
            .map(|(chat_id, display_name, participants, count)| GroupChat {
                chat_id,
                display_name,
                participant_count: usize::try_from(count).unwrap_or_default(),
                participants: participants
                    .map(|p| p.split("; ").map(String::from).collect())
                    .unwrap_or_default(),
                last_message_date: last_dates
                    .get(&chat_id)
                    .copied()
                    .filter(|&raw| raw != 0)
                    .map(timestamp::to_calendar_time),
            })
            .collect();

        chats.sort_by(|a, b| match (a.last_message_date, b.last_message_date) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.chat_id.cmp(&b.chat_id),
        });

        Ok(chats)
    }

    /// Latest message date per chat. Stripped-down databases may lack the
    /// join tables; that is not an error.
    fn last_message_dates(&self) -> HashMap<i64, i64> {
        let result = self.conn.prepare(LAST_MESSAGE_QUERY).and_then(|mut stmt| {
            let dates = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?))
                })?
                .filter_map(|r| r.map(|(id, date)| date.map(|d| (id, d))).transpose())
                .collect::<rusqlite::Result<HashMap<_, _>>>();
            dates
        });
        match result {
            Ok(dates) => dates,
            Err(e) => {
                tracing::debug!("No last-message dates available: {}", e);
                HashMap::new()
            }
        }
    }

    /// Rows of one chat with `start <= date < end` (raw store units), in
    /// storage order.
    pub fn fetch_rows(&self, chat_id: i64, start: i64, end: i64) -> Result<Vec<MessageRow>> {
        let mut stmt = self
            .conn
            .prepare(MESSAGES_QUERY)
            .context("Failed to prepare message query")?;
        let rows = stmt
            .query_map(params![chat_id, start, end], |row| {
                Ok(MessageRow {
                    rowid: row.get(0)?,
                    guid: row.get(1)?,
                    text: row.get(2)?,
                    attributed_body: row.get(3)?,
                    date: row.get::<_, Option<i64>>(4)?.unwrap_or_default(),
                    associated_message_type: row.get(5)?,
                    thread_originator_guid: row.get(6)?,
                    sender: row.get(7)?,
                    has_attachments: row.get::<_, i64>(8)? != 0,
                    attachment_mime_type: row.get(9)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read messages for chat {}", chat_id))?;

        tracing::debug!("Fetched {} rows for chat {}", rows.len(), chat_id);
        Ok(rows)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    use crate::imessage::normalize;

    pub(crate) fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    pub(crate) fn fixture() -> MessageStore {
        MessageStore::from_connection(fixture_connection())
    }

    /// In-memory database mirroring the parts of the Messages schema we read.
    pub(crate) fn fixture_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE handle (ROWID INTEGER PRIMARY KEY AUTOINCREMENT, id TEXT, service TEXT);
            CREATE TABLE chat (
                ROWID INTEGER PRIMARY KEY AUTOINCREMENT,
                guid TEXT UNIQUE NOT NULL,
                chat_identifier TEXT,
                display_name TEXT
            );
            CREATE TABLE message (
                ROWID INTEGER PRIMARY KEY AUTOINCREMENT,
                guid TEXT UNIQUE NOT NULL,
                text TEXT,
                attributedBody BLOB,
                handle_id INTEGER,
                date INTEGER,
                is_from_me INTEGER DEFAULT 0,
                cache_has_attachments INTEGER DEFAULT 0,
                associated_message_type INTEGER DEFAULT 0,
                associated_message_guid TEXT,
                thread_originator_guid TEXT
            );
            CREATE TABLE chat_handle_join (chat_id INTEGER, handle_id INTEGER);
            CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);
            CREATE TABLE attachment (ROWID INTEGER PRIMARY KEY AUTOINCREMENT, guid TEXT, mime_type TEXT);
            CREATE TABLE message_attachment_join (message_id INTEGER, attachment_id INTEGER);

            INSERT INTO handle (id, service) VALUES
                ('+15551234567', 'iMessage'),
                ('+15559876543', 'iMessage'),
                ('friend@email.com', 'iMessage');
            INSERT INTO chat (guid, chat_identifier, display_name) VALUES
                ('chat123', 'chat123456', 'Test Group Chat'),
                ('chat456', 'chat456789', NULL),
                ('direct', '+15551234567', NULL);
            INSERT INTO chat_handle_join (chat_id, handle_id) VALUES
                (1, 1), (1, 2), (1, 3),
                (2, 1), (2, 3),
                (3, 1);
            INSERT INTO attachment (guid, mime_type) VALUES ('attach1', 'image/jpeg');
            ",
        )
        .unwrap();

        #[allow(clippy::type_complexity)]
        let messages: [(&str, Option<&str>, Option<i64>, NaiveDateTime, i64, i64, i64, Option<&str>); 9] = [
            ("msg1", Some("Hello everyone!"), Some(1), at(15, 10, 0), 0, 0, 0, None),
            ("msg2", Some("Hey! How's it going?"), Some(2), at(15, 10, 1), 0, 0, 0, None),
            ("msg3", Some("Check out https://example.com/cool-thing"), Some(3), at(15, 10, 2), 0, 0, 0, None),
            ("msg4", Some("lol"), Some(1), at(15, 10, 3), 0, 0, 0, None),
            ("msg5", None, Some(2), at(15, 10, 4), 0, 1, 0, None),
            ("msg6", Some("I sent this!"), None, at(15, 10, 5), 1, 0, 0, None),
            ("msg7", Some("Loved \u{201c}Hello everyone!\u{201d}"), Some(2), at(15, 10, 6), 0, 0, 2000, None),
            ("msg8", Some("This is a reply to the first message"), Some(3), at(16, 12, 0), 0, 0, 0, Some("msg1")),
            ("msg9", Some("This is from February"), Some(1), at(31, 23, 59) + chrono::TimeDelta::days(15), 0, 0, 0, None),
        ];
        for (guid, text, handle, when, from_me, attach, assoc, thread) in messages {
            conn.execute(
                "INSERT INTO message (guid, text, handle_id, date, is_from_me,
                    cache_has_attachments, associated_message_type, thread_originator_guid)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![guid, text, handle, timestamp::to_raw(when), from_me, attach, assoc, thread],
            )
            .unwrap();
        }
        conn.execute_batch(
            "
            INSERT INTO chat_message_join (chat_id, message_id)
                SELECT 1, ROWID FROM message;
            INSERT INTO message_attachment_join (message_id, attachment_id) VALUES (5, 1);
            ",
        )
        .unwrap();

        conn
    }

    fn january(store: &MessageStore) -> Vec<MessageRow> {
        let start = timestamp::to_raw(at(1, 0, 0));
        let end = timestamp::to_raw(at(31, 23, 59));
        store.fetch_rows(1, start, end).unwrap()
    }

    #[test]
    fn test_fetch_rows_respects_date_range() {
        let rows = january(&fixture());
        let guids: Vec<&str> = rows.iter().map(|r| r.guid.as_str()).collect();
        assert_eq!(
            guids,
            ["msg1", "msg2", "msg3", "msg4", "msg5", "msg6", "msg7", "msg8"]
        );
    }

    #[test]
    fn test_fetch_rows_resolves_sender() {
        let rows = january(&fixture());
        assert_eq!(rows[0].sender, "+15551234567");
        assert_eq!(rows[2].sender, "friend@email.com");
        assert_eq!(rows[5].sender, "Me");
    }

    #[test]
    fn test_fetch_rows_reads_attachment_and_thread() {
        let rows = january(&fixture());
        let attachment = &rows[4];
        assert!(attachment.has_attachments);
        assert_eq!(attachment.attachment_mime_type.as_deref(), Some("image/jpeg"));
        assert!(attachment.text.is_none());

        let reply = &rows[7];
        assert_eq!(reply.thread_originator_guid.as_deref(), Some("msg1"));
    }

    #[test]
    fn test_reactions_never_survive_normalization() {
        let rows = january(&fixture());
        assert!(rows.iter().any(|r| r.associated_message_type != 0));

        let messages: Vec<_> = rows.iter().filter_map(normalize).collect();
        assert_eq!(messages.len(), rows.len() - 1);
        assert!(messages.iter().all(|m| !m.text.starts_with("Loved")));
        assert!(messages.iter().any(|m| m.text == "Look at this photo"));
    }

    #[test]
    fn test_list_group_chats() {
        let chats = fixture().list_group_chats().unwrap();
        assert_eq!(chats.len(), 2);

        let first = &chats[0];
        assert_eq!(first.chat_id, 1);
        assert_eq!(first.display_name, "Test Group Chat");
        assert_eq!(first.participant_count, 3);
        assert!(first.participants.contains(&"friend@email.com".to_string()));
        assert!(first.last_message_date.is_some());

        let second = &chats[1];
        assert_eq!(second.display_name, "Unnamed Group");
        assert!(second.last_message_date.is_none());
    }

    #[test]
    fn test_list_group_chats_without_message_tables() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT, service TEXT);
            CREATE TABLE chat (ROWID INTEGER PRIMARY KEY, guid TEXT, display_name TEXT);
            CREATE TABLE chat_handle_join (chat_id INTEGER, handle_id INTEGER);
            ",
        )
        .unwrap();
        let chats = MessageStore::from_connection(conn).list_group_chats().unwrap();
        assert!(chats.is_empty());
    }

    #[test]
    fn test_open_missing_file_is_an_error() {
        let err = MessageStore::open(Path::new("/nonexistent/chat.db")).err().unwrap();
        assert!(format!("{:#}", err).contains("/nonexistent/chat.db"));
    }
}
