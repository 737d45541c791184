//! Chat-related models

use chrono::NaiveDateTime;

/// Group chat entity (more than one participant)
#[derive(Debug, Clone)]
pub struct GroupChat {
    pub chat_id: i64,
    pub display_name: String,
    pub participant_count: usize,
    pub participants: Vec<String>,
    pub last_message_date: Option<NaiveDateTime>,
}
