//! Command implementations behind the CLI

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::path::Path;

use crate::config::Config;
use crate::imessage::{timestamp, MessageStore};
use crate::models::{Message, MessageRow};
use crate::pipeline::{estimate, ExtractionRun};

/// Which chat and which slice of it to extract.
#[derive(Debug, Clone)]
pub struct Selection {
    pub chat_id: i64,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Per-invocation overrides of config values.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub no_links: bool,
    pub merge_window_secs: Option<u64>,
}

fn open_store(config: &Config, db_path: Option<&Path>) -> Result<MessageStore> {
    let path = config
        .effective_db_path(db_path)
        .context("Could not determine the Messages database location; pass --db-path")?;
    tracing::debug!("Using database {}", path.display());
    MessageStore::open(&path)
}

/// Parse a command-line date into the half-open span it names: a bare
/// date covers the whole day, a time covers that one second.
pub fn parse_date(input: &str) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let input = input.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, fmt) {
            return Ok((dt, dt + TimeDelta::seconds(1)));
        }
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").with_context(|| {
        format!(
            "Invalid date '{}': expected YYYY-MM-DD, YYYY-MM-DD HH:MM or YYYY-MM-DD HH:MM:SS",
            input
        )
    })?;
    let next = date
        .succ_opt()
        .with_context(|| format!("Date '{}' is out of range", input))?;
    Ok((date.and_time(NaiveTime::MIN), next.and_time(NaiveTime::MIN)))
}

/// Resolve the requested range against `now` as `[start, end)`. Defaults
/// to the start of the current month up to now; a reversed range is
/// swapped.
pub fn resolve_range(
    start: Option<&str>,
    end: Option<&str>,
    now: NaiveDateTime,
) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let start = match start {
        Some(s) => parse_date(s)?,
        None => {
            let month = now
                .date()
                .with_day(1)
                .context("Could not compute start of month")?
                .and_time(NaiveTime::MIN);
            (month, month)
        }
    };
    let end = match end {
        Some(s) => parse_date(s)?,
        None => (now, now),
    };

    if start.0 > end.0 {
        tracing::warn!("Start {} is after end {}; swapping", start.0, end.0);
        return Ok((end.0, start.1));
    }
    Ok((start.0, end.1))
}

/// Store rows of the selected chat and range.
fn fetch_selection(
    store: &MessageStore,
    selection: &Selection,
    now: NaiveDateTime,
) -> Result<Vec<MessageRow>> {
    let (start, end) = resolve_range(selection.start.as_deref(), selection.end.as_deref(), now)?;
    tracing::info!(
        "Extracting chat {} from {} until {}",
        selection.chat_id,
        start.format("%Y-%m-%d %H:%M:%S"),
        end.format("%Y-%m-%d %H:%M:%S")
    );
    store.fetch_rows(
        selection.chat_id,
        timestamp::to_raw(start),
        timestamp::to_raw(end),
    )
}

/// List group chats, most recent first.
pub fn list_chats(config: &Config, db_path: Option<&Path>) -> Result<()> {
    let store = open_store(config, db_path)?;
    let chats = store.list_group_chats()?;

    println!("\nGroup Chats:");
    println!("{:-<60}", "");

    if chats.is_empty() {
        println!("  (no group chats found)");
        return Ok(());
    }

    for chat in &chats {
        println!("{}", chat.display_name);
        println!("  ID:    {}", chat.chat_id);
        println!(
            "  With:  {} ({} participants)",
            chat.participants.join(", "),
            chat.participant_count
        );
        if let Some(last) = chat.last_message_date {
            println!("  Last:  {}", last.format("%Y-%m-%d %H:%M"));
        }
        println!();
    }
    Ok(())
}

/// Run the full pipeline for one chat and range.
async fn extract(
    config: &Config,
    db_path: Option<&Path>,
    selection: &Selection,
    overrides: &Overrides,
) -> Result<Vec<Message>> {
    let store = open_store(config, db_path)?;
    let rows = fetch_selection(&store, selection, Local::now().naive_local())?;

    let mut settings = config.run_settings();
    if overrides.no_links {
        settings.resolve_links = false;
    }
    if let Some(window) = overrides.merge_window_secs {
        settings.merge_window_secs = window;
    }

    let utterances = ExtractionRun::new(settings)?.run(rows).await;
    if utterances.is_empty() {
        bail!(
            "No messages in chat {} for the selected date range",
            selection.chat_id
        );
    }
    tracing::info!("Extracted {} utterances", utterances.len());
    Ok(utterances)
}

pub fn format_utterance(msg: &Message) -> String {
    format!(
        "[{}] {}: {}",
        msg.timestamp.format("%Y-%m-%d %H:%M"),
        msg.sender,
        msg.text
    )
}

/// Print the speech-ready transcript.
pub async fn transcript(
    config: &Config,
    db_path: Option<&Path>,
    selection: &Selection,
    overrides: &Overrides,
    json: bool,
) -> Result<()> {
    let utterances = extract(config, db_path, selection, overrides).await?;

    if json {
        let out =
            serde_json::to_string_pretty(&utterances).context("Failed to serialize transcript")?;
        println!("{}", out);
    } else {
        for msg in &utterances {
            println!("{}", format_utterance(msg));
        }
    }
    Ok(())
}

/// Print counts and the estimated synthesis cost.
pub async fn estimate_cost(
    config: &Config,
    db_path: Option<&Path>,
    selection: &Selection,
    overrides: &Overrides,
    json: bool,
) -> Result<()> {
    let utterances = extract(config, db_path, selection, overrides).await?;
    let est = estimate(&utterances, config.cost_per_1k_chars);

    if json {
        let out = serde_json::to_string_pretty(&est).context("Failed to serialize estimate")?;
        println!("{}", out);
    } else {
        println!("Utterances:     {}", est.message_count);
        println!("Characters:     {}", est.characters);
        println!(
            "Estimated cost: ${:.2} (at ${:.2} per 1000 characters)",
            est.estimated_cost, config.cost_per_1k_chars
        );
    }
    Ok(())
}

/// Show the effective configuration, or write it out with `init`.
pub fn show_config(config: &Config, init: bool) -> Result<()> {
    let path = Config::config_path()?;
    if init {
        if path.exists() {
            println!("Config file already exists: {}", path.display());
        } else {
            let written = config.save()?;
            println!("Wrote {}", written.display());
        }
        return Ok(());
    }

    let state = if path.exists() { "" } else { " (not created, using defaults)" };
    println!("# {}{}", path.display(), state);
    print!("{}", config.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imessage::store::tests::{at, fixture_connection};

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(
            parse_date("2024-01-15").unwrap(),
            (dt(2024, 1, 15, 0, 0, 0), dt(2024, 1, 16, 0, 0, 0))
        );
        assert_eq!(
            parse_date("2024-01-15 14:30").unwrap(),
            (dt(2024, 1, 15, 14, 30, 0), dt(2024, 1, 15, 14, 30, 1))
        );
        assert_eq!(
            parse_date(" 2024-01-15 14:30:05 ").unwrap(),
            (dt(2024, 1, 15, 14, 30, 5), dt(2024, 1, 15, 14, 30, 6))
        );
        assert_eq!(
            parse_date("2024-12-31").unwrap().1,
            dt(2025, 1, 1, 0, 0, 0)
        );
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        let err = parse_date("15/01/2024").unwrap_err();
        assert!(format!("{:#}", err).contains("15/01/2024"));
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn test_resolve_range_defaults_to_month_so_far() {
        let now = dt(2024, 3, 17, 9, 45, 0);
        let (start, end) = resolve_range(None, None, now).unwrap();
        assert_eq!(start, dt(2024, 3, 1, 0, 0, 0));
        assert_eq!(end, now);
    }

    #[test]
    fn test_resolve_range_explicit_bounds() {
        let now = dt(2024, 3, 17, 9, 45, 0);
        let (start, end) = resolve_range(Some("2024-01-01"), Some("2024-01-31"), now).unwrap();
        assert_eq!(start, dt(2024, 1, 1, 0, 0, 0));
        assert_eq!(end, dt(2024, 2, 1, 0, 0, 0));

        let (_, end) = resolve_range(Some("2024-01-01"), Some("2024-01-31 18:00"), now).unwrap();
        assert_eq!(end, dt(2024, 1, 31, 18, 0, 1));
    }

    #[test]
    fn test_resolve_range_swaps_reversed() {
        let now = dt(2024, 3, 17, 9, 45, 0);
        let (start, end) =
            resolve_range(Some("2024-02-10 12:00"), Some("2024-02-01 08:00"), now).unwrap();
        assert_eq!(start, dt(2024, 2, 1, 8, 0, 0));
        assert_eq!(end, dt(2024, 2, 10, 12, 0, 1));

        let (start, end) = resolve_range(Some("2024-02-10"), Some("2024-02-01"), now).unwrap();
        assert_eq!(start, dt(2024, 2, 1, 0, 0, 0));
        assert_eq!(end, dt(2024, 2, 11, 0, 0, 0));
    }

    #[test]
    fn test_date_only_end_includes_last_second_of_day() {
        let conn = fixture_connection();
        // Half a second into the last second of January 16.
        let late = timestamp::to_raw(at(16, 23, 59) + TimeDelta::seconds(59)) + 500_000_000;
        conn.execute(
            "INSERT INTO message (guid, text, handle_id, date) VALUES ('late', 'night owl', 1, ?1)",
            [late],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO chat_message_join (chat_id, message_id) VALUES (1, last_insert_rowid())",
            [],
        )
        .unwrap();
        let store = MessageStore::from_connection(conn);

        let selection = Selection {
            chat_id: 1,
            start: Some("2024-01-16".to_string()),
            end: Some("2024-01-16".to_string()),
        };
        let rows = fetch_selection(&store, &selection, dt(2024, 3, 1, 0, 0, 0)).unwrap();
        let guids: Vec<&str> = rows.iter().map(|r| r.guid.as_str()).collect();
        assert_eq!(guids, ["msg8", "late"]);
    }

    #[test]
    fn test_format_utterance() {
        let msg = Message::new("1", "Me", "on my way", dt(2024, 1, 15, 10, 5, 42));
        assert_eq!(format_utterance(&msg), "[2024-01-15 10:05] Me: on my way");
    }
}
