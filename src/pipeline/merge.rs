//! Merging consecutive messages from the same sender into one utterance.

use chrono::{NaiveDateTime, TimeDelta};

use crate::models::Message;

/// Default merge window between neighbouring messages.
pub const DEFAULT_WINDOW_SECS: u64 = 300;

/// Join two fragments so they read as one sentence: after terminal
/// punctuation a space is enough, otherwise a comma is inserted.
pub fn smart_join(acc: &str, next: &str) -> String {
    let acc = acc.trim_end();
    if acc.ends_with(['.', '!', '?']) {
        format!("{} {}", acc, next)
    } else {
        format!("{}, {}", acc, next)
    }
}

/// Collapse runs of same-sender messages into single utterances.
///
/// The window applies to each neighbouring pair, not to the run as a whole,
/// so a long chain of quick messages merges even if it spans more than the
/// window in total. The merged message keeps the id, timestamp, thread and
/// attachment fields of the first message in the run.
pub fn merge(messages: Vec<Message>, window_secs: u64) -> Vec<Message> {
    let window = i64::try_from(window_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX);
    let input_len = messages.len();

    let mut out: Vec<Message> = Vec::with_capacity(input_len);
    let mut run: Option<Message> = None;
    let mut last_ts: Option<NaiveDateTime> = None;

    for msg in messages {
        let extend = match (&run, last_ts) {
            (Some(current), Some(prev)) => {
                current.sender == msg.sender && (msg.timestamp - prev).abs() <= window
            }
            _ => false,
        };
        last_ts = Some(msg.timestamp);

        if extend {
            if let Some(current) = run.as_mut() {
                current.text = smart_join(&current.text, &msg.text);
            }
        } else if let Some(done) = run.replace(msg) {
            out.push(done);
        }
    }
    out.extend(run);

    if out.len() < input_len {
        tracing::debug!("Merged {} messages into {} utterances", input_len, out.len());
    }
    out
}
