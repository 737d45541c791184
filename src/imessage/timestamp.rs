//! Timestamp conversion for the Messages store.
//!
//! The `date` column counts nanoseconds since 2001-01-01T00:00:00 UTC
//! (the Cocoa reference date), not the Unix epoch. Values are not
//! validated: negative or far-future inputs convert like any other.

use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeDelta, TimeZone, Utc};

/// Seconds between 1970-01-01 and 2001-01-01 (UTC).
pub const MAC_EPOCH_OFFSET_SECS: i64 = 978_307_200;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// The reference instant, 2001-01-01T00:00:00 UTC.
pub fn mac_epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + TimeDelta::seconds(MAC_EPOCH_OFFSET_SECS)
}

/// Convert a raw store timestamp to local calendar time.
pub fn to_calendar_time(raw: i64) -> NaiveDateTime {
    let utc = mac_epoch() + TimeDelta::nanoseconds(raw);
    utc.with_timezone(&Local).naive_local()
}

/// Convert local calendar time to a raw store timestamp.
///
/// A local time that falls into a DST gap has no UTC instant; it is read
/// as UTC instead of being rejected. Results beyond the `i64` nanosecond
/// range saturate.
pub fn to_raw(t: NaiveDateTime) -> i64 {
    utc_to_raw(earliest_or_utc(Local.from_local_datetime(&t), t))
}

/// Pick the earlier instant of an ambiguous local time; a nonexistent one
/// is read as UTC.
fn earliest_or_utc<Tz: TimeZone>(
    local: LocalResult<DateTime<Tz>>,
    t: NaiveDateTime,
) -> DateTime<Utc> {
    match local.earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => {
            tracing::debug!("{} does not exist in the local zone, reading as UTC", t);
            Utc.from_utc_datetime(&t)
        }
    }
}

/// Elapsed nanoseconds between the reference instant and `utc`.
pub fn utc_to_raw(utc: DateTime<Utc>) -> i64 {
    let delta = utc - mac_epoch();
    delta.num_nanoseconds().unwrap_or_else(|| {
        if delta < TimeDelta::zero() {
            i64::MIN
        } else {
            i64::MAX
        }
    })
}
