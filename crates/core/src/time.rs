//! Utility module for working with timestamps and getting the current time.

//re-export time::Error since we use it, so other libraries can implement From<time::Error>
pub use time::Error;
use time::OffsetDateTime;

/// Returns a formatted [String] with the current time, for log lines.
///
/// Note that this may be the local time, or may be based off UTC if no local
/// offset can be determined.
#[must_use]
#[inline]
pub fn current_time() -> String {
    let time = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    format_datetime(&time)
}

/// Returns the current UTC time as `YYYY-MM-DD HH:MM:SS`, used when stamping
/// generated build descriptions.
#[must_use]
#[inline]
pub fn utc_timestamp() -> String {
    format_datetime(&OffsetDateTime::now_utc())
}

#[inline]
fn format_datetime(time: &OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        time.year(),
        time.month() as u8,
        time.day(),
        time.hour(),
        time.minute(),
        time.second()
    )
}
