use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

const NANOS_PER_MILLI: i128 = 1_000_000;

/// 9999-12-31T23:59:59Z, the last instant both SQLite `INTEGER` millis and RFC3339 can hold.
pub const MAX_EPOCH_SECONDS: i64 = 253_402_300_799;

#[must_use]
pub fn unix_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}

pub fn now_utc_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("failed to format current timestamp as RFC3339")
}

/// Webhook timestamps are integer epoch seconds, usually sent as strings.
pub fn epoch_seconds_to_unix_ms(raw: &str) -> Result<u64> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        bail!("timestamp input is empty");
    }

    let seconds = candidate
        .parse::<i64>()
        .map_err(|_| anyhow!("timestamp is not integer epoch seconds: {candidate}"))?;
    if seconds < 0 {
        bail!("negative epoch values are not supported");
    }
    if seconds > MAX_EPOCH_SECONDS {
        bail!("epoch seconds {seconds} is past the year 9999");
    }

    (seconds as u64)
        .checked_mul(1_000)
        .ok_or_else(|| anyhow!("epoch conversion overflow"))
}

#[must_use]
pub fn format_unix_ms(timestamp_unix_ms: u64) -> String {
    let nanos = i128::from(timestamp_unix_ms)
        .checked_mul(NANOS_PER_MILLI)
        .unwrap_or(i128::MAX);
    let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.millisecond()
    )
}
