//! Message key derivation.
//!
//! Every published message is keyed by the binary encoding of its entry's
//! timestamp. Timestamps whose zone offset cannot be encoded fall back to the
//! textual level name instead.

use crate::record::LogEntry;
use chrono::{DateTime, FixedOffset};

const VERSION_MINUTES: u8 = 1;
const VERSION_SECONDS: u8 = 2;

/// Seconds between 0001-01-01T00:00:00Z and the Unix epoch.
const UNIX_TO_ABSOLUTE: i64 = 62_135_596_800;

/// Offset-minutes value reserved for UTC.
const UTC_OFFSET_MINUTES: i16 = -1;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeEncodeError {
    #[error("unexpected zone offset: {0}s")]
    UnexpectedZoneOffset(i32),
}

/// Encode a timestamp as 15 bytes (16 for offsets with a sub-minute part).
///
/// Layout: version, seconds since year 1 (`u64` BE), nanoseconds (`i32` BE),
/// offset in minutes (`i16` BE, `-1` for UTC) and, for version 2, the
/// remaining offset seconds as one signed byte.
pub fn encode_time(time: &DateTime<FixedOffset>) -> Result<Vec<u8>, TimeEncodeError> {
    let offset = time.offset().local_minus_utc();

    let mut version = VERSION_MINUTES;
    let mut offset_seconds = 0i8;
    let offset_minutes = if offset == 0 {
        UTC_OFFSET_MINUTES
    } else {
        if offset % 60 != 0 {
            version = VERSION_SECONDS;
            offset_seconds = (offset % 60) as i8;
        }
        let minutes = offset / 60;
        if minutes == i32::from(UTC_OFFSET_MINUTES)
            || minutes < i32::from(i16::MIN)
            || minutes > i32::from(i16::MAX)
        {
            return Err(TimeEncodeError::UnexpectedZoneOffset(offset));
        }
        minutes as i16
    };

    let seconds = time.timestamp().wrapping_add(UNIX_TO_ABSOLUTE) as u64;
    let nanos = time.timestamp_subsec_nanos() as i32;

    let mut out = Vec::with_capacity(16);
    out.push(version);
    out.extend_from_slice(&seconds.to_be_bytes());
    out.extend_from_slice(&nanos.to_be_bytes());
    out.extend_from_slice(&offset_minutes.to_be_bytes());
    if version == VERSION_SECONDS {
        out.push(offset_seconds as u8);
    }
    Ok(out)
}

/// Key attached to a published message, remembering which derivation was used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKey {
    /// Binary-encoded entry timestamp.
    Time(Vec<u8>),
    /// Level name, used when the timestamp could not be encoded.
    Level(&'static str),
}

impl MessageKey {
    pub fn for_entry(entry: &LogEntry) -> Self {
        match encode_time(&entry.time) {
            Ok(bytes) => MessageKey::Time(bytes),
            Err(_) => MessageKey::Level(entry.level.as_str()),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            MessageKey::Time(bytes) => bytes,
            MessageKey::Level(name) => name.as_bytes().to_vec(),
        }
    }
}
