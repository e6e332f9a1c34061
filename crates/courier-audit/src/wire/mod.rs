//! Chunked binary frame format for audit records.
//!
//! A stream is a sequence of frames. Each frame starts with the
//! `BeginMessage` marker, continues with tagged chunks in any order and ends
//! with the `EndMessage` marker:
//!
//! ```text
//! 0x10                          BeginMessage (no length, no body)
//! [tag:1][length:4 LE][body]    chunk, repeated
//! 0x50                          EndMessage (no length, no body)
//! ```
//!
//! | Tag | Chunk | Body |
//! |-----|-------|------|
//! | `0x11` | Id | 16-byte GUID, Microsoft field order |
//! | `0x12` | Type | 1 byte, [`MessageKind`](courier_core::MessageKind) |
//! | `0x13` | ContentType | UTF-8 |
//! | `0x15` | Content | serializer bytes |
//! | `0x16` | Data | serializer bytes |
//! | `0x17` | CreatedAt | i64 LE, 100 ns ticks since 0001-01-01 UTC |
//! | `0x18` | ExecutionDuration | i32 LE, milliseconds |
//! | `0x19` | Status | 1 byte, [`ProcessingStatus`](courier_core::ProcessingStatus) |
//! | `0x21` | ErrorDetails | serializer bytes, only when an error exists |
//! | `0x22` | ErrorMessage | UTF-8 |
//! | `0x23` | ErrorType | UTF-8 |

mod reader;
mod writer;

pub use reader::MessageRecordReader;
pub use writer::{encode_frame, MessageRecordWriter};

use chrono::{DateTime, Utc};

/// Chunk tags.
pub mod tag {
    /// Starts a frame.
    pub const BEGIN_MESSAGE: u8 = 0x10;
    /// Message identifier.
    pub const ID: u8 = 0x11;
    /// Message kind.
    pub const TYPE: u8 = 0x12;
    /// Content-type name.
    pub const CONTENT_TYPE: u8 = 0x13;
    /// Serialized payload.
    pub const CONTENT: u8 = 0x15;
    /// Serialized side-channel data.
    pub const DATA: u8 = 0x16;
    /// Creation time in ticks.
    pub const CREATED_AT: u8 = 0x17;
    /// Execution time in milliseconds.
    pub const EXECUTION_DURATION: u8 = 0x18;
    /// Processing status.
    pub const STATUS: u8 = 0x19;
    /// Serialized error description.
    pub const ERROR_DETAILS: u8 = 0x21;
    /// Error message text.
    pub const ERROR_MESSAGE: u8 = 0x22;
    /// Error type name.
    pub const ERROR_TYPE: u8 = 0x23;
    /// Ends a frame.
    pub const END_MESSAGE: u8 = 0x50;
}

/// Ticks per second (one tick is 100 ns).
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Seconds between 0001-01-01 and 1970-01-01.
const EPOCH_OFFSET_SECONDS: i64 = 62_135_596_800;

/// Converts a timestamp to ticks since 0001-01-01 UTC.
///
/// Returns `None` for timestamps whose tick count does not fit an `i64`.
#[must_use]
pub fn ticks_from_datetime(at: DateTime<Utc>) -> Option<i64> {
    at.timestamp()
        .checked_add(EPOCH_OFFSET_SECONDS)?
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(i64::from(at.timestamp_subsec_nanos() / 100))
}

/// Converts ticks since 0001-01-01 UTC to a timestamp.
///
/// Returns `None` for tick counts outside the representable range.
#[must_use]
pub fn datetime_from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    let seconds = ticks.div_euclid(TICKS_PER_SECOND) - EPOCH_OFFSET_SECONDS;
    let nanos = u32::try_from(ticks.rem_euclid(TICKS_PER_SECOND) * 100).ok()?;
    DateTime::from_timestamp(seconds, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unix_epoch_ticks() {
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(ticks_from_datetime(epoch), Some(621_355_968_000_000_000));
    }

    #[test]
    fn test_ticks_keep_sub_second_precision() {
        let at = DateTime::from_timestamp(1_700_000_000, 123_456_700).unwrap();
        let ticks = ticks_from_datetime(at).unwrap();
        assert_eq!(ticks % TICKS_PER_SECOND, 1_234_567);
        assert_eq!(datetime_from_ticks(ticks), Some(at));
    }

    #[test]
    fn test_out_of_range_timestamps_have_no_ticks() {
        assert_eq!(ticks_from_datetime(DateTime::<Utc>::MAX_UTC), None);
        assert_eq!(ticks_from_datetime(DateTime::<Utc>::MIN_UTC), None);

        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        assert!(ticks_from_datetime(last).is_some());
    }

    #[test]
    fn test_first_tick() {
        let origin = datetime_from_ticks(0).unwrap();
        assert_eq!(origin, Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap());
    }
}
