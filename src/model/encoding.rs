//! Field encodings shared by the patch wire format and the SQLite store.
//!
//! `schedule` and `due` are absolute instants and travel as epoch milliseconds.
//! `start` is stored by the backing store as naive wall-clock text, so its
//! offset is dropped before it is embedded in a patch.

use serde::ser::Error as _;
use serde::Serializer;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

pub fn epoch_millis(instant: OffsetDateTime) -> i64 {
    (instant.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_epoch_millis(millis: i64) -> Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
}

/// Keeps the wall-clock date and time of `instant` and forgets its offset.
pub fn strip_offset(instant: OffsetDateTime) -> PrimitiveDateTime {
    PrimitiveDateTime::new(instant.date(), instant.time())
}

pub fn format_naive(value: PrimitiveDateTime) -> Result<String, time::error::Format> {
    value.format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second]"
    ))
}

pub fn parse_naive(text: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(
        text,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
}

pub(crate) fn serialize_instant_change<S>(
    value: &Option<Option<OffsetDateTime>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(Some(instant)) => serializer.serialize_i64(epoch_millis(*instant)),
        _ => serializer.serialize_none(),
    }
}

pub(crate) fn serialize_naive_change<S>(
    value: &Option<Option<PrimitiveDateTime>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(Some(naive)) => {
            let text = format_naive(*naive).map_err(S::Error::custom)?;
            serializer.serialize_str(&text)
        }
        _ => serializer.serialize_none(),
    }
}
