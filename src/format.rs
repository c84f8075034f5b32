use anyhow::{bail, Context, Result};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, Time};

pub const DEFAULT_DATE_PATTERN: &str = "[month repr:short] [day padding:none], [year]";

/// Human distance between `instant` and `now`, e.g. "3h ago" or "in 2d".
pub fn relative(instant: OffsetDateTime, now: OffsetDateTime) -> String {
    let diff = now - instant;
    let future = diff.is_negative();
    let magnitude = diff.abs();
    if magnitude < Duration::seconds(45) {
        return "just now".to_string();
    }
    let amount = if magnitude < Duration::minutes(90) {
        format!("{}m", magnitude.whole_minutes().max(1))
    } else if magnitude < Duration::hours(36) {
        format!("{}h", magnitude.whole_hours().max(1))
    } else if magnitude < Duration::days(10) {
        format!("{}d", magnitude.whole_days().max(1))
    } else {
        return instant.date().to_string();
    };
    if future {
        format!("in {amount}")
    } else {
        format!("{amount} ago")
    }
}

/// Formats with a `time` format description, falling back to RFC 3339 when
/// the pattern does not parse.
pub fn pattern(instant: OffsetDateTime, pattern: &str) -> String {
    let formatted = time::format_description::parse(pattern)
        .ok()
        .and_then(|items| instant.format(&items).ok());
    match formatted {
        Some(text) => text,
        None => {
            tracing::trace!(pattern, "date pattern rejected, using RFC 3339");
            instant
                .format(&Rfc3339)
                .unwrap_or_else(|_| instant.unix_timestamp().to_string())
        }
    }
}

pub fn parse_instant(text: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(text.trim(), &Rfc3339)
        .with_context(|| format!("parsing '{text}' as an RFC 3339 instant"))
}

/// Reads date picker input relative to `now`. Blank input clears the date.
/// Accepts `today`, `tomorrow`, offsets like `+3d`, `+4h` or `+30m`, a
/// calendar date (`2024-05-02`, taken as midnight in `now`'s offset) or an
/// RFC 3339 instant.
pub fn parse_input(text: &str, now: OffsetDateTime) -> Result<Option<OffsetDateTime>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let midnight = now.replace_time(Time::MIDNIGHT);
    match text.to_ascii_lowercase().as_str() {
        "today" => return Ok(Some(midnight)),
        "tomorrow" => return shift(midnight, Duration::DAY).map(Some),
        _ => {}
    }
    if let Some(offset) = text.strip_prefix('+') {
        return shift(now, parse_offset(offset)?).map(Some);
    }
    if let Ok(date) = Date::parse(text, format_description!("[year]-[month]-[day]")) {
        return Ok(Some(midnight.replace_date(date)));
    }
    parse_instant(text).map(Some)
}

fn parse_offset(text: &str) -> Result<Duration> {
    let Some((split, _)) = text.char_indices().last() else {
        bail!("offset cannot be empty");
    };
    let (amount, unit) = text.split_at(split);
    let amount: i64 = amount
        .parse()
        .with_context(|| format!("reading '+{text}' as an offset"))?;
    let unit_seconds: i64 = match unit {
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        _ => bail!("unknown offset unit in '+{text}', expected m, h, d or w"),
    };
    amount
        .checked_mul(unit_seconds)
        .map(Duration::seconds)
        .with_context(|| format!("offset '+{text}' out of range"))
}

fn shift(instant: OffsetDateTime, offset: Duration) -> Result<OffsetDateTime> {
    instant
        .checked_add(offset)
        .context("offset out of range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn relative_covers_past_and_future() {
        let now = datetime!(2024-01-10 12:00 UTC);
        assert_eq!(relative(now - Duration::seconds(10), now), "just now");
        assert_eq!(relative(now + Duration::seconds(10), now), "just now");
        assert_eq!(relative(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(relative(now + Duration::minutes(5), now), "in 5m");
        assert_eq!(relative(now - Duration::hours(3), now), "3h ago");
        assert_eq!(relative(now + Duration::days(2), now), "in 2d");
    }

    #[test]
    fn relative_falls_back_to_calendar_date() {
        let now = datetime!(2024-01-30 12:00 UTC);
        assert_eq!(relative(datetime!(2024-01-01 08:00 UTC), now), "2024-01-01");
    }

    #[test]
    fn pattern_uses_description_or_rfc3339() {
        let at = datetime!(2024-03-05 14:00 UTC);
        assert_eq!(pattern(at, DEFAULT_DATE_PATTERN), "Mar 5, 2024");
        assert_eq!(pattern(at, "[year"), "2024-03-05T14:00:00Z");
    }

    #[test]
    fn parse_instant_accepts_rfc3339() -> anyhow::Result<()> {
        assert_eq!(
            parse_instant(" 2024-01-01T00:00:00Z ")?,
            datetime!(2024-01-01 00:00 UTC)
        );
        assert!(parse_instant("tomorrow").is_err());
        Ok(())
    }

    #[test]
    fn parse_input_accepts_shortcuts() -> anyhow::Result<()> {
        let now = datetime!(2024-01-10 15:30 +01:00);
        assert_eq!(parse_input("  ", now)?, None);
        assert_eq!(parse_input("today", now)?, Some(datetime!(2024-01-10 00:00 +01:00)));
        assert_eq!(parse_input("Tomorrow", now)?, Some(datetime!(2024-01-11 00:00 +01:00)));
        assert_eq!(parse_input("+3d", now)?, Some(datetime!(2024-01-13 15:30 +01:00)));
        assert_eq!(parse_input("+90m", now)?, Some(datetime!(2024-01-10 17:00 +01:00)));
        assert_eq!(parse_input("2024-05-02", now)?, Some(datetime!(2024-05-02 00:00 +01:00)));
        assert_eq!(
            parse_input("2024-05-02T09:00:00Z", now)?,
            Some(datetime!(2024-05-02 09:00 UTC))
        );
        assert!(parse_input("+3y", now).is_err());
        assert!(parse_input("+d", now).is_err());
        assert!(parse_input("someday", now).is_err());
        assert!(parse_input("+99999999d", now).is_err());
        assert!(parse_input("+999999999999999d", now).is_err());
        assert!(parse_input("+9223372036854775807w", now).is_err());
        Ok(())
    }
}
