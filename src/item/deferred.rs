use time::OffsetDateTime;

/// A task is deferred while its start instant lies strictly in the future.
///
/// Evaluated on every render against a fresh `now`; never cache the result.
pub fn is_deferred(start: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    matches!(start, Some(start) if start > now)
}

#[cfg(test)]
mod tests {
    use super::is_deferred;
    use time::macros::datetime;
    use time::Duration;

    #[test]
    fn absent_start_is_never_deferred() {
        for now in [
            datetime!(1970-01-01 00:00 UTC),
            datetime!(2024-01-01 00:00 UTC),
            datetime!(2999-12-31 23:59 UTC),
        ] {
            assert!(!is_deferred(None, now));
        }
    }

    #[test]
    fn future_start_is_deferred() {
        let now = datetime!(2024-01-01 00:00 UTC);
        assert!(is_deferred(Some(now + Duration::seconds(1)), now));
    }

    #[test]
    fn start_equal_to_now_is_not_deferred() {
        let now = datetime!(2024-01-01 00:00 UTC);
        assert!(!is_deferred(Some(now), now));
        assert!(!is_deferred(Some(now - Duration::days(3)), now));
    }
}
