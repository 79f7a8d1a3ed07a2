use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Returns the fixed offset from UTC for the given zone at the given instant.
/// Since we are dealing with historical data we need to adjust for daylight
/// savings, it is not good enough to use the current offset, the offset must
/// be evaluated at the historical instant itself.
pub fn offset_at(time_zone: &Tz, utc_time: DateTime<Utc>) -> FixedOffset {
    let tz_offset = time_zone.offset_from_utc_datetime(&utc_time.naive_utc());
    FixedOffset::east_opt(tz_offset.fix().local_minus_utc()).unwrap()
}

/// Converts a `DateTime<Utc>` to `DateTime<FixedOffset>` for the given zone,
/// accounting for historical transitions including DST.
pub fn time_convert_utc_to_fixed_offset(
    time_zone: &Tz,
    utc_time: DateTime<Utc>,
) -> DateTime<FixedOffset> {
    let naive_utc = utc_time.naive_utc();
    let zoned = time_zone.from_utc_datetime(&naive_utc);
    let fixed = time_zone.offset_from_utc_datetime(&naive_utc).fix();
    zoned.with_timezone(&fixed)
}

/// Converts a local naive time in the given zone to UTC. Ambiguous local
/// times around a fall-back transition resolve to the earlier instant,
/// non-existent local times in a spring-forward gap shift past the gap.
pub fn time_convert_local_naive_to_utc(time_zone: &Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match time_zone.from_local_datetime(&local) {
        chrono::LocalResult::Single(t) => t.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earlier, _later) => earlier.with_timezone(&Utc),
        chrono::LocalResult::None => {
            let shifted = local + chrono::Duration::hours(1);
            time_zone
                .from_local_datetime(&shifted)
                .earliest()
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&local))
        }
    }
}

/// The calendar date of the instant as seen in the given zone.
pub fn local_date_of(time_zone: &Tz, utc_time: DateTime<Utc>) -> NaiveDate {
    utc_time.with_timezone(time_zone).date_naive()
}

/// Returns the first instant of the next month, 00:00:00 UTC.
pub fn next_month(last_time: &DateTime<Utc>) -> DateTime<Utc> {
    let naive_date = last_time.date_naive();
    let next_month_naive_date = if naive_date.month() == 12 {
        NaiveDate::from_ymd_opt(naive_date.year() + 1, 1, 1).unwrap()
    } else {
        NaiveDate::from_ymd_opt(naive_date.year(), naive_date.month() + 1, 1).unwrap()
    };
    Utc.from_utc_datetime(&next_month_naive_date.and_hms_opt(0, 0, 0).unwrap())
}

/// Normalizes a user supplied ticker the way the data directory is laid out.
pub fn formatted_ticker_name(ticker: &str) -> String {
    ticker
        .replace("/", "-")
        .replace(":", "-")
        .replace("?", "-")
        .replace("_", "-")
        .replace(" ", "-")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    #[test]
    fn offsets_differ_across_dst() {
        // 2024 spring forward in New York: March 10, 07:00 UTC.
        let winter = Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
        assert_eq!(offset_at(&New_York, winter).local_minus_utc(), -5 * 3600);
        assert_eq!(offset_at(&New_York, summer).local_minus_utc(), -4 * 3600);
    }

    #[test]
    fn local_round_trip() {
        let local = NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let utc = time_convert_local_naive_to_utc(&New_York, local);
        assert_eq!(utc.with_timezone(&New_York).naive_local(), local);
    }

    #[test]
    fn next_month_rolls_year() {
        let december = Utc.with_ymd_and_hms(2023, 12, 14, 10, 0, 0).unwrap();
        assert_eq!(
            next_month(&december),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn formats_ticker_names() {
        assert_eq!(formatted_ticker_name("brk.b usd"), "BRK.B-USD");
        assert_eq!(formatted_ticker_name("eur/usd"), "EUR-USD");
    }
}
