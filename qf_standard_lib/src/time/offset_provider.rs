use chrono::{DateTime, Duration, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::VecDeque;

fn raw_offset(time_zone: &Tz, utc_time: DateTime<Utc>) -> Duration {
    let offset = time_zone.offset_from_utc_datetime(&utc_time.naive_utc());
    Duration::seconds(offset.fix().local_minus_utc() as i64)
}

/// Answers "what is the UTC to local offset at instant t" in amortized O(1)
/// for forward-marching queries. Construction precomputes every zone
/// discontinuity (DST transitions) over the requested range plus two years
/// of slack, queries walk the FIFO forward and never look back.
///
/// Queries must be non-decreasing in UTC, querying backward across a crossed
/// discontinuity is undefined. Queries beyond the initialization end return
/// the offset that was valid at the last known discontinuity. Not thread
/// safe, create one instance per consumer.
pub struct TimeZoneOffsetProvider {
    time_zone: Tz,
    current_offset: Duration,
    next_discontinuity: Option<DateTime<Utc>>,
    discontinuities: VecDeque<DateTime<Utc>>,
}

impl TimeZoneOffsetProvider {
    pub fn new(time_zone: Tz, utc_start: DateTime<Utc>, utc_end: DateTime<Utc>) -> Self {
        let mut discontinuities = find_discontinuities(
            &time_zone,
            utc_start,
            utc_end + Duration::days(2 * 365),
        );
        let next_discontinuity = discontinuities.pop_front();
        let current_offset = match next_discontinuity {
            Some(next) => raw_offset(&time_zone, next - Duration::seconds(1)),
            None => raw_offset(&time_zone, utc_start),
        };
        TimeZoneOffsetProvider {
            time_zone,
            current_offset,
            next_discontinuity,
            discontinuities,
        }
    }

    /// The offset valid at `utc_time`. Advances past any discontinuities the
    /// caller has marched over since the previous query.
    pub fn get_offset(&mut self, utc_time: DateTime<Utc>) -> Duration {
        while let Some(next) = self.next_discontinuity {
            if utc_time < next {
                break;
            }
            let following = self.discontinuities.pop_front();
            self.current_offset = match following {
                Some(following) => raw_offset(&self.time_zone, following - Duration::seconds(1)),
                // Exhausted: the offset in force at the final discontinuity
                // holds for the remainder of the provider's life.
                None => raw_offset(&self.time_zone, next),
            };
            self.next_discontinuity = following;
        }
        self.current_offset
    }

    /// `convert_from_utc(t) = t + get_offset(t)`, the local wall time.
    pub fn convert_from_utc(&mut self, utc_time: DateTime<Utc>) -> NaiveDateTime {
        utc_time.naive_utc() + self.get_offset(utc_time)
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }
}

/// Scans a day at a time and binary-refines each offset change down to the
/// exact second the zone rules switch.
fn find_discontinuities(
    time_zone: &Tz,
    utc_start: DateTime<Utc>,
    utc_end: DateTime<Utc>,
) -> VecDeque<DateTime<Utc>> {
    let mut discontinuities = VecDeque::new();
    let mut cursor = utc_start;
    let mut previous_offset = raw_offset(time_zone, cursor);
    while cursor < utc_end {
        let next_day = cursor + Duration::days(1);
        let offset = raw_offset(time_zone, next_day);
        if offset != previous_offset {
            let mut lo = cursor;
            let mut hi = next_day;
            while hi - lo > Duration::seconds(1) {
                let mid = lo + (hi - lo) / 2;
                if raw_offset(time_zone, mid) == previous_offset {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            discontinuities.push_back(hi);
            previous_offset = offset;
        }
        cursor = next_day;
    }
    discontinuities
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;
    use chrono_tz::Australia::Sydney;
    use chrono_tz::UTC;

    #[test]
    fn spring_forward_observed_at_exact_discontinuity() {
        // New York springs forward 2024-03-10 at 07:00:00 UTC.
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        let mut provider = TimeZoneOffsetProvider::new(New_York, start, end);

        let before = Utc.with_ymd_and_hms(2024, 3, 10, 6, 59, 59).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap();
        assert_eq!(provider.get_offset(before), Duration::hours(-5));
        assert_eq!(provider.get_offset(at), Duration::hours(-4));
    }

    #[test]
    fn fall_back_observed() {
        // New York falls back 2024-11-03 at 06:00:00 UTC.
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        let mut provider = TimeZoneOffsetProvider::new(New_York, start, end);

        let before = Utc.with_ymd_and_hms(2024, 11, 3, 5, 59, 59).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 11, 3, 6, 0, 0).unwrap();
        assert_eq!(provider.get_offset(before), Duration::hours(-4));
        assert_eq!(provider.get_offset(at), Duration::hours(-5));
    }

    #[test]
    fn repeated_queries_are_idempotent() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        let mut provider = TimeZoneOffsetProvider::new(New_York, start, end);
        let t = Utc.with_ymd_and_hms(2024, 7, 4, 12, 0, 0).unwrap();
        let first = provider.get_offset(t);
        let second = provider.get_offset(t);
        assert_eq!(first, second);
        assert_eq!(first, Duration::hours(-4));
    }

    #[test]
    fn convert_from_utc_adds_offset() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        let mut provider = TimeZoneOffsetProvider::new(Sydney, start, end);
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        // Sydney is UTC+11 in January.
        assert_eq!(
            provider.convert_from_utc(t),
            t.naive_utc() + Duration::hours(11)
        );
    }

    #[test]
    fn fixed_zone_has_no_discontinuities() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut provider = TimeZoneOffsetProvider::new(UTC, start, end);
        assert_eq!(provider.get_offset(start), Duration::zero());
        assert_eq!(provider.get_offset(end), Duration::zero());
    }
}
