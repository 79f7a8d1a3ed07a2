use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicI64, Ordering};

/// The simulated clock the whole pipeline synchronizes on. In backtests the
/// engine advances it to each slice's time, in live mode it tracks wall time.
/// Lock free, any component may read it, only the engine loop writes it.
pub struct EngineClock {
    timestamp_nanos: AtomicI64,
}

impl EngineClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        EngineClock {
            timestamp_nanos: AtomicI64::new(start.timestamp_nanos_opt().unwrap_or(0)),
        }
    }

    #[inline(always)]
    pub fn set_time(&self, time: DateTime<Utc>) {
        let nanos = time.timestamp_nanos_opt().unwrap_or(i64::MAX);
        self.timestamp_nanos.store(nanos, Ordering::Release);
    }

    #[inline(always)]
    pub fn time_utc(&self) -> DateTime<Utc> {
        let nanos = self.timestamp_nanos.load(Ordering::Acquire);
        Utc.timestamp_nanos(nanos)
    }

    pub fn time_in(&self, time_zone: &Tz) -> DateTime<Tz> {
        self.time_utc().with_timezone(time_zone)
    }

    pub fn advance(&self, duration: Duration) {
        self.timestamp_nanos
            .fetch_add(duration.num_nanoseconds().unwrap_or(0), Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    #[test]
    fn set_and_read() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        let clock = EngineClock::new(start);
        assert_eq!(clock.time_utc(), start);
        let later = start + Duration::minutes(5);
        clock.set_time(later);
        assert_eq!(clock.time_utc(), later);
    }

    #[test]
    fn advance_adds() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        let clock = EngineClock::new(start);
        clock.advance(Duration::seconds(30));
        assert_eq!(clock.time_utc(), start + Duration::seconds(30));
    }

    #[test]
    fn local_view_applies_zone() {
        let start = Utc.with_ymd_and_hms(2024, 7, 1, 14, 30, 0).unwrap();
        let clock = EngineClock::new(start);
        let local = clock.time_in(&New_York);
        assert_eq!(local.naive_local(), start.naive_utc() - Duration::hours(4));
    }
}
