use crate::helpers::converters::time_convert_local_naive_to_utc;
use crate::standardized_types::market_hours::MarketHours;
use crate::standardized_types::symbols::Symbol;
use ahash::AHashMap;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps a window to the calendar dates an event is eligible to fire on.
pub enum DateRule {
    EveryDay,
    /// Trading days of the given symbol's exchange calendar.
    EveryTradingDay(Symbol),
    WeekStart,
    MonthStart,
}

impl DateRule {
    fn dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        hours_of: &dyn Fn(&Symbol) -> Option<Arc<MarketHours>>,
    ) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut date = start;
        while date <= end {
            let eligible = match self {
                DateRule::EveryDay => true,
                DateRule::EveryTradingDay(symbol) => hours_of(symbol)
                    .map(|hours| hours.is_trading_day(date))
                    .unwrap_or(false),
                DateRule::WeekStart => date.weekday() == Weekday::Mon,
                DateRule::MonthStart => date.day() == 1,
            };
            if eligible {
                dates.push(date);
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        dates
    }
}

/// Maps one eligible date to the UTC instants the event fires at.
pub enum TimeRule {
    /// A wall time in the given zone.
    At(NaiveTime, Tz),
    /// Minutes after the symbol's regular market open.
    AfterMarketOpen(Symbol, i64),
    /// Minutes before the symbol's regular market close.
    BeforeMarketClose(Symbol, i64),
    /// Repeats through the day at the given interval starting from midnight
    /// in the given zone.
    Every(Duration, Tz),
}

impl TimeRule {
    fn times(
        &self,
        date: NaiveDate,
        hours_of: &dyn Fn(&Symbol) -> Option<Arc<MarketHours>>,
    ) -> Vec<DateTime<Utc>> {
        match self {
            TimeRule::At(time, tz) => {
                vec![time_convert_local_naive_to_utc(tz, date.and_time(*time))]
            }
            TimeRule::AfterMarketOpen(symbol, minutes) => hours_of(symbol)
                .and_then(|hours| hours.market_open_utc(date, false))
                .map(|open| vec![open + Duration::minutes(*minutes)])
                .unwrap_or_default(),
            TimeRule::BeforeMarketClose(symbol, minutes) => hours_of(symbol)
                .and_then(|hours| hours.market_close_utc(date))
                .map(|close| vec![close - Duration::minutes(*minutes)])
                .unwrap_or_default(),
            TimeRule::Every(interval, tz) => {
                let mut times = Vec::new();
                let midnight = time_convert_local_naive_to_utc(tz, date.and_hms_opt(0, 0, 0).unwrap());
                let mut cursor = midnight;
                let day_end = midnight + Duration::days(1);
                while cursor < day_end {
                    times.push(cursor);
                    cursor += *interval;
                }
                times
            }
        }
    }
}

/// A named scheduled event: fire on dates the date rule selects, at instants
/// the time rule derives.
pub struct TimedEvent {
    pub name: String,
    pub date_rule: DateRule,
    pub time_rule: TimeRule,
}

impl TimedEvent {
    pub fn new(name: &str, date_rule: DateRule, time_rule: TimeRule) -> Self {
        TimedEvent {
            name: name.to_string(),
            date_rule,
            time_rule,
        }
    }
}

/// Evaluates date and time rules against the feed's frontier. Events expand
/// into a sorted `(utc_fire_time, insertion_id)` queue at initialization,
/// each slice the engine drains everything due. Ties at one instant fire in
/// insertion order.
pub struct TimedEventHandler {
    queue: BTreeMap<(DateTime<Utc>, u64), String>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    next_insertion_id: u64,
    /// Consecutive failures per event name, the engine aborts an event's
    /// algorithm after the configured limit.
    failures: AHashMap<String, u8>,
}

impl TimedEventHandler {
    pub fn new(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        TimedEventHandler {
            queue: BTreeMap::new(),
            window_start,
            window_end,
            next_insertion_id: 0,
            failures: AHashMap::new(),
        }
    }

    /// Expands the event over the backtest window and merges its fire times
    /// into the queue. Instants before the window start are discarded.
    pub fn schedule(
        &mut self,
        event: TimedEvent,
        hours_of: &dyn Fn(&Symbol) -> Option<Arc<MarketHours>>,
    ) {
        let start_date = self.window_start.date_naive().pred_opt().unwrap_or(self.window_start.date_naive());
        let end_date = self.window_end.date_naive().succ_opt().unwrap_or(self.window_end.date_naive());
        for date in event.date_rule.dates(start_date, end_date, hours_of) {
            for fire_time in event.time_rule.times(date, hours_of) {
                if fire_time < self.window_start || fire_time > self.window_end {
                    continue;
                }
                let id = self.next_insertion_id;
                self.next_insertion_id += 1;
                self.queue.insert((fire_time, id), event.name.clone());
            }
        }
    }

    /// Removes every pending firing of the named event. Idempotent.
    pub fn cancel(&mut self, name: &str) {
        self.queue.retain(|_, event_name| event_name != name);
        self.failures.remove(name);
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Pops everything with `fire_time <= frontier`, FIFO by (time,
    /// insertion id). Called before the algorithm's data handler for the
    /// slice at `frontier`.
    pub fn drain_due(&mut self, frontier: DateTime<Utc>) -> Vec<(DateTime<Utc>, String)> {
        let mut due = Vec::new();
        while let Some((&(fire_time, id), _)) = self.queue.iter().next() {
            if fire_time > frontier {
                break;
            }
            if let Some(name) = self.queue.remove(&(fire_time, id)) {
                due.push((fire_time, name));
            }
        }
        due
    }

    /// Tracks one callback failure, returning the consecutive count.
    pub fn record_failure(&mut self, name: &str) -> u8 {
        let count = self.failures.entry(name.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn record_success(&mut self, name: &str) {
        self.failures.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standardized_types::enums::SecurityType;
    use crate::standardized_types::market_hours::MarketHoursDatabase;
    use crate::standardized_types::symbols::SecurityIdentifier;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn symbol() -> Symbol {
        Symbol::new(SecurityIdentifier::generate_equity("AAPL", 1), "AAPL".to_string())
    }

    fn hours_of() -> impl Fn(&Symbol) -> Option<Arc<MarketHours>> {
        let db = MarketHoursDatabase::new();
        move |symbol: &Symbol| db.get("usa", SecurityType::Equity, Some(&symbol.ticker))
    }

    #[test]
    fn daily_noon_events_expand_sorted() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 6, 23, 59, 59).unwrap();
        let mut handler = TimedEventHandler::new(start, end);
        let hours = hours_of();
        handler.schedule(
            TimedEvent::new(
                "noon",
                DateRule::EveryDay,
                TimeRule::At(NaiveTime::from_hms_opt(12, 0, 0).unwrap(), New_York),
            ),
            &hours,
        );
        assert_eq!(handler.pending_count(), 3);

        let first_noon = New_York.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap().to_utc();
        let due = handler.drain_due(first_noon);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0], (first_noon, "noon".to_string()));
        assert_eq!(handler.pending_count(), 2);
        // Draining at the same frontier again yields nothing.
        assert!(handler.drain_due(first_noon).is_empty());
    }

    #[test]
    fn trading_day_rule_skips_weekends() {
        // Friday March 1 through Monday March 4.
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 4, 23, 59, 59).unwrap();
        let mut handler = TimedEventHandler::new(start, end);
        let hours = hours_of();
        handler.schedule(
            TimedEvent::new(
                "after-open",
                DateRule::EveryTradingDay(symbol()),
                TimeRule::AfterMarketOpen(symbol(), 30),
            ),
            &hours,
        );
        // Friday and Monday only.
        assert_eq!(handler.pending_count(), 2);
        let friday_open_30 = New_York.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap().to_utc();
        let due = handler.drain_due(friday_open_30);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, friday_open_30);
    }

    #[test]
    fn ties_fire_in_insertion_order() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 4, 23, 59, 59).unwrap();
        let mut handler = TimedEventHandler::new(start, end);
        let hours = hours_of();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        handler.schedule(
            TimedEvent::new("first", DateRule::EveryDay, TimeRule::At(noon, New_York)),
            &hours,
        );
        handler.schedule(
            TimedEvent::new("second", DateRule::EveryDay, TimeRule::At(noon, New_York)),
            &hours,
        );
        let frontier = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let due = handler.drain_due(frontier);
        let names: Vec<&str> = due.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn cancellation_is_idempotent() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 8, 23, 59, 59).unwrap();
        let mut handler = TimedEventHandler::new(start, end);
        let hours = hours_of();
        handler.schedule(
            TimedEvent::new(
                "doomed",
                DateRule::EveryDay,
                TimeRule::At(NaiveTime::from_hms_opt(9, 0, 0).unwrap(), New_York),
            ),
            &hours,
        );
        assert!(handler.pending_count() > 0);
        handler.cancel("doomed");
        assert_eq!(handler.pending_count(), 0);
        handler.cancel("doomed");
        assert_eq!(handler.pending_count(), 0);
    }

    #[test]
    fn failure_counting_resets_on_success() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let mut handler = TimedEventHandler::new(start, start + Duration::days(1));
        assert_eq!(handler.record_failure("cb"), 1);
        assert_eq!(handler.record_failure("cb"), 2);
        handler.record_success("cb");
        assert_eq!(handler.record_failure("cb"), 1);
    }

    #[test]
    fn identical_rules_produce_identical_sequences() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 8, 23, 59, 59).unwrap();
        let hours = hours_of();
        let build = || {
            let mut handler = TimedEventHandler::new(start, end);
            handler.schedule(
                TimedEvent::new(
                    "close-check",
                    DateRule::EveryTradingDay(symbol()),
                    TimeRule::BeforeMarketClose(symbol(), 15),
                ),
                &hours,
            );
            handler.drain_due(end)
        };
        assert_eq!(build(), build());
    }
}
