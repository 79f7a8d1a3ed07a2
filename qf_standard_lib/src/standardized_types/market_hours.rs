use crate::helpers::converters::time_convert_local_naive_to_utc;
use crate::standardized_types::enums::SecurityType;
use crate::standardized_types::new_types::MarketName;
use crate::standardized_types::resolution::Resolution;
use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use dashmap::DashMap;
use std::sync::Arc;

/// One weekday's sessions in exchange-local time. The extended bounds widen
/// the regular session for pre and post market trading. A close earlier than
/// the open denotes an overnight session that spills into the next day.
#[derive(Debug, Clone, Default)]
pub struct DaySession {
    pub open: Option<NaiveTime>,
    pub close: Option<NaiveTime>,
    pub extended_open: Option<NaiveTime>,
    pub extended_close: Option<NaiveTime>,
}

impl DaySession {
    pub fn closed() -> Self {
        DaySession::default()
    }

    pub fn regular(open: NaiveTime, close: NaiveTime) -> Self {
        DaySession {
            open: Some(open),
            close: Some(close),
            extended_open: None,
            extended_close: None,
        }
    }

    pub fn with_extended(mut self, open: NaiveTime, close: NaiveTime) -> Self {
        self.extended_open = Some(open);
        self.extended_close = Some(close);
        self
    }

    pub fn is_trading_time(&self, time: NaiveTime, extended: bool) -> bool {
        let open = if extended {
            self.extended_open.or(self.open)
        } else {
            self.open
        };
        let close = if extended {
            self.extended_close.or(self.close)
        } else {
            self.close
        };
        match (open, close) {
            (Some(open), Some(close)) if close > open => time >= open && time < close,
            (Some(open), Some(close)) => time >= open || time < close, // Overnight session
            (Some(open), None) => time >= open,
            (None, Some(close)) => time < close,
            (None, None) => false,
        }
    }

    pub fn has_session(&self) -> bool {
        self.open.is_some() || self.close.is_some()
    }
}

/// Tradeable hours for one instrument class on one market: weekly schedule,
/// holidays and early closes, plus the exchange and data time zones used to
/// interpret on-disk timestamps and session bounds.
#[derive(Debug, Clone)]
pub struct MarketHours {
    pub exchange_time_zone: Tz,
    pub data_time_zone: Tz,
    pub sunday: DaySession,
    pub monday: DaySession,
    pub tuesday: DaySession,
    pub wednesday: DaySession,
    pub thursday: DaySession,
    pub friday: DaySession,
    pub saturday: DaySession,
    pub holidays: AHashSet<NaiveDate>,
    pub early_closes: AHashMap<NaiveDate, NaiveTime>,
}

impl MarketHours {
    pub fn session_for(&self, weekday: Weekday) -> &DaySession {
        match weekday {
            Weekday::Sun => &self.sunday,
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !self.is_holiday(date) && self.session_for(date.weekday()).has_session()
    }

    /// Whether the market is open at the UTC instant, after converting to
    /// exchange-local time and applying holidays and early closes.
    pub fn is_open(&self, utc_time: DateTime<Utc>, extended: bool) -> bool {
        let local = utc_time.with_timezone(&self.exchange_time_zone);
        let date = local.date_naive();
        if self.is_holiday(date) {
            return false;
        }
        let time = local.time();
        if let Some(early_close) = self.early_closes.get(&date) {
            if time >= *early_close {
                return false;
            }
        }
        self.session_for(date.weekday()).is_trading_time(time, extended)
    }

    /// The regular close of the session trading on the given local date, in
    /// UTC. Overnight sessions close on the following calendar day. Early
    /// closes override the weekly schedule.
    pub fn market_close_utc(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        if self.is_holiday(date) {
            return None;
        }
        let session = self.session_for(date.weekday());
        let close = self.early_closes.get(&date).copied().or(session.close)?;
        let close_date = match (session.open, session.close) {
            (Some(open), Some(session_close)) if session_close <= open => {
                // Overnight session, the close lands on the next day.
                date.succ_opt()?
            }
            _ => date,
        };
        Some(time_convert_local_naive_to_utc(
            &self.exchange_time_zone,
            NaiveDateTime::new(close_date, close),
        ))
    }

    /// The regular open of the session on the given local date, in UTC.
    pub fn market_open_utc(&self, date: NaiveDate, extended: bool) -> Option<DateTime<Utc>> {
        if self.is_holiday(date) {
            return None;
        }
        let session = self.session_for(date.weekday());
        let open = if extended {
            session.extended_open.or(session.open)?
        } else {
            session.open?
        };
        Some(time_convert_local_naive_to_utc(
            &self.exchange_time_zone,
            NaiveDateTime::new(date, open),
        ))
    }

    /// The first regular session open strictly after the UTC instant.
    pub fn next_market_open(&self, after_utc: DateTime<Utc>, extended: bool) -> Option<DateTime<Utc>> {
        let mut date = after_utc.with_timezone(&self.exchange_time_zone).date_naive();
        for _ in 0..30 {
            if let Some(open) = self.market_open_utc(date, extended) {
                if open > after_utc {
                    return Some(open);
                }
            }
            date = date.succ_opt()?;
        }
        None
    }

    /// The first regular session close strictly after the UTC instant.
    pub fn next_market_close(&self, after_utc: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut date = after_utc.with_timezone(&self.exchange_time_zone).date_naive();
        // The close for an overnight session opening yesterday may still lie ahead.
        if let Some(prev) = date.pred_opt() {
            if let Some(close) = self.market_close_utc(prev) {
                if close > after_utc {
                    return Some(close);
                }
            }
        }
        for _ in 0..30 {
            if let Some(close) = self.market_close_utc(date) {
                if close > after_utc {
                    return Some(close);
                }
            }
            date = date.succ_opt()?;
        }
        None
    }

    /// The next bar end time on the exchange's tradeable cadence, strictly
    /// after the given instant. This is the cadence fill-forward bars are
    /// generated on, not wall-clock seconds. Daily bars end at the close.
    pub fn next_bar_end(
        &self,
        after_utc: DateTime<Utc>,
        resolution: Resolution,
        extended: bool,
    ) -> Option<DateTime<Utc>> {
        if resolution == Resolution::Daily {
            let mut date = after_utc.with_timezone(&self.exchange_time_zone).date_naive();
            for _ in 0..30 {
                if let Some(close) = self.market_close_utc(date) {
                    if close > after_utc {
                        return Some(close);
                    }
                }
                date = date.succ_opt()?;
            }
            return None;
        }

        let step = resolution.as_duration();
        if step <= Duration::zero() {
            return None;
        }
        // Align to the resolution grid, then walk until a bar whose open
        // falls inside a tradeable window.
        let step_nanos = step.num_nanoseconds()?;
        let after_nanos = after_utc.timestamp_nanos_opt()?;
        let mut candidate_nanos = (after_nanos / step_nanos) * step_nanos + step_nanos;
        // Bounded walk: ten days of the finest supported cadence.
        let limit = Duration::days(10).num_nanoseconds()? / step_nanos;
        for _ in 0..limit {
            let end = DateTime::<Utc>::from_timestamp_nanos(candidate_nanos);
            let open = end - step;
            if self.is_open(open, extended) {
                return Some(end);
            }
            candidate_nanos += step_nanos;
        }
        None
    }

    pub fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut date = start;
        while date <= end {
            if self.is_trading_day(date) {
                days.push(date);
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        days
    }
}

fn us_equity_hours() -> MarketHours {
    let open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let close = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
    let pre = NaiveTime::from_hms_opt(4, 0, 0).unwrap();
    let post = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
    let day = DaySession::regular(open, close).with_extended(pre, post);
    let holidays: AHashSet<NaiveDate> = [
        (2024, 1, 1),
        (2024, 1, 15),
        (2024, 2, 19),
        (2024, 3, 29),
        (2024, 5, 27),
        (2024, 6, 19),
        (2024, 7, 4),
        (2024, 9, 2),
        (2024, 11, 28),
        (2024, 12, 25),
    ]
    .iter()
    .map(|(y, m, d)| NaiveDate::from_ymd_opt(*y, *m, *d).unwrap())
    .collect();
    let early_closes: AHashMap<NaiveDate, NaiveTime> = [
        (2024, 7, 3),
        (2024, 11, 29),
        (2024, 12, 24),
    ]
    .iter()
    .map(|(y, m, d)| {
        (
            NaiveDate::from_ymd_opt(*y, *m, *d).unwrap(),
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        )
    })
    .collect();
    MarketHours {
        exchange_time_zone: chrono_tz::America::New_York,
        data_time_zone: chrono_tz::America::New_York,
        sunday: DaySession::closed(),
        monday: day.clone(),
        tuesday: day.clone(),
        wednesday: day.clone(),
        thursday: day.clone(),
        friday: day,
        saturday: DaySession::closed(),
        holidays,
        early_closes,
    }
}

fn cme_futures_hours() -> MarketHours {
    let open = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
    let close = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
    let overnight = DaySession::regular(open, close);
    MarketHours {
        exchange_time_zone: chrono_tz::America::Chicago,
        data_time_zone: chrono_tz::America::Chicago,
        sunday: DaySession {
            open: Some(open),
            close: None,
            extended_open: None,
            extended_close: None,
        },
        monday: overnight.clone(),
        tuesday: overnight.clone(),
        wednesday: overnight.clone(),
        thursday: overnight.clone(),
        friday: DaySession {
            open: None,
            close: Some(close),
            extended_open: None,
            extended_close: None,
        },
        saturday: DaySession::closed(),
        holidays: AHashSet::new(),
        early_closes: AHashMap::new(),
    }
}

fn always_open_hours(time_zone: Tz) -> MarketHours {
    let all_day = DaySession::regular(
        NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
    );
    MarketHours {
        exchange_time_zone: time_zone,
        data_time_zone: time_zone,
        sunday: all_day.clone(),
        monday: all_day.clone(),
        tuesday: all_day.clone(),
        wednesday: all_day.clone(),
        thursday: all_day.clone(),
        friday: all_day.clone(),
        saturday: all_day,
        holidays: AHashSet::new(),
        early_closes: AHashMap::new(),
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct MarketHoursKey {
    market: MarketName,
    security_type: SecurityType,
    ticker: Option<String>,
}

/// Per `(market, security type, symbol?)` lookup of tradeable hours. Symbol
/// specific entries shadow the market wide defaults.
pub struct MarketHoursDatabase {
    entries: DashMap<MarketHoursKey, Arc<MarketHours>>,
}

impl MarketHoursDatabase {
    pub fn new() -> Self {
        let db = MarketHoursDatabase {
            entries: DashMap::new(),
        };
        db.set("usa", SecurityType::Equity, None, us_equity_hours());
        db.set("usa", SecurityType::Option, None, us_equity_hours());
        db.set("cme", SecurityType::Future, None, cme_futures_hours());
        db.set(
            "oanda",
            SecurityType::Forex,
            None,
            always_open_hours(chrono_tz::America::New_York),
        );
        db.set(
            "binance",
            SecurityType::Crypto,
            None,
            always_open_hours(chrono_tz::UTC),
        );
        db
    }

    pub fn set(
        &self,
        market: &str,
        security_type: SecurityType,
        ticker: Option<&str>,
        hours: MarketHours,
    ) {
        self.entries.insert(
            MarketHoursKey {
                market: market.to_lowercase(),
                security_type,
                ticker: ticker.map(|t| t.to_uppercase()),
            },
            Arc::new(hours),
        );
    }

    pub fn get(
        &self,
        market: &str,
        security_type: SecurityType,
        ticker: Option<&str>,
    ) -> Option<Arc<MarketHours>> {
        let market = market.to_lowercase();
        if let Some(ticker) = ticker {
            let key = MarketHoursKey {
                market: market.clone(),
                security_type,
                ticker: Some(ticker.to_uppercase()),
            };
            if let Some(entry) = self.entries.get(&key) {
                return Some(entry.clone());
            }
        }
        self.entries
            .get(&MarketHoursKey {
                market,
                security_type,
                ticker: None,
            })
            .map(|e| e.clone())
    }
}

impl Default for MarketHoursDatabase {
    fn default() -> Self {
        Self::new()
    }
}
