use crate::standardized_types::base_data::base_data_enum::BaseDataEnum;
use crate::standardized_types::base_data::trade_bar::TradeBar;
use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::subscriptions::SubscriptionDataConfig;
use crate::strategies::consolidators::ConsolidatedData;
use chrono::{DateTime, DurationRound, Utc};

/// Builds trade bars of a coarser resolution from ticks or finer trade bars.
/// Bar opens are aligned to the target resolution grid in UTC.
pub struct CandlestickConsolidator {
    pub target: SubscriptionDataConfig,
    current: Option<TradeBar>,
}

impl CandlestickConsolidator {
    pub fn new(target: SubscriptionDataConfig) -> Self {
        CandlestickConsolidator {
            target,
            current: None,
        }
    }

    fn aligned_open(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        time.duration_trunc(self.target.resolution.as_duration())
            .unwrap_or(time)
    }

    pub fn update(&mut self, data: &BaseDataEnum) -> ConsolidatedData {
        let (price_open, high, low, close, volume) = match data {
            BaseDataEnum::Tick(tick) => (tick.price, tick.price, tick.price, tick.price, tick.size),
            BaseDataEnum::TradeBar(bar) => (bar.open, bar.high, bar.low, bar.close, bar.volume),
            _ => {
                return ConsolidatedData {
                    closed: None,
                    open: self.current.clone().map(BaseDataEnum::TradeBar),
                }
            }
        };
        if data.symbol() != &self.target.symbol {
            return ConsolidatedData {
                closed: None,
                open: self.current.clone().map(BaseDataEnum::TradeBar),
            };
        }

        let mut closed = None;
        if let Some(current) = &self.current {
            if data.time() >= current.time + self.target.resolution.as_duration() {
                closed = self.current.take().map(BaseDataEnum::TradeBar);
            }
        }

        match &mut self.current {
            Some(current) => {
                current.high = current.high.max(high);
                current.low = current.low.min(low);
                current.close = close;
                current.volume += volume;
            }
            None => {
                let open_time = self.aligned_open(data.time());
                self.current = Some(TradeBar::new(
                    self.target.symbol.clone(),
                    price_open,
                    high,
                    low,
                    close,
                    volume,
                    open_time,
                    self.target.resolution,
                ));
            }
        }

        ConsolidatedData {
            closed,
            open: self.current.clone().map(BaseDataEnum::TradeBar),
        }
    }

    pub fn update_time(&mut self, time: DateTime<Utc>) -> Option<BaseDataEnum> {
        if let Some(current) = &self.current {
            if time >= current.time + self.target.resolution.as_duration() {
                return self.current.take().map(BaseDataEnum::TradeBar);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standardized_types::base_data::base_data_type::BaseDataType;
    use crate::standardized_types::base_data::tick::Tick;
    use crate::standardized_types::resolution::Resolution;
    use crate::standardized_types::symbols::{SecurityIdentifier, Symbol};
    use chrono::TimeZone;
    use chrono_tz::America::New_York;
    use rust_decimal_macros::dec;

    fn target() -> SubscriptionDataConfig {
        SubscriptionDataConfig::new(
            Symbol::new(SecurityIdentifier::generate_equity("AAPL", 1), "AAPL".to_string()),
            Resolution::Minute,
            BaseDataType::TradeBars,
            "usa".to_string(),
            New_York,
            New_York,
        )
    }

    #[test]
    fn ticks_build_minute_bars() {
        let mut consolidator = CandlestickConsolidator::new(target());
        let symbol = target().symbol;
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();

        let ticks = [
            (0, dec!(150.00), dec!(10)),
            (20, dec!(150.50), dec!(5)),
            (40, dec!(149.80), dec!(8)),
        ];
        for (secs, price, size) in ticks {
            let tick = Tick::new(symbol.clone(), price, size, base + chrono::Duration::seconds(secs));
            let result = consolidator.update(&BaseDataEnum::Tick(tick));
            assert!(result.closed.is_none());
        }

        // First tick of the next minute closes the working bar.
        let tick = Tick::new(symbol, dec!(150.10), dec!(2), base + chrono::Duration::seconds(60));
        let result = consolidator.update(&BaseDataEnum::Tick(tick));
        match result.closed {
            Some(BaseDataEnum::TradeBar(bar)) => {
                assert_eq!(bar.time, base);
                assert_eq!(bar.open, dec!(150.00));
                assert_eq!(bar.high, dec!(150.50));
                assert_eq!(bar.low, dec!(149.80));
                assert_eq!(bar.close, dec!(149.80));
                assert_eq!(bar.volume, dec!(23));
            }
            other => panic!("Expected closed bar, got {:?}", other.map(|d| d.to_string())),
        }
    }

    #[test]
    fn time_advance_closes_stale_bar() {
        let mut consolidator = CandlestickConsolidator::new(target());
        let symbol = target().symbol;
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        let tick = Tick::new(symbol, dec!(150.00), dec!(10), base);
        consolidator.update(&BaseDataEnum::Tick(tick));

        assert!(consolidator.update_time(base + chrono::Duration::seconds(59)).is_none());
        let closed = consolidator.update_time(base + chrono::Duration::seconds(60));
        assert!(closed.is_some());
        assert!(consolidator.update_time(base + chrono::Duration::seconds(61)).is_none());
    }
}
