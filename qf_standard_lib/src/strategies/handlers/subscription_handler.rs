use crate::standardized_types::base_data::base_data_enum::BaseDataEnum;
use crate::standardized_types::base_data::quote_bar::QuoteBar;
use crate::standardized_types::base_data::tick::Tick;
use crate::standardized_types::base_data::trade_bar::TradeBar;
use crate::standardized_types::base_data::traits::BaseData;
use crate::standardized_types::rolling_window::RollingWindow;
use crate::standardized_types::subscriptions::SubscriptionDataConfig;
use crate::standardized_types::symbols::Symbol;
use crate::standardized_types::time_slices::TimeSlice;
use crate::strategies::consolidators::ConsolidatorEnum;
use ahash::AHashMap;
use chrono::{DateTime, Utc};

const DEFAULT_HISTORY: usize = 100;

/// Keeps the per-subscription rolling history the algorithm can query, and
/// drives the consolidators that derive coarser bars from primary data.
/// Everything here runs on the engine thread between feed and algorithm.
pub struct SubscriptionHandler {
    bar_history: AHashMap<Symbol, RollingWindow<TradeBar>>,
    quote_history: AHashMap<Symbol, RollingWindow<QuoteBar>>,
    tick_history: AHashMap<Symbol, RollingWindow<Tick>>,
    consolidators: Vec<ConsolidatorEnum>,
    history_to_retain: usize,
}

impl SubscriptionHandler {
    pub fn new() -> Self {
        SubscriptionHandler {
            bar_history: AHashMap::new(),
            quote_history: AHashMap::new(),
            tick_history: AHashMap::new(),
            consolidators: Vec::new(),
            history_to_retain: DEFAULT_HISTORY,
        }
    }

    pub fn with_history(mut self, history_to_retain: usize) -> Self {
        self.history_to_retain = history_to_retain;
        self
    }

    pub fn add_consolidator(&mut self, consolidator: ConsolidatorEnum) {
        self.consolidators.push(consolidator);
    }

    pub fn consolidator_count(&self) -> usize {
        self.consolidators.len()
    }

    /// Feeds one slice through the history windows and consolidators,
    /// returning the consolidated bars that closed at this instant.
    pub fn update_time_slice(&mut self, slice: &TimeSlice) -> Vec<BaseDataEnum> {
        let mut closed = Vec::new();
        for item in slice.iter() {
            match item {
                BaseDataEnum::Tick(tick) => {
                    self.tick_history
                        .entry(tick.symbol.clone())
                        .or_insert_with(|| RollingWindow::new(self.history_to_retain))
                        .add(tick.clone());
                }
                BaseDataEnum::TradeBar(bar) => {
                    self.bar_history
                        .entry(bar.symbol.clone())
                        .or_insert_with(|| RollingWindow::new(self.history_to_retain))
                        .add(bar.clone());
                }
                BaseDataEnum::QuoteBar(bar) => {
                    self.quote_history
                        .entry(bar.symbol.clone())
                        .or_insert_with(|| RollingWindow::new(self.history_to_retain))
                        .add(bar.clone());
                }
                _ => {}
            }
            for consolidator in self.consolidators.iter_mut() {
                if let Some(done) = consolidator.update(item).closed {
                    closed.push(done);
                }
            }
        }
        closed
    }

    /// Advances consolidators past instants with no primary data so stale
    /// working bars still close on time.
    pub fn update_consolidators_time(&mut self, time: DateTime<Utc>) -> Vec<BaseDataEnum> {
        let mut closed = Vec::new();
        for consolidator in self.consolidators.iter_mut() {
            if let Some(done) = consolidator.update_time(time) {
                closed.push(done);
            }
        }
        closed
    }

    pub fn bar_history(&self, symbol: &Symbol) -> Option<&RollingWindow<TradeBar>> {
        self.bar_history.get(symbol)
    }

    pub fn quote_history(&self, symbol: &Symbol) -> Option<&RollingWindow<QuoteBar>> {
        self.quote_history.get(symbol)
    }

    pub fn tick_history(&self, symbol: &Symbol) -> Option<&RollingWindow<Tick>> {
        self.tick_history.get(symbol)
    }

    /// Drops state for a symbol leaving the universe.
    pub fn remove_symbol(&mut self, symbol: &Symbol) {
        self.bar_history.remove(symbol);
        self.quote_history.remove(symbol);
        self.tick_history.remove(symbol);
        self.consolidators
            .retain(|c| &c.subscription().symbol != symbol);
    }
}

impl Default for SubscriptionHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standardized_types::base_data::base_data_type::BaseDataType;
    use crate::standardized_types::resolution::Resolution;
    use crate::standardized_types::symbols::SecurityIdentifier;
    use crate::standardized_types::time_slices::TimeSliceBuilder;
    use crate::strategies::consolidators::candlesticks::CandlestickConsolidator;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::new(SecurityIdentifier::generate_equity("AAPL", 1), "AAPL".to_string())
    }

    fn slice_with_bar(minute: u32, close: rust_decimal::Decimal) -> TimeSlice {
        let time = New_York.with_ymd_and_hms(2024, 3, 4, 9, minute, 0).unwrap().to_utc();
        let mut builder = TimeSliceBuilder::new(time + Resolution::Minute.as_duration());
        builder.add(
            BaseDataEnum::TradeBar(TradeBar::new(
                symbol(), close, close, close, close, dec!(100), time, Resolution::Minute,
            )),
            false,
        );
        builder.build()
    }

    #[test]
    fn history_windows_fill_newest_first() {
        let mut handler = SubscriptionHandler::new().with_history(2);
        for (minute, close) in [(30, dec!(150)), (31, dec!(151)), (32, dec!(152))] {
            handler.update_time_slice(&slice_with_bar(minute, close));
        }
        let window = handler.bar_history(&symbol()).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window.last().unwrap().close, dec!(152));
        assert_eq!(window.get(1).unwrap().close, dec!(151));
    }

    #[test]
    fn consolidators_receive_slice_data() {
        let mut handler = SubscriptionHandler::new();
        let target = SubscriptionDataConfig::new(
            symbol(),
            Resolution::Hour,
            BaseDataType::TradeBars,
            "usa".to_string(),
            New_York,
            New_York,
        );
        handler.add_consolidator(ConsolidatorEnum::Candles(CandlestickConsolidator::new(target)));

        for minute in 30..45 {
            let closed = handler.update_time_slice(&slice_with_bar(minute, dec!(150)));
            assert!(closed.is_empty());
        }
        // An hour later the working bar closes on a time-only update.
        let later = New_York.with_ymd_and_hms(2024, 3, 4, 11, 0, 0).unwrap().to_utc();
        let closed = handler.update_consolidators_time(later);
        assert_eq!(closed.len(), 1);
        match &closed[0] {
            BaseDataEnum::TradeBar(bar) => assert_eq!(bar.resolution, Resolution::Hour),
            other => panic!("Expected trade bar, got {}", other),
        }
    }

    #[test]
    fn remove_symbol_clears_state() {
        let mut handler = SubscriptionHandler::new();
        handler.update_time_slice(&slice_with_bar(30, dec!(150)));
        assert!(handler.bar_history(&symbol()).is_some());
        handler.remove_symbol(&symbol());
        assert!(handler.bar_history(&symbol()).is_none());
    }
}
